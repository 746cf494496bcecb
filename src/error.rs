use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The topic-state dump could not be read or does not have the MALLET layout.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", format_state_error(.message, .line))]
pub struct StateFormatError {
    pub message: String,
    /// 1-based line number in the decompressed dump, when known.
    pub line: Option<usize>,
}

impl StateFormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(line: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }
}

fn format_state_error(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(n) => format!("invalid topic-state file (line {n}): {message}"),
        None => format!("invalid topic-state file: {message}"),
    }
}

/// Derived matrices disagree in shape or are not row-normalized.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", format_problems(.problems))]
pub struct ValidationError {
    pub problems: Vec<String>,
}

impl ValidationError {
    pub fn single(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }
}

fn format_problems(problems: &[String]) -> String {
    let mut out = String::from("validation failed:");
    for p in problems {
        out.push_str("\n * ");
        out.push_str(p);
    }
    out
}

/// The input to hierarchical clustering cannot produce a tree.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("clustering error: {0}")]
pub struct ClusteringError(pub String);

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    StateFormat(#[from] StateFormatError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Clustering(#[from] ClusteringError),

    #[error("Unknown {kind} '{value}'. Use: {expected}")]
    InvalidOption {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
