//! Reader for MALLET `--output-state` dumps.
//!
//! The decompressed layout is:
//!
//! ```text
//! #doc source pos typeindex type topic
//! #alpha : 0.5 0.5
//! #beta : 0.01
//! 0 NA 0 0 rust 1
//! 0 NA 1 1 memory 0
//! ```
//!
//! The first line names the columns. Some exports put the column line after
//! the hyperparameters instead; both placements are accepted. Every data row
//! is one token occurrence with its sampled topic.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde::Serialize;

use crate::error::StateFormatError;

/// Dirichlet priors recorded in the dump header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hyperparameters {
    /// Per-topic document prior. Its length is the topic count.
    pub alpha: Vec<f64>,
    /// Symmetric topic-word prior.
    pub beta: f64,
}

/// One token occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub doc: usize,
    /// The word type. Always text, even when it looks like a number.
    pub token: String,
    pub topic: usize,
}

/// Parsed dump: priors plus every token assignment in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicState {
    pub hyperparameters: Hyperparameters,
    pub assignments: Vec<Assignment>,
}

impl TopicState {
    pub fn num_topics(&self) -> usize {
        self.hyperparameters.alpha.len()
    }
}

/// Column positions of the fields we need.
#[derive(Debug, Clone, Copy)]
struct Columns {
    doc: usize,
    token: usize,
    topic: usize,
    width: usize,
}

impl Columns {
    fn from_header(line: &str) -> Option<Self> {
        let names: Vec<&str> = line.split_whitespace().collect();
        Some(Self {
            doc: position(&names, &["#doc", "doc"])?,
            token: position(&names, &["type"])?,
            topic: position(&names, &["topic"])?,
            width: names.len(),
        })
    }
}

fn position(names: &[&str], wanted: &[&str]) -> Option<usize> {
    names.iter().position(|n| wanted.contains(n))
}

/// Open a gzip-compressed state file and parse it. Every gzip member is read,
/// so concatenated or block-compressed (pigz, bgzip) dumps parse in full.
pub fn read_state_file(path: impl AsRef<Path>) -> Result<TopicState, StateFormatError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        StateFormatError::new(format!("cannot open '{}': {e}", path.display()))
    })?;
    log::debug!("reading topic state from {}", path.display());
    let state = read_state(BufReader::new(MultiGzDecoder::new(file)))?;
    log::debug!(
        "parsed {} assignments over {} topics",
        state.assignments.len(),
        state.num_topics()
    );
    Ok(state)
}

/// Parse an already-decompressed state dump.
pub fn read_state<R: BufRead>(reader: R) -> Result<TopicState, StateFormatError> {
    let mut lines = reader.lines().enumerate().map(|(i, line)| {
        line.map(|l| (i + 1, l))
            .map_err(|e| StateFormatError::at_line(i + 1, format!("cannot decode: {e}")))
    });

    let (_, first) = next_line(&mut lines, "column header")?;
    if !first.starts_with('#') {
        return Err(StateFormatError::at_line(
            1,
            "expected a '#' header line; is this a MALLET state file?",
        ));
    }
    let (alpha_no, alpha_line) = next_line(&mut lines, "alpha")?;
    let (beta_no, beta_line) = next_line(&mut lines, "beta")?;
    let hyperparameters =
        parse_hyperparameters(&alpha_line, &beta_line).map_err(|(which, msg)| {
            let line = match which {
                HeaderLine::Alpha => alpha_no,
                HeaderLine::Beta => beta_no,
            };
            StateFormatError::at_line(line, msg)
        })?;

    let columns = match Columns::from_header(&first) {
        Some(c) => c,
        None => {
            let (no, header) = next_line(&mut lines, "column header")?;
            Columns::from_header(&header).ok_or_else(|| {
                StateFormatError::at_line(no, "column header must name '#doc', 'type' and 'topic'")
            })?
        }
    };

    let num_topics = hyperparameters.alpha.len();
    let mut assignments = Vec::new();
    for line in lines {
        let (no, line) = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < columns.width {
            return Err(StateFormatError::at_line(
                no,
                format!("expected {} fields, found {}", columns.width, fields.len()),
            ));
        }
        let doc = parse_index(fields[columns.doc], "document", no)?;
        let topic = parse_index(fields[columns.topic], "topic", no)?;
        if topic >= num_topics {
            return Err(StateFormatError::at_line(
                no,
                format!("topic {topic} out of range for {num_topics} alpha values"),
            ));
        }
        assignments.push(Assignment {
            doc,
            token: fields[columns.token].to_string(),
            topic,
        });
    }

    Ok(TopicState {
        hyperparameters,
        assignments,
    })
}

/// Which hyperparameter line a header error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLine {
    Alpha,
    Beta,
}

/// Parse the `#alpha : ...` and `#beta : ...` header lines.
pub fn parse_hyperparameters(
    alpha_line: &str,
    beta_line: &str,
) -> Result<Hyperparameters, (HeaderLine, String)> {
    let alpha_values = after_colon(alpha_line)
        .ok_or((HeaderLine::Alpha, "alpha line has no ':'".to_string()))?;
    let mut tokens = alpha_values.split_whitespace().peekable();
    // Skip a leading label such as "alpha" when the colon comes early.
    if tokens.peek().is_some_and(|t| t.parse::<f64>().is_err()) {
        tokens.next();
    }
    let alpha = tokens
        .map(|t| parse_prior(t).map_err(|e| (HeaderLine::Alpha, format!("alpha {e}"))))
        .collect::<Result<Vec<f64>, _>>()?;
    if alpha.is_empty() {
        return Err((HeaderLine::Alpha, "alpha line has no values".into()));
    }

    let beta_value =
        after_colon(beta_line).ok_or((HeaderLine::Beta, "beta line has no ':'".to_string()))?;
    let beta = parse_prior(beta_value.trim()).map_err(|e| (HeaderLine::Beta, format!("beta {e}")))?;

    Ok(Hyperparameters { alpha, beta })
}

fn after_colon(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, rest)| rest)
}

fn parse_prior(token: &str) -> Result<f64, String> {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Ok(v) => Err(format!("value {v} is not a finite non-negative number")),
        Err(_) => Err(format!("value '{token}' is not a number")),
    }
}

fn parse_index(field: &str, what: &str, line: usize) -> Result<usize, StateFormatError> {
    field.parse::<usize>().map_err(|_| {
        StateFormatError::at_line(line, format!("{what} index '{field}' is not a non-negative integer"))
    })
}

fn next_line(
    lines: &mut impl Iterator<Item = Result<(usize, String), StateFormatError>>,
    what: &str,
) -> Result<(usize, String), StateFormatError> {
    lines
        .next()
        .unwrap_or_else(|| Err(StateFormatError::new(format!("file ends before the {what} line"))))
}
