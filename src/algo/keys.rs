use std::fs;
use std::path::Path;

use serde::Serialize;

/// Keywords MALLET printed for one topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicKeys {
    /// `Topic1`, `Topic2`, ... in file order.
    pub label: String,
    pub words: String,
}

/// Parse a `--output-topic-keys` file: `id<TAB>weight<TAB>words` per line.
///
/// Only the text after the last tab is kept, so a line without tabs is taken
/// whole. Blank lines are skipped and do not consume a label.
pub fn parse_keys(text: &str) -> Vec<TopicKeys> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| TopicKeys {
            label: format!("Topic{}", i + 1),
            words: line.rsplit('\t').next().unwrap_or(line).trim().to_string(),
        })
        .collect()
}

pub fn read_keys_file(path: impl AsRef<Path>) -> std::io::Result<Vec<TopicKeys>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let keys = parse_keys(&text);
    log::debug!("read {} topic keys from {}", keys.len(), path.display());
    Ok(keys)
}
