//! Per-language version metadata.
//!
//! The file is properties-style: `key=value` or `key: value` per line, with
//! `#` and `!` comment lines. Values are handed to converters untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::REQUIRED_METADATA_KEYS;

pub type VersionMetadata = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("failed to read metadata file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// A line that is neither blank, a comment, nor a key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
  /// 1-based.
  pub line: usize,
  pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMetadata {
  pub values: VersionMetadata,
  pub malformed: Vec<MalformedLine>,
}

impl ParsedMetadata {
  /// Required keys that are absent or empty, in declaration order.
  pub fn missing_keys(&self) -> Vec<&'static str> {
    REQUIRED_METADATA_KEYS
      .iter()
      .copied()
      .filter(|key| self.values.get(*key).is_none_or(|v| v.is_empty()))
      .collect()
  }
}

/// Parse metadata text, keeping track of malformed lines.
pub fn parse(text: &str) -> ParsedMetadata {
  let mut parsed = ParsedMetadata::default();
  for (idx, line) in text.lines().enumerate() {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
      continue;
    }
    match split_pair(trimmed) {
      Some((key, value)) => {
        parsed.values.insert(key.to_string(), value.to_string());
      }
      None => parsed.malformed.push(MalformedLine {
        line: idx + 1,
        content: trimmed.to_string(),
      }),
    }
  }
  parsed
}

/// Split at the first `=` or `:`, whichever comes first.
fn split_pair(line: &str) -> Option<(&str, &str)> {
  let pos = line.find(['=', ':'])?;
  let key = line[..pos].trim();
  if key.is_empty() || key.contains(char::is_whitespace) {
    return None;
  }
  Some((key, line[pos + 1..].trim()))
}

pub fn read(path: &Path) -> Result<ParsedMetadata, MetadataError> {
  let text = std::fs::read_to_string(path).map_err(|source| MetadataError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(parse(&text))
}

/// Read metadata for the pipeline, skipping malformed lines.
pub fn read_lenient(path: &Path) -> Result<VersionMetadata, MetadataError> {
  read(path).map(|parsed| parsed.values)
}
