// src/core/dotenv.rs

use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

/// Parses dotenv content into an insertion-ordered map.
///
/// Recognised syntax: `KEY=VALUE` lines, `#` comment lines and blank lines.
/// An optional `export ` prefix is tolerated, and values surrounded by
/// matching single or double quotes are unquoted. Lines without a `=` are
/// skipped.
pub fn parse(content: &str) -> IndexMap<String, String> {
    let mut values = IndexMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            log::warn!("Skipping malformed dotenv line: '{}'", line);
            continue;
        };
        values.insert(key.trim().to_string(), unquote(value.trim()).to_string());
    }
    values
}

/// Reads and parses a dotenv file from disk.
pub fn load_file(path: &Path) -> Result<IndexMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dotenv file '{}'", path.display()))?;
    Ok(parse(&content))
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_assignments() {
        let values = parse("FOO=bar\nBAZ=qux");
        assert_eq!(values.get("FOO").unwrap(), "bar");
        assert_eq!(values.get("BAZ").unwrap(), "qux");
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let values = parse("# a comment\n\nFOO=bar\n   \n# another");
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("FOO").unwrap(), "bar");
    }

    #[test]
    fn strips_matching_quotes() {
        let values = parse("A=\"double\"\nB='single'\nC=\"unbalanced'");
        assert_eq!(values.get("A").unwrap(), "double");
        assert_eq!(values.get("B").unwrap(), "single");
        assert_eq!(values.get("C").unwrap(), "\"unbalanced'");
    }

    #[test]
    fn tolerates_export_prefix_and_whitespace() {
        let values = parse("export FOO= spaced value ");
        assert_eq!(values.get("FOO").unwrap(), "spaced value");
    }

    #[test]
    fn keeps_insertion_order_and_last_assignment() {
        let values = parse("A=1\nB=2\nA=3");
        assert_eq!(
            values.keys().collect::<Vec<_>>(),
            vec![&"A".to_string(), &"B".to_string()]
        );
        assert_eq!(values.get("A").unwrap(), "3");
    }
}
