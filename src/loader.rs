//! Sample loader for line-oriented text files.
//!
//! Only the last whitespace-delimited token of each line is read, so station
//! and date columns in front of the reading are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ReduceError;

/// What to do with a line whose trailing token is not a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Abort the whole load.
    #[default]
    Fail,
    /// Drop the line and log it.
    Skip,
}

/// Text after the last space, tab or newline, ignoring trailing whitespace.
/// `None` for blank lines.
pub fn last_token(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind(&[' ', '\t', '\n'][..]) {
        Some(pos) => Some(&trimmed[pos + 1..]),
        None => Some(trimmed),
    }
}

fn parse_reading(token: &str) -> Option<f32> {
    token.parse::<f32>().ok().filter(|v| v.is_finite())
}

/// Read one sample per non-blank line.
pub fn parse_samples<R: BufRead>(
    reader: R,
    policy: MalformedPolicy,
) -> Result<Vec<f32>, ReduceError> {
    parse_lines(reader, policy, Path::new("<reader>"))
}

/// Open `path` and read its samples.
pub fn load_samples(path: &Path, policy: MalformedPolicy) -> Result<Vec<f32>, ReduceError> {
    let file = File::open(path).map_err(|source| ReduceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let samples = parse_lines(BufReader::new(file), policy, path)?;
    info!(path = %path.display(), count = samples.len(), "loaded samples");
    Ok(samples)
}

fn parse_lines<R: BufRead>(
    reader: R,
    policy: MalformedPolicy,
    path: &Path,
) -> Result<Vec<f32>, ReduceError> {
    let mut samples = Vec::new();
    let mut skipped = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ReduceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let Some(token) = last_token(&line) else {
            continue;
        };

        match parse_reading(token) {
            Some(value) => samples.push(value),
            None => match policy {
                MalformedPolicy::Fail => {
                    return Err(ReduceError::MalformedLine {
                        line: idx + 1,
                        token: token.to_string(),
                    });
                }
                MalformedPolicy::Skip => {
                    warn!(line = idx + 1, %token, "skipping line without numeric reading");
                    skipped += 1;
                }
            },
        }
    }

    if skipped > 0 {
        warn!(skipped, "malformed lines dropped");
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_last_token() {
        assert_eq!(last_token("01 2020 5.0"), Some("5.0"));
        assert_eq!(last_token("Lincoln\t1\t-3.25  \r"), Some("-3.25"));
        assert_eq!(last_token("7.5"), Some("7.5"));
        assert_eq!(last_token("   "), None);
        assert_eq!(last_token(""), None);
    }

    #[test]
    fn test_parse_station_file() {
        let text = "01 2020 5.0\n01 2020 7.0\n\n01 2020 3.0\n";
        let samples = parse_samples(Cursor::new(text), MalformedPolicy::Fail).unwrap();
        assert_eq!(samples, vec![5.0, 7.0, 3.0]);
    }

    #[test]
    fn test_malformed_line_fails_load() {
        let text = "a 1.0\nb n/a\nc 2.0\n";
        let err = parse_samples(Cursor::new(text), MalformedPolicy::Fail).unwrap_err();
        assert!(matches!(err, ReduceError::MalformedLine { line: 2, ref token } if token == "n/a"));
    }

    #[test]
    fn test_malformed_line_skipped() {
        let text = "a 1.0\nb n/a\nc NaN\nd inf\ne 2.0\n";
        let samples = parse_samples(Cursor::new(text), MalformedPolicy::Skip).unwrap();
        assert_eq!(samples, vec![1.0, 2.0]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_samples(Path::new("/nonexistent/temps.txt"), MalformedPolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, ReduceError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("temps.txt");
        std::fs::write(&path, "X 1 -1.5\nX 2 2.5\n").unwrap();
        let samples = load_samples(&path, MalformedPolicy::Fail).unwrap();
        assert_eq!(samples, vec![-1.5, 2.5]);
    }
}
