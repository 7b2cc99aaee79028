//! Weight file format.
//!
//! One `feature value` pair per line:
//!
//! ```text
//! lm 0.214
//! tm:phrase -0.083
//! word_penalty -0.5
//! ```
//!
//! Reading is order independent and sums repeated names. Writing is
//! deterministic: descending absolute weight, name ascending on ties, zero
//! weights omitted.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Result, TuneError};

use super::WeightVector;

/// Parse weight file contents. `path` is only used for error messages.
pub fn parse_weights(content: &str, path: &Path) -> Result<WeightVector> {
    let mut weights = WeightVector::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = |detail: String| TuneError::MalformedWeights {
            path: path.to_path_buf(),
            line: idx + 1,
            detail,
        };

        let mut fields = line.split_whitespace();
        let name = fields
            .next()
            .ok_or_else(|| malformed("missing feature name".into()))?;
        let value = fields
            .next()
            .ok_or_else(|| malformed(format!("missing value for '{}'", name)))?;
        if fields.next().is_some() {
            return Err(malformed(format!("trailing fields after '{} {}'", name, value)));
        }
        let value: f64 = value
            .parse()
            .map_err(|_| malformed(format!("'{}' is not a number", value)))?;
        if !value.is_finite() {
            return Err(malformed(format!("non-finite weight for '{}'", name)));
        }

        weights.increment(name, value);
    }

    Ok(weights)
}

/// Read a weight file from disk.
pub fn read_weights(path: &Path) -> Result<WeightVector> {
    let content = std::fs::read_to_string(path).map_err(|e| TuneError::io(path, e))?;
    parse_weights(&content, path)
}

/// Read a comma-separated list of weight files, in order.
pub fn read_weight_list(paths: &str) -> Result<Vec<WeightVector>> {
    let list: Vec<WeightVector> = paths
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| read_weights(Path::new(p)))
        .collect::<Result<_>>()?;

    if list.is_empty() {
        return Err(TuneError::NoInitialWeights);
    }
    Ok(list)
}

/// Serialize in the canonical order.
pub fn format_weights(weights: &WeightVector) -> String {
    let mut entries: Vec<(&str, f64)> = weights.iter().filter(|(_, v)| *v != 0.0).collect();
    entries.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then_with(|| a.0.cmp(b.0)));

    let mut out = String::new();
    for (name, value) in entries {
        // Writing into a String cannot fail
        let _ = writeln!(out, "{} {}", name, value);
    }
    out
}

pub fn write_weights(path: &Path, weights: &WeightVector) -> Result<()> {
    std::fs::write(path, format_weights(weights)).map_err(|e| TuneError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_sums_duplicates_and_skips_comments() {
        let w = parse_weights("# header\nlm 0.5\n\ntm -1\nlm 0.25\n", Path::new("w")).unwrap();
        assert_eq!(w.get("lm"), 0.75);
        assert_eq!(w.get("tm"), -1.0);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse_weights("lm 0.5\ntm abc\n", Path::new("w.txt")).unwrap_err();
        match err {
            TuneError::MalformedWeights { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }

        assert!(parse_weights("lm\n", Path::new("w")).is_err());
        assert!(parse_weights("lm 1 2\n", Path::new("w")).is_err());
        assert!(parse_weights("lm NaN\n", Path::new("w")).is_err());
    }

    #[test]
    fn test_format_orders_by_magnitude_and_drops_zeros() {
        let w: WeightVector = [("small", 0.1), ("zero", 0.0), ("big", -2.0), ("mid", 0.5)]
            .into_iter()
            .collect();
        assert_eq!(format_weights(&w), "big -2\nmid 0.5\nsmall 0.1\n");
    }

    #[test]
    fn test_format_ties_broken_by_name() {
        let w: WeightVector = [("b", 1.0), ("a", -1.0)].into_iter().collect();
        assert_eq!(format_weights(&w), "a -1\nb 1\n");
    }

    #[test]
    fn test_write_then_read_preserves_values() {
        let w: WeightVector = [("lm", 0.123456789), ("wp", -3.5e-7)].into_iter().collect();
        let file = NamedTempFile::new().unwrap();
        write_weights(file.path(), &w).unwrap();
        let back = read_weights(file.path()).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn test_read_weight_list() {
        let mut a = NamedTempFile::new().unwrap();
        writeln!(a, "lm 1").unwrap();
        let mut b = NamedTempFile::new().unwrap();
        writeln!(b, "lm 2").unwrap();

        let spec = format!("{},{}", a.path().display(), b.path().display());
        let list = read_weight_list(&spec).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].get("lm"), 2.0);

        assert!(matches!(read_weight_list(" , "), Err(TuneError::NoInitialWeights)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_weights(Path::new("/definitely/not/here.wts")).unwrap_err();
        assert!(matches!(err, TuneError::Io { .. }));
    }
}
