//! Plain-text n-best list reader.
//!
//! ```text
//! 0 ||| the cat sat ||| lm=-12.5 tm=-3.1 wp=-3 ||| 3 4 2 3 1 2 0 1 0 0
//! 0 ||| a cat sat   ||| lm=-13.0 tm=-2.2 wp=-3 ||| 3 4 1 3 0 2 0 1 0 0
//! 1 ||| ...
//! ```
//!
//! Fields: slot id, candidate text, `name=value` features (repeats are summed),
//! and an optional fourth field of whitespace-separated metric statistics.
//! Slot ids start at 0, never decrease and never skip ahead; a skipped id is
//! reported as an empty candidate set at the first missing slot.

use std::path::Path;

use crate::error::{Result, TuneError};

use super::Corpus;

const FIELD_SEP: &str = "|||";

pub fn parse_nbest(content: &str, path: &Path) -> Result<Corpus> {
    let mut builder = Corpus::builder();
    let mut last_slot: Option<usize> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let malformed = |detail: String| TuneError::MalformedNbest {
            path: path.to_path_buf(),
            line: idx + 1,
            detail,
        };

        let fields: Vec<&str> = line.split(FIELD_SEP).map(str::trim).collect();
        if fields.len() < 3 || fields.len() > 4 {
            return Err(malformed(format!(
                "expected 3 or 4 '|||'-separated fields, found {}",
                fields.len()
            )));
        }

        let slot: usize = fields[0]
            .parse()
            .map_err(|_| malformed(format!("bad slot id '{}'", fields[0])))?;
        match last_slot {
            Some(last) if slot < last => {
                return Err(malformed(format!("slot {} appears after slot {}", slot, last)));
            }
            _ if slot > builder.n_slots() => {
                return Err(TuneError::EmptyCandidateSet {
                    slot: builder.n_slots(),
                });
            }
            _ => {}
        }
        last_slot = Some(slot);

        let mut features = Vec::new();
        for token in fields[2].split_whitespace() {
            let (name, value) = token
                .rsplit_once('=')
                .ok_or_else(|| malformed(format!("feature '{}' is not name=value", token)))?;
            let value: f64 = value
                .parse()
                .map_err(|_| malformed(format!("feature '{}' has a non-numeric value", name)))?;
            features.push((name, value));
        }

        let stats = match fields.get(3) {
            Some(raw_stats) => raw_stats
                .split_whitespace()
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| malformed(format!("statistic '{}' is not a number", s)))
                })
                .collect::<Result<Vec<f64>>>()?,
            None => Vec::new(),
        };

        builder.push(slot, fields[1], features, stats);
    }

    builder.build()
}

pub fn read_nbest(path: &Path) -> Result<Corpus> {
    let content = std::fs::read_to_string(path).map_err(|e| TuneError::io(path, e))?;
    parse_nbest(&content, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
0 ||| a b ||| lm=-1.5 tm=2 tm=1 ||| 1 2
0 ||| a c ||| lm=-2 ||| 0 2

1 ||| d ||| wp=-1
";

    #[test]
    fn test_parse_sample() {
        let corpus = parse_nbest(SAMPLE, Path::new("nbest")).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.slot(0).len(), 2);
        assert_eq!(corpus.n_candidates(), 3);

        let first = &corpus.slot(0)[0];
        assert_eq!(first.text(), "a b");
        assert_eq!(first.stats(), &[1.0, 2.0]);
        let tm = corpus.feature_index().get("tm").unwrap();
        assert!(first.features().contains(&(tm, 3.0)));

        assert!(corpus.slot(1)[0].stats().is_empty());
    }

    #[test]
    fn test_skipped_slot_is_empty_set() {
        let err = parse_nbest("0 ||| a ||| f=1\n2 ||| b ||| f=1\n", Path::new("n")).unwrap_err();
        assert!(matches!(err, TuneError::EmptyCandidateSet { slot: 1 }));
    }

    #[test]
    fn test_huge_slot_id_rejected_without_allocating() {
        let err = parse_nbest("5000000000000 ||| a ||| f=1 ||| 1\n", Path::new("n")).unwrap_err();
        assert!(matches!(err, TuneError::EmptyCandidateSet { slot: 0 }));

        let err = parse_nbest("0 ||| a ||| f=1\n18446744073709551615 ||| b ||| f=1\n", Path::new("n")).unwrap_err();
        assert!(matches!(err, TuneError::EmptyCandidateSet { slot: 1 }));
    }

    #[test]
    fn test_decreasing_slot_rejected() {
        let err = parse_nbest("1 ||| a ||| f=1\n0 ||| b ||| f=1\n", Path::new("n")).unwrap_err();
        match err {
            TuneError::MalformedNbest { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_feature_rejected() {
        assert!(parse_nbest("0 ||| a ||| lm:1\n", Path::new("n")).is_err());
        assert!(parse_nbest("0 ||| a ||| lm=x\n", Path::new("n")).is_err());
        assert!(parse_nbest("0 ||| a\n", Path::new("n")).is_err());
        assert!(parse_nbest("0 ||| a ||| f=1 ||| 1 q\n", Path::new("n")).is_err());
    }
}
