//! Metric selection strings.
//!
//! ```text
//! quality
//! bleu            bleu:3
//! smooth-bleu     smooth-bleu:2
//! bleu:4+0.5*quality      (terms joined by '+', optional "weight*" prefix)
//! ```

use std::fmt;

use crate::error::{Result, TuneError};

use super::bleu::DEFAULT_ORDER;
use super::{Bleu, EvaluationMetric, LinearCombination, QualitySum};

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSpec {
    Quality,
    Bleu { order: usize, smooth: bool },
    Linear(Vec<(f64, MetricSpec)>),
}

impl MetricSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let spec = raw.trim().to_lowercase();
        let unknown = || TuneError::UnknownMetric(raw.to_string());

        if spec.contains('+') {
            let terms = spec
                .split('+')
                .map(|term| -> Result<(f64, MetricSpec)> {
                    let (weight, name) = match term.split_once('*') {
                        Some((w, name)) => (w.trim().parse::<f64>().map_err(|_| unknown())?, name),
                        None => (1.0, term),
                    };
                    let part = Self::parse_single(name.trim()).ok_or_else(unknown)?;
                    Ok((weight, part))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::Linear(terms));
        }

        Self::parse_single(&spec).ok_or_else(unknown)
    }

    fn parse_single(name: &str) -> Option<Self> {
        let (base, param) = match name.split_once(':') {
            Some((base, param)) => (base, Some(param)),
            None => (name, None),
        };
        match base {
            "quality" if param.is_none() => Some(Self::Quality),
            "bleu" | "smooth-bleu" => {
                let order = match param {
                    Some(p) => p.parse::<usize>().ok().filter(|n| *n > 0)?,
                    None => DEFAULT_ORDER,
                };
                Some(Self::Bleu {
                    order,
                    smooth: base == "smooth-bleu",
                })
            }
            _ => None,
        }
    }

    pub fn build(&self) -> Box<dyn EvaluationMetric> {
        match self {
            Self::Quality => Box::new(QualitySum),
            Self::Bleu { order, smooth } => Box::new(Bleu::new(*order, *smooth)),
            Self::Linear(terms) => Box::new(LinearCombination::new(
                terms.iter().map(|(w, spec)| (*w, spec.build())).collect(),
            )),
        }
    }
}

impl fmt::Display for MetricSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quality => write!(f, "quality"),
            Self::Bleu { order, smooth } => {
                write!(f, "{}bleu:{}", if *smooth { "smooth-" } else { "" }, order)
            }
            Self::Linear(terms) => {
                for (i, (w, spec)) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, "+")?;
                    }
                    write!(f, "{}*{}", w, spec)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_metrics() {
        assert_eq!(MetricSpec::parse("quality").unwrap(), MetricSpec::Quality);
        assert_eq!(
            MetricSpec::parse("BLEU").unwrap(),
            MetricSpec::Bleu { order: 4, smooth: false }
        );
        assert_eq!(
            MetricSpec::parse("smooth-bleu:2").unwrap(),
            MetricSpec::Bleu { order: 2, smooth: true }
        );
    }

    #[test]
    fn test_parse_combination() {
        let spec = MetricSpec::parse("bleu:3+0.5*quality").unwrap();
        assert_eq!(
            spec,
            MetricSpec::Linear(vec![
                (1.0, MetricSpec::Bleu { order: 3, smooth: false }),
                (0.5, MetricSpec::Quality),
            ])
        );
        assert_eq!(spec.build().required_stats(), 9);
    }

    #[test]
    fn test_unknown_metrics_rejected() {
        for bad in ["rouge", "bleu:x", "bleu:0", "quality:2", "x*bleu+quality", "bleu+"] {
            assert!(
                matches!(MetricSpec::parse(bad), Err(TuneError::UnknownMetric(_))),
                "{bad} should be rejected"
            );
        }
    }
}
