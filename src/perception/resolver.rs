/// Element resolution: target label → detection.
///
/// An ordered chain of match strategies is tried in sequence; within a
/// strategy the first detection in provider order wins. Confidence is never
/// used for ranking.
use crate::errors::{SeeTapError, SeeTapResult};
use crate::perception::types::Detection;

pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, target: &str, label: &str) -> bool;
}

/// Case-insensitive equality.
pub struct ExactMatch;

impl MatchStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn matches(&self, target: &str, label: &str) -> bool {
        target.trim().eq_ignore_ascii_case(label.trim())
    }
}

/// Case-insensitive substring of the target inside the label.
pub struct SubstringMatch;

impl MatchStrategy for SubstringMatch {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn matches(&self, target: &str, label: &str) -> bool {
        label.to_lowercase().contains(&target.to_lowercase())
    }
}

/// Every whitespace-separated word of the target appears in the label.
pub struct WordsMatch;

impl MatchStrategy for WordsMatch {
    fn name(&self) -> &'static str {
        "words"
    }

    fn matches(&self, target: &str, label: &str) -> bool {
        let label = label.to_lowercase();
        let mut words = target.split_whitespace().peekable();
        if words.peek().is_none() {
            return false;
        }
        words.all(|w| label.contains(&w.to_lowercase()))
    }
}

pub struct ElementResolver {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl Default for ElementResolver {
    fn default() -> Self {
        Self {
            strategies: vec![Box::new(SubstringMatch)],
        }
    }
}

impl ElementResolver {
    pub fn new(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build a chain from config names such as `["exact", "substring"]`.
    pub fn from_names(names: &[String]) -> SeeTapResult<Self> {
        let mut strategies: Vec<Box<dyn MatchStrategy>> = Vec::with_capacity(names.len());
        for name in names {
            let strategy: Box<dyn MatchStrategy> = match name.trim().to_ascii_lowercase().as_str() {
                "exact" => Box::new(ExactMatch),
                "substring" => Box::new(SubstringMatch),
                "words" => Box::new(WordsMatch),
                other => {
                    return Err(SeeTapError::Config(format!("unknown match strategy '{other}'")))
                }
            };
            strategies.push(strategy);
        }
        if strategies.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { strategies })
    }

    /// `None` means "element not found"; callers treat it as a state, not a fault.
    pub fn resolve<'a>(&self, target: &str, detections: &'a [Detection]) -> Option<&'a Detection> {
        if target.trim().is_empty() {
            return None;
        }
        for strategy in &self.strategies {
            if let Some(hit) = detections.iter().find(|d| strategy.matches(target, &d.label)) {
                tracing::debug!(
                    target,
                    strategy = strategy.name(),
                    label = %hit.label,
                    center = %hit.center(),
                    "element resolved"
                );
                return Some(hit);
            }
        }
        tracing::debug!(target, candidates = detections.len(), "no detection matched");
        None
    }
}
