use serde::{Deserialize, Serialize};

use crate::command::intent::ActionKind;
use crate::perception::types::Point;

/// Where a resolved action lands: a screen point or a device-side element handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Point(Point),
    Element(String),
}

/// Everything the executor needs for one primitive action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAction {
    pub kind: ActionKind,
    pub target: Option<ActionTarget>,
    /// Swipe end point.
    pub end: Option<Point>,
    pub text: Option<String>,
    /// Seconds.
    pub duration: Option<f64>,
}

impl ResolvedAction {
    pub fn tap(target: ActionTarget) -> Self {
        Self {
            kind: ActionKind::Tap,
            target: Some(target),
            end: None,
            text: None,
            duration: None,
        }
    }

    pub fn long_press(at: Point, duration: f64) -> Self {
        Self {
            kind: ActionKind::LongPress,
            target: Some(ActionTarget::Point(at)),
            end: None,
            text: None,
            duration: Some(duration),
        }
    }

    pub fn swipe(from: Point, to: Point) -> Self {
        Self {
            kind: ActionKind::Swipe,
            target: Some(ActionTarget::Point(from)),
            end: Some(to),
            text: None,
            duration: None,
        }
    }

    pub fn send_keys(element: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::SendKeys,
            target: Some(ActionTarget::Element(element.into())),
            end: None,
            text: Some(text.into()),
            duration: None,
        }
    }
}

impl std::fmt::Display for ResolvedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        match &self.target {
            Some(ActionTarget::Point(p)) => write!(f, " at {p}")?,
            Some(ActionTarget::Element(label)) => write!(f, " on '{label}'")?,
            None => {}
        }
        if let Some(end) = self.end {
            write!(f, " to {end}")?;
        }
        if let Some(text) = &self.text {
            write!(f, " text '{text}'")?;
        }
        if let Some(d) = self.duration {
            write!(f, " for {d}s")?;
        }
        Ok(())
    }
}

/// Uniform executor result; never an error past the executor boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}
