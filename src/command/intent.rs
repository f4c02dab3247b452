use serde::{Deserialize, Serialize};

use crate::perception::types::Point;

/// What an action is aimed at. A label and a coordinate are never both present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Label(String),
    Point(Point),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Label(label) => write!(f, "'{label}'"),
            Target::Point(p) => write!(f, "{p}"),
        }
    }
}

/// Structured form of one instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Tap { target: Target },
    LongPress { target: Target, duration: f64 },
    Swipe { from: Point, to: Point },
    SendKeys { target: String, text: String },
    Unknown { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    LongPress,
    Swipe,
    SendKeys,
    Unknown,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Tap => "tap",
            ActionKind::LongPress => "long_press",
            ActionKind::Swipe => "swipe",
            ActionKind::SendKeys => "send_keys",
            ActionKind::Unknown => "unknown",
        }
    }

    /// Accepts the names a classifier tends to emit.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "tap" | "click" => Some(ActionKind::Tap),
            "long_press" | "longpress" => Some(ActionKind::LongPress),
            "swipe" | "scroll" => Some(ActionKind::Swipe),
            "send_keys" | "type" | "enter" | "input" => Some(ActionKind::SendKeys),
            "unknown" | "none" | "" => Some(ActionKind::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Intent {
    pub fn kind(&self) -> ActionKind {
        match self {
            Intent::Tap { .. } => ActionKind::Tap,
            Intent::LongPress { .. } => ActionKind::LongPress,
            Intent::Swipe { .. } => ActionKind::Swipe,
            Intent::SendKeys { .. } => ActionKind::SendKeys,
            Intent::Unknown { .. } => ActionKind::Unknown,
        }
    }

    /// Label that has to be found on screen before the action can run, if any.
    pub fn target_label(&self) -> Option<&str> {
        match self {
            Intent::Tap { target: Target::Label(l) }
            | Intent::LongPress { target: Target::Label(l), .. } => Some(l),
            Intent::SendKeys { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Intent::Unknown { .. })
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Tap { target } => write!(f, "tap {target}"),
            Intent::LongPress { target, duration } => {
                write!(f, "long_press {target} for {duration}s")
            }
            Intent::Swipe { from, to } => write!(f, "swipe {from} -> {to}"),
            Intent::SendKeys { target, text } => write!(f, "send_keys '{text}' into '{target}'"),
            Intent::Unknown { text } => write!(f, "unknown '{text}'"),
        }
    }
}
