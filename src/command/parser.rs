/// Rule-based instruction parser.
///
/// Rules are tried in order, case-insensitively, and the first match wins.
/// Anything unmatched becomes `Intent::Unknown` so the caller can escalate to
/// a semantic classifier instead of the parser guessing.
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::command::intent::{Intent, Target};
use crate::errors::{SeeTapError, SeeTapResult};
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy)]
enum Rule {
    Tap,
    LongPress,
    Swipe,
    SendKeysQuoted,
    SendKeys,
}

static RULES: LazyLock<Vec<(Regex, Rule)>> = LazyLock::new(|| {
    [
        (r"(?i)(tap|click)\s+on\s+(.+)", Rule::Tap),
        (
            r"(?i)(long[- ]press)\s+on\s+(.+)\s+for\s+(\d+\.?\d*)\s+seconds?",
            Rule::LongPress,
        ),
        (r"(?i)(swipe)\s+from\s+(.+)\s+to\s+(.+)", Rule::Swipe),
        (r"(?i)(enter|type)\s+'(.+)'\s+in\s+the\s+(.+)", Rule::SendKeysQuoted),
        (r"(?i)(enter|type)\s+(.+)\s+in\s+the\s+(.+)", Rule::SendKeys),
    ]
    .into_iter()
    .map(|(pattern, rule)| (Regex::new(pattern).expect("command rule must compile"), rule))
    .collect()
});

/// Parse one instruction. Pure: the result depends on the text only.
pub fn parse(instruction: &str) -> SeeTapResult<Intent> {
    for (re, rule) in RULES.iter() {
        if let Some(caps) = re.captures(instruction) {
            let intent = build(*rule, &caps)?;
            tracing::debug!(instruction, ?rule, %intent, "instruction matched rule");
            return Ok(intent);
        }
    }
    tracing::debug!(instruction, "no rule matched");
    Ok(Intent::Unknown {
        text: instruction.to_string(),
    })
}

fn build(rule: Rule, caps: &Captures<'_>) -> SeeTapResult<Intent> {
    let group = |i: usize| caps.get(i).map(|m| m.as_str().trim()).unwrap_or_default();

    match rule {
        Rule::Tap => Ok(Intent::Tap {
            target: Target::Label(group(2).to_string()),
        }),
        Rule::LongPress => {
            let duration: f64 = group(3)
                .parse()
                .map_err(|e| SeeTapError::Parse(format!("duration '{}': {e}", group(3))))?;
            Ok(Intent::LongPress {
                target: Target::Label(group(2).to_string()),
                duration,
            })
        }
        Rule::Swipe => Ok(Intent::Swipe {
            from: parse_point(group(2))?,
            to: parse_point(group(3))?,
        }),
        Rule::SendKeysQuoted | Rule::SendKeys => Ok(Intent::SendKeys {
            text: group(2).trim_matches(|c| c == '\'' || c == '"').to_string(),
            target: group(3).to_string(),
        }),
    }
}

/// Parse `"x,y"`, `"(x, y)"` or `"x y"` into a point. Anything else is a `Parse` error.
pub fn parse_point(raw: &str) -> SeeTapResult<Point> {
    let nums = parse_ints(raw)?;
    match nums.as_slice() {
        [x, y] => Ok(Point::new(*x, *y)),
        _ => Err(SeeTapError::Parse(format!(
            "expected two coordinates in '{raw}', found {}",
            nums.len()
        ))),
    }
}

/// Parse a flat, comma/space separated integer list, tolerating brackets.
pub fn parse_ints(raw: &str) -> SeeTapResult<Vec<i32>> {
    let cleaned = raw.trim().trim_matches(|c| matches!(c, '(' | ')' | '[' | ']'));
    cleaned
        .split(|c: char| c == ',' || c.is_whitespace() || c == '(' || c == ')')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let s = s.trim();
            if let Ok(n) = s.parse::<i32>() {
                return Ok(n);
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() && f >= i32::MIN as f64 && f <= i32::MAX as f64 => Ok(f as i32),
                _ => Err(SeeTapError::Parse(format!("'{s}' is not a coordinate in '{raw}'"))),
            }
        })
        .collect()
}
