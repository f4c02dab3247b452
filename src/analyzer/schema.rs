//! Strict boundary between the classifier's JSON reply and typed step results.
//!
//! Structural problems (not JSON, missing fields, unknown status or action
//! names, coordinates that are not numbers) reject the whole reply. Semantic
//! problems with a single `can_be_done` step (off-screen point, both an element
//! and coordinates, a missing parameter) only make that step unresolvable.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::intent::{ActionKind, Intent, Target};
use crate::command::parser::{self, parse_ints};
use crate::errors::{SeeTapError, SeeTapResult};
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    CanBeDone,
    AlreadyDone,
    WillBeDoneNext,
    Unresolvable,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StepStatus::CanBeDone => "can_be_done",
            StepStatus::AlreadyDone => "already_done",
            StepStatus::WillBeDoneNext => "will_be_done_next",
            StepStatus::Unresolvable => "unresolvable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub original_instruction: String,
    pub intent: Intent,
    pub status: StepStatus,
    pub reason: Option<String>,
}

impl StepResult {
    pub fn unresolvable(instruction: &str, intent: Intent, reason: impl Into<String>) -> Self {
        Self {
            original_instruction: instruction.to_string(),
            intent,
            status: StepStatus::Unresolvable,
            reason: Some(reason.into()),
        }
    }
}

/// One element of the classifier's reply array, before validation.
#[derive(Debug, Deserialize)]
pub struct RawStep {
    pub original_step: String,
    pub action: String,
    pub status: StepStatus,
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Coordinates as the classifier sent them, already normalized to integers.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Coords {
    Point(Point),
    Pair(Point, Point),
}

fn malformed(msg: impl std::fmt::Display) -> SeeTapError {
    SeeTapError::Classification(msg.to_string())
}

/// Cut the outermost `[...]` out of a reply, tolerating code fences and chatter.
pub fn extract_json_array(raw: &str) -> SeeTapResult<&str> {
    let body = crate::llm::response::strip_code_fences(raw);
    match (body.find('['), body.rfind(']')) {
        (Some(start), Some(end)) if end > start => Ok(&body[start..=end]),
        _ => Err(malformed(format!("reply holds no JSON array: {}", preview(body)))),
    }
}

fn preview(s: &str) -> String {
    s.chars().take(120).collect()
}

/// Parse and structurally validate a reply.
pub fn parse_reply(raw: &str) -> SeeTapResult<Vec<RawStep>> {
    let array = extract_json_array(raw)?;
    let steps: Vec<RawStep> =
        serde_json::from_str(array).map_err(|e| malformed(format!("reply does not match the step schema: {e}")))?;

    for step in &steps {
        if ActionKind::from_name(&step.action).is_none() {
            return Err(malformed(format!("unknown action '{}' for '{}'", step.action, step.original_step)));
        }
        if step.status != StepStatus::CanBeDone && step.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
            return Err(malformed(format!("status '{}' for '{}' has no reason", step.status, step.original_step)));
        }
        if let Some(value) = &step.coordinates {
            normalize_coordinates(value)?;
        }
        if let Some(value) = &step.duration {
            seconds(value)?;
        }
    }
    Ok(steps)
}

// ── Coordinate normalization ────────────────────────────────────────────────

fn number(value: &Value) -> SeeTapResult<i32> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite() && *f >= i32::MIN as f64 && *f <= i32::MAX as f64)
            .map(|f| f as i32)
            .ok_or_else(|| malformed(format!("coordinate {n} is not a finite number"))),
        Value::String(s) => match parse_ints(s).map_err(|e| malformed(e.to_string()))?.as_slice() {
            [n] => Ok(*n),
            _ => Err(malformed(format!("'{s}' is not a single coordinate"))),
        },
        other => Err(malformed(format!("{other} is not a coordinate"))),
    }
}

fn point(value: &Value) -> SeeTapResult<Point> {
    match normalize_coordinates(value)? {
        Some(Coords::Point(p)) => Ok(p),
        _ => Err(malformed(format!("{value} is not a single point"))),
    }
}

fn from_ints(nums: &[i32], source: &Value) -> SeeTapResult<Coords> {
    match nums {
        [x, y] => Ok(Coords::Point(Point::new(*x, *y))),
        [x1, y1, x2, y2] => Ok(Coords::Pair(Point::new(*x1, *y1), Point::new(*x2, *y2))),
        _ => Err(malformed(format!("cannot read coordinates from {source}"))),
    }
}

/// `"100,200"`, `"(100, 200)"`, `[100,200]`, `{"x":..,"y":..}`, and for
/// swipes `[[x,y],[x,y]]`, `"x1,y1,x2,y2"`, `{"start":..,"end":..}`.
/// `null`, `""` and `"None"` mean absent.
fn normalize_coordinates(value: &Value) -> SeeTapResult<Option<Coords>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("none") => Ok(None),
        Value::String(s) => {
            let nums = parse_ints(s).map_err(|e| malformed(e.to_string()))?;
            from_ints(&nums, value).map(Some)
        }
        Value::Array(items) if items.iter().all(|v| v.is_array() || v.is_object()) && items.len() == 2 => {
            Ok(Some(Coords::Pair(point(&items[0])?, point(&items[1])?)))
        }
        Value::Array(items) => {
            let nums = items.iter().map(number).collect::<SeeTapResult<Vec<_>>>()?;
            from_ints(&nums, value).map(Some)
        }
        Value::Object(map) => {
            if let (Some(x), Some(y)) = (map.get("x"), map.get("y")) {
                return Ok(Some(Coords::Point(Point::new(number(x)?, number(y)?))));
            }
            let start = map.get("start").or_else(|| map.get("from"));
            let end = map.get("end").or_else(|| map.get("to"));
            match (start, end) {
                (Some(s), Some(e)) => Ok(Some(Coords::Pair(point(s)?, point(e)?))),
                _ => Err(malformed(format!("cannot read coordinates from {value}"))),
            }
        }
        other => Err(malformed(format!("cannot read coordinates from {other}"))),
    }
}

fn seconds(value: &Value) -> SeeTapResult<f64> {
    let secs = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('s').trim().parse::<f64>().ok(),
        _ => None,
    };
    secs.filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| malformed(format!("duration {value} is not a number of seconds")))
}

// ── Semantic validation ─────────────────────────────────────────────────────

fn present(s: &Option<String>) -> Option<&str> {
    s.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none") && !s.eq_ignore_ascii_case("null"))
}

/// Element or coordinate target, never both.
fn single_target(
    element: Option<&str>,
    coords: Option<Coords>,
    width: u32,
    height: u32,
) -> Result<Target, String> {
    match (element, coords) {
        (Some(_), Some(_)) => Err("ambiguous target".into()),
        (Some(label), None) => Ok(Target::Label(label.to_string())),
        (None, Some(Coords::Point(p))) if p.within(width, height) => Ok(Target::Point(p)),
        (None, Some(Coords::Point(p))) => Err(format!("coordinates {p} are outside the {width}x{height} screen")),
        (None, Some(Coords::Pair(..))) => Err("expected a single point, got a pair".into()),
        (None, None) => Err("missing element or coordinates".into()),
    }
}

/// Reject intents whose coordinates fall off the screen.
fn on_screen(intent: Intent, width: u32, height: u32) -> Result<Intent, String> {
    let points: Vec<Point> = match &intent {
        Intent::Tap { target: Target::Point(p) } | Intent::LongPress { target: Target::Point(p), .. } => vec![*p],
        Intent::Swipe { from, to } => vec![*from, *to],
        _ => Vec::new(),
    };
    match points.iter().find(|p| !p.within(width, height)) {
        Some(p) => Err(format!("coordinates {p} are outside the {width}x{height} screen")),
        None => Ok(intent),
    }
}

/// Turn a structurally valid `can_be_done` step into an intent, or explain why not.
fn build_intent(step: &RawStep, width: u32, height: u32) -> Result<Intent, String> {
    // parse_reply already rejected anything these could fail on.
    let kind = ActionKind::from_name(&step.action).unwrap_or(ActionKind::Unknown);
    let coords = match &step.coordinates {
        Some(v) => normalize_coordinates(v).map_err(|e| e.to_string())?,
        None => None,
    };
    let element = present(&step.element);

    match kind {
        ActionKind::Tap => Ok(Intent::Tap {
            target: single_target(element, coords, width, height)?,
        }),
        ActionKind::LongPress => {
            let target = single_target(element, coords, width, height)?;
            let duration = match &step.duration {
                Some(v) => seconds(v).map_err(|e| e.to_string())?,
                None => return Err("missing duration".into()),
            };
            Ok(Intent::LongPress { target, duration })
        }
        ActionKind::Swipe => match coords {
            Some(Coords::Pair(from, to)) if from.within(width, height) && to.within(width, height) => {
                Ok(Intent::Swipe { from, to })
            }
            Some(Coords::Pair(from, to)) => {
                Err(format!("swipe {from} -> {to} leaves the {width}x{height} screen"))
            }
            _ => Err("swipe needs a start and an end point".into()),
        },
        ActionKind::SendKeys => {
            if coords.is_some() && element.is_some() {
                return Err("ambiguous target".into());
            }
            let target = element.ok_or("missing element for send_keys")?;
            let text = step.text.as_deref().ok_or("missing text for send_keys")?;
            Ok(Intent::SendKeys {
                target: target.to_string(),
                text: text.to_string(),
            })
        }
        ActionKind::Unknown => {
            let source = present(&step.text).unwrap_or(&step.original_step);
            match parser::parse(source) {
                Ok(intent) if !intent.is_unknown() => on_screen(intent, width, height),
                Ok(_) => Err(format!("could not interpret '{source}'")),
                Err(e) => Err(e.to_string()),
            }
        }
    }
}

/// Validate one reply step into a result for `instruction`.
pub fn to_step_result(instruction: &str, step: &RawStep, width: u32, height: u32) -> StepResult {
    let fallback = || Intent::Unknown {
        text: step.original_step.clone(),
    };

    if step.status != StepStatus::CanBeDone {
        return StepResult {
            original_instruction: instruction.to_string(),
            intent: build_intent(step, width, height).unwrap_or_else(|_| fallback()),
            status: step.status,
            reason: step.reason.clone(),
        };
    }

    match build_intent(step, width, height) {
        Ok(intent) => StepResult {
            original_instruction: instruction.to_string(),
            intent,
            status: StepStatus::CanBeDone,
            reason: step.reason.clone(),
        },
        Err(reason) => {
            tracing::debug!(instruction, %reason, "step rejected");
            StepResult::unresolvable(instruction, fallback(), reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn step(v: Value) -> RawStep {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn fenced_reply_parses() {
        let raw = "```json\n[{\"original_step\":\"tap Login\",\"action\":\"tap\",\"element\":\"Login\",\"status\":\"can_be_done\"}]\n```";
        let steps = parse_reply(raw).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].element.as_deref(), Some("Login"));
    }

    #[test]
    fn array_is_found_inside_chatter() {
        assert_eq!(extract_json_array("Sure! [1, 2] hope that helps").unwrap(), "[1, 2]");
    }

    #[test]
    fn structural_violations_are_classification_errors() {
        let cases = [
            "I could not see the screen.",
            "{\"original_step\":\"x\"}",
            "[{\"action\":\"tap\",\"status\":\"can_be_done\"}]",
            "[{\"original_step\":\"x\",\"action\":\"tap\",\"status\":\"maybe\"}]",
            "[{\"original_step\":\"x\",\"action\":\"pinch\",\"status\":\"can_be_done\"}]",
            "[{\"original_step\":\"x\",\"action\":\"tap\",\"status\":\"will_be_done_next\"}]",
            "[{\"original_step\":\"x\",\"action\":\"tap\",\"coordinates\":\"left,top\",\"status\":\"can_be_done\"}]",
        ];
        for raw in cases {
            let err = parse_reply(raw).unwrap_err();
            assert!(matches!(err, SeeTapError::Classification(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn coordinate_forms_normalize_to_the_same_point() {
        let want = Some(Coords::Point(Point::new(100, 200)));
        for v in [json!("100,200"), json!("(100, 200)"), json!([100, 200]), json!({"x": 100, "y": 200}), json!([100.7, "200"])] {
            assert_eq!(normalize_coordinates(&v).unwrap(), want, "{v}");
        }
    }

    #[test]
    fn swipe_pair_forms() {
        let want = Some(Coords::Pair(Point::new(10, 20), Point::new(300, 20)));
        for v in [
            json!([[10, 20], [300, 20]]),
            json!("10,20,300,20"),
            json!("(10, 20), (300, 20)"),
            json!({"start": [10, 20], "end": {"x": 300, "y": 20}}),
        ] {
            assert_eq!(normalize_coordinates(&v).unwrap(), want, "{v}");
        }
    }

    #[test]
    fn tap_by_coordinates_within_screen() {
        let s = step(json!({"original_step": "tap it", "action": "tap", "coordinates": "100,200", "status": "can_be_done"}));
        let r = to_step_result("tap it", &s, 390, 844);
        assert_eq!(r.status, StepStatus::CanBeDone);
        assert_eq!(r.intent, Intent::Tap { target: Target::Point(Point::new(100, 200)) });
    }

    #[test]
    fn off_screen_point_is_unresolvable_not_an_error() {
        let s = step(json!({"original_step": "tap", "action": "tap", "coordinates": [500, 200], "status": "can_be_done"}));
        let r = to_step_result("tap", &s, 390, 844);
        assert_eq!(r.status, StepStatus::Unresolvable);
        assert!(r.reason.unwrap().contains("outside"));
    }

    #[test]
    fn element_and_coordinates_together_is_ambiguous() {
        let s = step(json!({
            "original_step": "tap Login", "action": "tap", "element": "Login",
            "coordinates": "10,10", "status": "can_be_done"
        }));
        let r = to_step_result("tap Login", &s, 390, 844);
        assert_eq!(r.status, StepStatus::Unresolvable);
        assert_eq!(r.reason.as_deref(), Some("ambiguous target"));
    }

    #[test]
    fn none_element_counts_as_absent() {
        let s = step(json!({
            "original_step": "tap", "action": "tap", "element": "None",
            "coordinates": "10,10", "status": "can_be_done"
        }));
        assert_eq!(to_step_result("tap", &s, 390, 844).status, StepStatus::CanBeDone);
    }

    #[test]
    fn missing_parameters_are_unresolvable() {
        let no_text = step(json!({"original_step": "type", "action": "send_keys", "element": "email", "status": "can_be_done"}));
        let no_duration = step(json!({"original_step": "hold", "action": "long_press", "coordinates": "1,1", "status": "can_be_done"}));
        let single_swipe = step(json!({"original_step": "swipe", "action": "swipe", "coordinates": "1,1", "status": "can_be_done"}));
        for s in [no_text, no_duration, single_swipe] {
            assert_eq!(to_step_result("x", &s, 390, 844).status, StepStatus::Unresolvable);
        }
    }

    #[test]
    fn unknown_action_falls_back_to_the_command_parser() {
        let s = step(json!({"original_step": "tap on Settings", "action": "unknown", "status": "can_be_done"}));
        let r = to_step_result("tap on Settings", &s, 390, 844);
        assert_eq!(r.status, StepStatus::CanBeDone);
        assert_eq!(r.intent, Intent::Tap { target: Target::Label("Settings".into()) });

        let s = step(json!({"original_step": "make it pretty", "action": "unknown", "status": "can_be_done"}));
        assert_eq!(to_step_result("make it pretty", &s, 390, 844).status, StepStatus::Unresolvable);
    }

    #[test]
    fn deferred_steps_keep_their_reason() {
        let s = step(json!({
            "original_step": "tap Pay", "action": "tap", "element": "Pay",
            "status": "will_be_done_next", "reason": "Pay is on the checkout screen"
        }));
        let r = to_step_result("tap Pay", &s, 390, 844);
        assert_eq!(r.status, StepStatus::WillBeDoneNext);
        assert_eq!(r.intent, Intent::Tap { target: Target::Label("Pay".into()) });
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        for raw in [
            r#"[{"original_step":"tap","action":"tap","coordinates":"NaN,NaN","status":"can_be_done"}]"#,
            r#"[{"original_step":"tap","action":"tap","coordinates":"inf,5","status":"can_be_done"}]"#,
            r#"[{"original_step":"tap","action":"tap","coordinates":[1e300, 5],"status":"can_be_done"}]"#,
        ] {
            let err = parse_reply(raw).unwrap_err();
            assert!(matches!(err, SeeTapError::Classification(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn parser_fallback_is_bounds_checked() {
        let s = step(json!({"original_step": "swipe from 10,20 to 9999,-50", "action": "unknown", "status": "can_be_done"}));
        let r = to_step_result("swipe off screen", &s, 390, 844);
        assert_eq!(r.status, StepStatus::Unresolvable);
        assert!(r.reason.unwrap().contains("outside"));

        let s = step(json!({"original_step": "swipe from 10,20 to 300,20", "action": "unknown", "status": "can_be_done"}));
        assert_eq!(to_step_result("swipe", &s, 390, 844).status, StepStatus::CanBeDone);
    }
}
