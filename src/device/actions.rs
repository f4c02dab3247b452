//! W3C pointer-action payloads for touch gestures.

use std::time::Duration;

use serde_json::{json, Value};

use crate::perception::types::Point;

const SWIPE_MOVE_MS: u64 = 300;

fn touch_sequence(steps: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": steps,
        }]
    })
}

fn move_to(p: Point, duration_ms: u64) -> Value {
    json!({ "type": "pointerMove", "duration": duration_ms, "origin": "viewport", "x": p.x, "y": p.y })
}

fn down() -> Value {
    json!({ "type": "pointerDown", "button": 0 })
}

fn up() -> Value {
    json!({ "type": "pointerUp", "button": 0 })
}

fn pause(ms: u64) -> Value {
    json!({ "type": "pause", "duration": ms })
}

pub fn tap(at: Point) -> Value {
    touch_sequence(vec![move_to(at, 0), down(), pause(50), up()])
}

pub fn long_press(at: Point, hold: Duration) -> Value {
    touch_sequence(vec![move_to(at, 0), down(), pause(hold.as_millis() as u64), up()])
}

/// Press at `from`, hold briefly, move linearly to `to`, release.
pub fn swipe(from: Point, to: Point, hold_ms: u64) -> Value {
    touch_sequence(vec![
        move_to(from, 0),
        down(),
        pause(hold_ms),
        move_to(to, SWIPE_MOVE_MS),
        up(),
    ])
}
