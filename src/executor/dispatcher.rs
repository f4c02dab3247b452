/// Action executor: resolved action → one primitive driver call → `ActionOutcome`.
use std::sync::Arc;
use std::time::Duration;

use crate::command::intent::ActionKind;
use crate::errors::{with_timeout, SeeTapResult};
use crate::executor::action::{ActionOutcome, ActionTarget, ResolvedAction};
use crate::executor::driver::DeviceDriver;
use crate::perception::types::Point;

pub const UNSUPPORTED: &str = "unsupported or incomplete action";

/// A fully-parameterised primitive; only constructible when every required
/// parameter is present.
#[derive(Debug)]
enum Primitive<'a> {
    Tap(Point),
    TapElement(&'a str),
    LongPress(Point, Duration),
    Swipe(Point, Point),
    SendKeys(&'a str, &'a str),
}

/// Dispatch table: kind + parameters → primitive. A hold must finish inside
/// the per-call timeout.
fn plan(action: &ResolvedAction, max_hold: Duration) -> Option<Primitive<'_>> {
    match (action.kind, action.target.as_ref()) {
        (ActionKind::Tap, Some(ActionTarget::Point(p))) => Some(Primitive::Tap(*p)),
        (ActionKind::Tap, Some(ActionTarget::Element(label))) => Some(Primitive::TapElement(label)),
        (ActionKind::LongPress, Some(ActionTarget::Point(p))) => {
            let hold = Duration::try_from_secs_f64(action.duration?).ok()?;
            (hold < max_hold).then_some(Primitive::LongPress(*p, hold))
        }
        (ActionKind::Swipe, Some(ActionTarget::Point(from))) => Some(Primitive::Swipe(*from, action.end?)),
        (ActionKind::SendKeys, Some(ActionTarget::Element(label))) => {
            Some(Primitive::SendKeys(label, action.text.as_deref()?))
        }
        _ => None,
    }
}

pub struct ActionExecutor {
    driver: Arc<dyn DeviceDriver>,
    call_timeout_secs: u64,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn DeviceDriver>, call_timeout_secs: u64) -> Self {
        Self {
            driver,
            call_timeout_secs,
        }
    }

    /// Run one action. Driver faults and timeouts become failed outcomes;
    /// only fatal errors (a lost session) are returned as `Err`.
    pub async fn execute(&self, action: &ResolvedAction) -> SeeTapResult<ActionOutcome> {
        let Some(primitive) = plan(action, Duration::from_secs(self.call_timeout_secs)) else {
            tracing::warn!(%action, "{}", UNSUPPORTED);
            return Ok(ActionOutcome::failed(UNSUPPORTED));
        };

        let driver = self.driver.as_ref();
        let call = async {
            match primitive {
                Primitive::Tap(p) => driver.tap(p).await,
                Primitive::TapElement(label) => driver.tap_element(label).await,
                Primitive::LongPress(p, hold) => driver.long_press(p, hold).await,
                Primitive::Swipe(from, to) => driver.swipe(from, to).await,
                Primitive::SendKeys(label, text) => driver.send_keys(label, text).await,
            }
        };

        match with_timeout(self.call_timeout_secs, action.kind.as_str(), call).await {
            Ok(()) => {
                tracing::info!(%action, "action performed");
                Ok(ActionOutcome::ok())
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(%action, error = %e, "action aborted");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(%action, error = %e, "action failed");
                Ok(ActionOutcome::failed(e.to_string()))
            }
        }
    }
}
