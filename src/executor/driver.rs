use std::time::Duration;

use async_trait::async_trait;

use crate::errors::SeeTapResult;
use crate::perception::types::Point;

/// Primitive device actions. Implemented by the Appium session; faked in tests.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn tap(&self, at: Point) -> SeeTapResult<()>;

    async fn long_press(&self, at: Point, hold: Duration) -> SeeTapResult<()>;

    async fn swipe(&self, from: Point, to: Point) -> SeeTapResult<()>;

    /// Locate an element by label on the device side and click it.
    async fn tap_element(&self, label: &str) -> SeeTapResult<()>;

    /// Focus the element found by label and inject `text`.
    async fn send_keys(&self, label: &str, text: &str) -> SeeTapResult<()>;
}
