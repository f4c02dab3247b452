use async_trait::async_trait;

use crate::errors::SeeTapResult;
use crate::perception::types::{Detection, ScreenCapture};

/// Strategy trait for UI element detection.
/// Implementations: ONNX/YOLO and a vision language model.
#[async_trait]
pub trait PerceptionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// An empty list means "no elements found", not an error.
    async fn detect(&self, capture: &ScreenCapture) -> SeeTapResult<Vec<Detection>>;
}

/// Produces the current screen on demand.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    /// Fails with `SeeTapError::Capture` when the device session is unavailable.
    async fn capture_screen(&self) -> SeeTapResult<ScreenCapture>;
}
