use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::errors::SeeTapResult;
use crate::perception::traits::ScreenSource;

#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub max_wait_ms: u64,
    pub check_interval_ms: u64,
    /// Consecutive identical frames required to call the screen settled.
    pub min_stable_frames: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 3000,
            check_interval_ms: 250,
            min_stable_frames: 1,
        }
    }
}

pub struct VisualStabilityDetector {
    config: StabilityConfig,
    last_frame_hash: Option<u64>,
    stable_frame_count: usize,
}

impl VisualStabilityDetector {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            last_frame_hash: None,
            stable_frame_count: 0,
        }
    }

    /// Sampled hash; sampling keeps this cheap on full-resolution screenshots.
    pub fn frame_hash(frame: &[u8]) -> u64 {
        let mut hasher = DefaultHasher::new();
        frame.len().hash(&mut hasher);
        let step = (frame.len() / 4096).max(1);
        for i in (0..frame.len()).step_by(step) {
            frame[i].hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Feed one frame; true once enough consecutive frames matched.
    pub fn is_stable(&mut self, frame: &[u8]) -> bool {
        let current = Self::frame_hash(frame);
        match self.last_frame_hash {
            Some(last) if last == current => self.stable_frame_count += 1,
            _ => self.stable_frame_count = 0,
        }
        self.last_frame_hash = Some(current);
        self.stable_frame_count >= self.config.min_stable_frames
    }
}

/// Poll the screen until it stops changing or the budget runs out.
/// Returns whether the screen settled.
pub async fn wait_for_visual_stability(
    source: &dyn ScreenSource,
    config: &StabilityConfig,
) -> SeeTapResult<bool> {
    if config.max_wait_ms == 0 {
        return Ok(true);
    }
    let mut detector = VisualStabilityDetector::new(config.clone());
    let start = std::time::Instant::now();

    while start.elapsed() < Duration::from_millis(config.max_wait_ms) {
        let frame = source.capture_screen().await?;
        if detector.is_stable(&frame.image_bytes) {
            tracing::debug!(elapsed = ?start.elapsed(), "screen settled");
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(config.check_interval_ms)).await;
    }

    tracing::warn!(elapsed = ?start.elapsed(), "screen did not settle in time");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::ScreenCapture;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Changes for the first `changing` captures, then stays constant.
    struct Animated {
        calls: AtomicUsize,
        changing: usize,
    }

    #[async_trait]
    impl ScreenSource for Animated {
        async fn capture_screen(&self) -> SeeTapResult<ScreenCapture> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let byte = if n < self.changing { n as u8 } else { 255 };
            Ok(ScreenCapture { image_bytes: vec![byte; 64], width: 8, height: 8 })
        }
    }

    #[test]
    fn detector_needs_consecutive_matches() {
        let mut d = VisualStabilityDetector::new(StabilityConfig {
            min_stable_frames: 2,
            ..Default::default()
        });
        assert!(!d.is_stable(b"aaaa"));
        assert!(!d.is_stable(b"aaaa"));
        assert!(!d.is_stable(b"bbbb"));
        assert!(!d.is_stable(b"bbbb"));
        assert!(d.is_stable(b"bbbb"));
    }

    #[tokio::test]
    async fn settles_after_animation() {
        let source = Animated { calls: AtomicUsize::new(0), changing: 3 };
        let cfg = StabilityConfig { max_wait_ms: 2000, check_interval_ms: 1, min_stable_frames: 1 };
        assert!(wait_for_visual_stability(&source, &cfg).await.unwrap());
        assert_eq!(source.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn zero_budget_skips_polling() {
        let source = Animated { calls: AtomicUsize::new(0), changing: 100 };
        let cfg = StabilityConfig { max_wait_ms: 0, ..Default::default() };
        assert!(wait_for_visual_stability(&source, &cfg).await.unwrap());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
