/// Perception pipeline: backend selection from config plus a confidence floor.
use std::sync::Arc;

use crate::config::{PerceptionBackend, PerceptionConfig};
use crate::errors::SeeTapResult;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::perception::traits::PerceptionProvider;
use crate::perception::types::{Detection, ScreenCapture};
use crate::perception::vlm_detector::VlmDetector;
use crate::perception::yolo_detector::YoloDetector;

pub struct PerceptionPipeline {
    provider: Option<Arc<dyn PerceptionProvider>>,
    min_confidence: f32,
}

impl PerceptionPipeline {
    pub fn new(provider: Option<Arc<dyn PerceptionProvider>>, min_confidence: f32) -> Self {
        Self {
            provider,
            min_confidence,
        }
    }

    /// A pipeline that never detects anything.
    pub fn disabled() -> Self {
        Self::new(None, 0.0)
    }

    pub fn from_config(cfg: &PerceptionConfig, registry: &ProviderRegistry) -> SeeTapResult<Self> {
        let provider: Option<Arc<dyn PerceptionProvider>> = match cfg.backend {
            PerceptionBackend::Yolo => Some(Arc::new(YoloDetector::new(
                &cfg.model_path,
                cfg.conf_threshold,
                cfg.iou_threshold,
                cfg.class_names.clone(),
            )?)),
            PerceptionBackend::Vlm => {
                let (provider, call) = registry.call_config_for_role(Role::Vision)?;
                Some(Arc::new(VlmDetector::new(provider, call)))
            }
            PerceptionBackend::None => None,
        };
        tracing::info!(
            backend = provider.as_ref().map(|p| p.name()).unwrap_or("none"),
            min_confidence = cfg.min_confidence,
            "perception pipeline ready"
        );
        Ok(Self::new(provider, cfg.min_confidence))
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Run detection, keeping provider order and dropping low-confidence hits.
    pub async fn perceive(&self, capture: &ScreenCapture) -> SeeTapResult<Vec<Detection>> {
        let Some(provider) = &self.provider else {
            return Ok(Vec::new());
        };
        let mut detections = provider.detect(capture).await?;
        let before = detections.len();
        detections.retain(|d| d.confidence >= self.min_confidence);
        tracing::debug!(
            provider = provider.name(),
            total = before,
            kept = detections.len(),
            "perception complete"
        );
        Ok(detections)
    }
}
