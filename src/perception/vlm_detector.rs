/// Vision-language-model perception backend.
///
/// Sends the screen to the `vision` role and asks for a JSON list of visible
/// UI elements with pixel boxes in the screen's coordinate space.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{SeeTapError, SeeTapResult};
use crate::llm::provider::LlmProvider;
use crate::llm::response::{image_data_url, strip_code_fences};
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::traits::PerceptionProvider;
use crate::perception::types::{BoundingBox, Detection, ScreenCapture};

#[derive(Debug, Deserialize)]
struct ElementRecord {
    label: String,
    bbox: [f32; 4],
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

pub struct VlmDetector {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
}

impl VlmDetector {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig) -> Self {
        Self { provider, call }
    }
}

fn build_prompt(width: u32, height: u32) -> String {
    format!(
        "List every interactive or readable UI element on this mobile screen.\n\
         The screen is {width}x{height}. Give each element's bounding box in that \
         coordinate space as [x1, y1, x2, y2], top-left origin.\n\
         Use the visible text or accessibility name as the label.\n\
         Reply with JSON only, no prose:\n\
         [{{\"label\": \"Login button\", \"bbox\": [10, 10, 50, 30], \"confidence\": 0.9}}]"
    )
}

/// Parse a model reply into detections, dropping boxes that fall outside the screen.
fn parse_elements(raw: &str, width: u32, height: u32) -> SeeTapResult<Vec<Detection>> {
    let records: Vec<ElementRecord> = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| SeeTapError::Perception(format!("vision reply is not an element list: {e}")))?;

    let (w, h) = (width as f32, height as f32);
    Ok(records
        .into_iter()
        .filter_map(|r| {
            let [x1, y1, x2, y2] = r.bbox;
            let valid = x1 >= 0.0 && y1 >= 0.0 && x2 > x1 && y2 > y1 && x2 <= w && y2 <= h;
            if !valid {
                tracing::debug!(label = %r.label, bbox = ?r.bbox, "dropping off-screen element");
                return None;
            }
            Some(Detection::new(BoundingBox::new(x1, y1, x2, y2), r.label, r.confidence))
        })
        .collect())
}

#[async_trait]
impl PerceptionProvider for VlmDetector {
    fn name(&self) -> &str {
        "vlm"
    }

    async fn detect(&self, capture: &ScreenCapture) -> SeeTapResult<Vec<Detection>> {
        let messages = vec![ChatMessage::user_with_image(
            image_data_url(&capture.image_bytes),
            build_prompt(capture.width, capture.height),
        )];
        let reply = self.provider.chat(messages, &self.call).await?;
        let detections = parse_elements(&reply.content, capture.width, capture.height)?;
        tracing::debug!(count = detections.len(), provider = self.provider.name(), "VLM detections");
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::LlmResponse;

    struct CannedProvider(&'static str);

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn chat(&self, _: Vec<ChatMessage>, _: &CallConfig) -> SeeTapResult<LlmResponse> {
            Ok(LlmResponse {
                content: self.0.to_string(),
                reasoning: String::new(),
            })
        }
    }

    fn call() -> CallConfig {
        CallConfig {
            model: "m".into(),
            stream: false,
            temperature: 0.0,
            max_tokens: 512,
        }
    }

    #[tokio::test]
    async fn fenced_reply_becomes_detections_in_order() {
        let reply = "```json\n[{\"label\":\"Login button\",\"bbox\":[10,10,50,30],\"confidence\":0.8},\
                     {\"label\":\"Sign up\",\"bbox\":[10,40,50,60]}]\n```";
        let detector = VlmDetector::new(Arc::new(CannedProvider(reply)), call());
        let capture = ScreenCapture { image_bytes: vec![], width: 390, height: 844 };

        let dets = detector.detect(&capture).await.unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].label, "Login button");
        assert_eq!(dets[0].center(), crate::perception::types::Point::new(30, 20));
        assert_eq!(dets[1].confidence, 1.0);
    }

    #[test]
    fn off_screen_boxes_are_dropped() {
        let dets = parse_elements(r#"[{"label":"a","bbox":[0,0,500,10]},{"label":"b","bbox":[0,0,5,5]}]"#, 390, 844)
            .unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "b");
    }

    #[test]
    fn prose_reply_is_perception_error() {
        assert!(matches!(
            parse_elements("I see a login button.", 390, 844),
            Err(SeeTapError::Perception(_))
        ));
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_elements("[]", 390, 844).unwrap().is_empty());
    }
}
