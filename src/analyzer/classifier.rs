use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{SeeTapError, SeeTapResult};
use crate::llm::provider::LlmProvider;
use crate::llm::response::image_data_url;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::types::ScreenCapture;

/// External multimodal classifier. Returns the raw reply text; validation
/// happens in the step analyzer.
#[async_trait]
pub trait StepClassifier: Send + Sync {
    async fn classify_steps(&self, instructions: &[String], capture: &ScreenCapture) -> SeeTapResult<String>;
}

const SYSTEM_PROMPT: &str = "\
You analyze user steps for an iOS mobile application from a screenshot.
You answer with JSON and only JSON.";

pub fn build_prompt(instructions: &[String], width: u32, height: u32) -> String {
    let steps = instructions
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "The user gives a list of steps. For each step, in the same order:\n\
         1. Convert it into one action: tap, long_press, swipe, send_keys, or unknown.\n\
         2. Decide whether it has already been done on this screen (\"already_done\"), \
            can be done on this screen now (\"can_be_done\"), or can only be done on a \
            later screen (\"will_be_done_next\").\n\
         3. For \"can_be_done\", identify the target either by its visible label in \
            \"element\" or by its position in \"coordinates\" as \"x,y\", never both. \
            A swipe gives \"x1,y1,x2,y2\". A long_press gives \"duration\" in seconds. \
            A send_keys gives \"element\" and \"text\".\n\
         4. Any other status, or a step that cannot be performed, must carry a \"reason\".\n\
         5. Coordinates are in screen points within {width}x{height}, origin top-left.\n\n\
         User steps:\n{steps}\n\n\
         Screen dimension: {width}x{height}\n\n\
         Reply with a JSON array, one object per step:\n\
         [\n  {{\"original_step\": \"tap Login\", \"action\": \"tap\", \"element\": \"Login\", \"status\": \"can_be_done\"}},\n  \
         {{\"original_step\": \"tap Pay\", \"action\": \"tap\", \"status\": \"will_be_done_next\", \"reason\": \"Pay is not visible\"}}\n]"
    )
}

/// Classifier backed by the `classifier` role's vision-capable chat model.
pub struct LlmStepClassifier {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
}

impl LlmStepClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig) -> Self {
        Self { provider, call }
    }
}

#[async_trait]
impl StepClassifier for LlmStepClassifier {
    async fn classify_steps(&self, instructions: &[String], capture: &ScreenCapture) -> SeeTapResult<String> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_image(
                image_data_url(&capture.image_bytes),
                build_prompt(instructions, capture.width, capture.height),
            ),
        ];
        tracing::info!(
            provider = self.provider.name(),
            model = %self.call.model,
            steps = instructions.len(),
            "classifying steps"
        );
        let response = self
            .provider
            .chat(messages, &self.call)
            .await
            .map_err(|e| SeeTapError::Classification(format!("classifier call failed: {e}")))?;
        tracing::debug!(reply = %response.content, "classifier reply");
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{LlmResponse, MessageContent};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capturing {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl LlmProvider for Capturing {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn chat(&self, messages: Vec<ChatMessage>, _: &CallConfig) -> SeeTapResult<LlmResponse> {
            self.seen.lock().unwrap().extend(messages);
            Ok(LlmResponse {
                content: "[]".into(),
                ..Default::default()
            })
        }
    }

    #[test]
    fn prompt_numbers_steps_and_states_dimensions() {
        let prompt = build_prompt(&["tap Login".into(), "swipe carousel".into()], 390, 844);
        assert!(prompt.contains("1. tap Login\n2. swipe carousel"));
        assert!(prompt.contains("390x844"));
    }

    #[tokio::test]
    async fn screenshot_travels_as_image_part() {
        let provider = Arc::new(Capturing::default());
        let classifier = LlmStepClassifier::new(
            provider.clone(),
            CallConfig {
                model: "m".into(),
                stream: false,
                temperature: 0.0,
                max_tokens: 512,
            },
        );
        let capture = ScreenCapture {
            image_bytes: vec![1, 2, 3],
            width: 390,
            height: 844,
        };
        let reply = classifier.classify_steps(&["tap Login".into()], &capture).await.unwrap();
        assert_eq!(reply, "[]");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let MessageContent::Parts(parts) = &seen[1].content else {
            panic!("user turn should carry parts");
        };
        let json = serde_json::to_string(parts).unwrap();
        assert!(json.contains("data:image/png;base64,"));
    }
}
