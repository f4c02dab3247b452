use std::collections::HashSet;
use std::sync::Arc;

use crate::analyzer::classifier::StepClassifier;
use crate::analyzer::schema::{parse_reply, to_step_result, StepResult, StepStatus};
use crate::command::intent::Intent;
use crate::errors::{SeeTapError, SeeTapResult};
use crate::perception::types::ScreenCapture;

/// Batch of instructions + current screen → one `StepResult` per instruction.
pub struct StepAnalyzer {
    classifier: Arc<dyn StepClassifier>,
}

impl StepAnalyzer {
    pub fn new(classifier: Arc<dyn StepClassifier>) -> Self {
        Self { classifier }
    }

    /// Instructions in `done` are reported `AlreadyDone` without asking the
    /// classifier. Results come back in input order. A reply that breaks the
    /// schema fails the whole call with `Classification`.
    pub async fn analyze(
        &self,
        instructions: &[String],
        capture: &ScreenCapture,
        done: &HashSet<String>,
    ) -> SeeTapResult<Vec<StepResult>> {
        let to_classify: Vec<String> = instructions.iter().filter(|i| !done.contains(*i)).cloned().collect();

        let mut classified = Vec::with_capacity(to_classify.len());
        if !to_classify.is_empty() {
            let raw = self.classifier.classify_steps(&to_classify, capture).await?;
            let steps = parse_reply(&raw)?;
            if steps.len() != to_classify.len() {
                return Err(SeeTapError::Classification(format!(
                    "expected {} steps in reply, got {}",
                    to_classify.len(),
                    steps.len()
                )));
            }
            classified = to_classify
                .iter()
                .zip(&steps)
                .map(|(instruction, step)| to_step_result(instruction, step, capture.width, capture.height))
                .collect();
        }

        let mut classified = classified.into_iter();
        let results = instructions
            .iter()
            .map(|instruction| {
                if done.contains(instruction) {
                    return already_done(instruction);
                }
                // One classified result per non-suppressed instruction, same order.
                classified.next().unwrap_or_else(|| already_done(instruction))
            })
            .collect::<Vec<_>>();

        for r in &results {
            tracing::info!(
                instruction = %r.original_instruction,
                status = %r.status,
                intent = %r.intent,
                reason = r.reason.as_deref().unwrap_or(""),
                "step analyzed"
            );
        }
        Ok(results)
    }
}

fn already_done(instruction: &str) -> StepResult {
    StepResult {
        original_instruction: instruction.to_string(),
        intent: Intent::Unknown {
            text: instruction.to_string(),
        },
        status: StepStatus::AlreadyDone,
        reason: Some("completed in an earlier cycle".into()),
    }
}
