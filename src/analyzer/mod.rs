pub mod classifier;
pub mod schema;
pub mod step_analyzer;

pub use classifier::{LlmStepClassifier, StepClassifier};
pub use schema::{StepResult, StepStatus};
pub use step_analyzer::StepAnalyzer;
