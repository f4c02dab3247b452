use serde::{Deserialize, Serialize};

/// Per-instruction lifecycle inside one batch run.
///
/// `Pending → Resolved | Deferred | Unresolvable`, `Resolved → Done | Failed`,
/// `Failed → Resolved` on retry or `Exhausted` once the budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionState {
    Pending,
    Resolved,
    Deferred,
    Unresolvable,
    Done,
    Failed,
    Exhausted,
}

impl InstructionState {
    /// No further attempts are made from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstructionState::Done | InstructionState::Unresolvable | InstructionState::Exhausted
        )
    }
}

impl std::fmt::Display for InstructionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InstructionState::Pending => "PENDING",
            InstructionState::Resolved => "RESOLVED",
            InstructionState::Deferred => "DEFERRED",
            InstructionState::Unresolvable => "UNRESOLVABLE",
            InstructionState::Done => "DONE",
            InstructionState::Failed => "FAILED",
            InstructionState::Exhausted => "EXHAUSTED",
        })
    }
}

/// Final word on one instruction of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionReport {
    pub instruction: String,
    pub final_state: InstructionState,
    pub attempts: u32,
    pub detail: Option<String>,
}

impl std::fmt::Display for InstructionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} (attempts: {})", self.final_state, self.instruction, self.attempts)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}
