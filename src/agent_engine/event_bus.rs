use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent_engine::state::InstructionReport;

/// Progress published by the automation loop while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    CycleStarted {
        cycle: u32,
        pending: usize,
    },
    StepAnalyzed {
        instruction: String,
        status: String,
        reason: Option<String>,
    },
    ActionCompleted {
        instruction: String,
        action: String,
        success: bool,
        error: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    InstructionFinished(InstructionReport),
}

impl std::fmt::Display for LoopEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopEvent::CycleStarted { cycle, pending } => {
                write!(f, "cycle {cycle}: {pending} instruction(s) pending")
            }
            LoopEvent::StepAnalyzed {
                instruction,
                status,
                reason,
            } => {
                write!(f, "  {instruction} -> {status}")?;
                match reason {
                    Some(r) => write!(f, " ({r})"),
                    None => Ok(()),
                }
            }
            LoopEvent::ActionCompleted {
                action, success, error, ..
            } => match (success, error) {
                (true, _) => write!(f, "  ok   {action}"),
                (false, Some(e)) => write!(f, "  fail {action}: {e}"),
                (false, None) => write!(f, "  fail {action}"),
            },
            LoopEvent::InstructionFinished(report) => write!(f, "{report}"),
        }
    }
}

/// Fan-out of loop events; sending without subscribers is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LoopEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: LoopEvent) {
        tracing::trace!(?event, "loop event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.send(LoopEvent::CycleStarted { cycle: 1, pending: 2 });
        bus.send(LoopEvent::CycleStarted { cycle: 2, pending: 1 });
        assert_eq!(rx.recv().await.unwrap().to_string(), "cycle 1: 2 instruction(s) pending");
        assert_eq!(rx.recv().await.unwrap().to_string(), "cycle 2: 1 instruction(s) pending");
    }

    #[test]
    fn send_without_subscribers_is_fine() {
        EventBus::new().send(LoopEvent::CycleStarted { cycle: 1, pending: 0 });
    }
}
