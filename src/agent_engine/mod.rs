pub mod engine;
pub mod event_bus;
pub mod loop_control;
pub mod state;

pub use engine::AutomationLoop;
pub use event_bus::{EventBus, LoopEvent};
pub use state::{InstructionReport, InstructionState};
