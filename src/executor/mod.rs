pub mod action;
pub mod dispatcher;
pub mod driver;

pub use action::{ActionOutcome, ActionTarget, ResolvedAction};
pub use dispatcher::ActionExecutor;
pub use driver::DeviceDriver;
