pub mod actions;
pub mod bootstrap;
pub mod driver;
pub mod session;

pub use session::DeviceSession;
