pub mod intent;
pub mod parser;

pub use intent::{ActionKind, Intent, Target};
pub use parser::parse;
