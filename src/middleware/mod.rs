pub mod actor;
pub mod tracing;

pub use actor::{Actor, Role};
