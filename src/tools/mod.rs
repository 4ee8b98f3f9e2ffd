//! Tool layer: typed arguments, the ten sandbox tools and the dispatcher
//! that routes invocations to them.

pub mod args;
pub mod dispatcher;
pub mod error;
pub mod sandbox;
pub mod traits;

pub use dispatcher::ToolDispatcher;
pub use error::ToolError;
pub use traits::{Tool, ToolOutput, ToolSpec};
