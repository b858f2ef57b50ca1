//! Invocation dispatch: resolve, authorize, run, and reply at most once.

pub mod dispatch_config;
pub mod dispatcher;
pub mod invocation;

pub use dispatch_config::*;
pub use dispatcher::*;
pub use invocation::*;
