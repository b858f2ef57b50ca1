//! Access control for Herald command invocations.
//!
//! Holds the caller identity snapshot delivered with each invocation, the
//! `AccessRule` variants attached to command descriptors, module-state
//! sources, and the fail-closed `AuthorizationGate` that turns them into an
//! allow/deny decision with a user-facing reason.

pub mod access_context;
pub mod access_gate;
pub mod access_rule;
pub mod module_state;

pub use access_context::*;
pub use access_gate::*;
pub use access_rule::*;
pub use module_state::*;
