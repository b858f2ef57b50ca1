//! Command routing and remote schema synchronisation for Herald.
//!
//! Descriptors are registered once from a closed, injected set. The registry
//! turns them into an immutable [`RouteTable`]; the resolver maps structured
//! addresses and free-text token sequences onto it; the synchronizer turns
//! the table into one schema tree per scope and reconciles it against the
//! last-applied snapshot with as few remote writes as possible.
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use herald_commands::{
//!     tokenize_free_text, CommandContext, CommandDescriptor, CommandRegistry, FreeTextHandler,
//! };
//!
//! struct Balance;
//!
//! #[async_trait]
//! impl FreeTextHandler for Balance {
//!     async fn handle_text(&self, _ctx: &CommandContext, _args: &[String]) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let load = CommandRegistry::new()
//!     .with(CommandDescriptor::new("eco/balance").on_free_text(Arc::new(Balance)))
//!     .build();
//! assert!(load.errors.is_empty());
//!
//! let tokens = tokenize_free_text("!balance @someone", "!").expect("prefixed text");
//! let matched = load.table.resolve_free_text(&tokens).expect("match");
//! assert_eq!(matched.command.descriptor.location, "eco/balance");
//! assert_eq!(matched.residual, vec!["@someone".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod command_descriptor;
pub mod command_error;
pub mod command_handler;
pub mod command_location;
pub mod command_manifest;
pub mod command_registry;
pub mod command_resolver;
pub mod command_schema;
pub mod command_sync;

pub use command_descriptor::*;
pub use command_error::*;
pub use command_handler::*;
pub use command_location::*;
pub use command_manifest::*;
pub use command_registry::*;
pub use command_resolver::*;
pub use command_schema::*;
pub use command_sync::*;
