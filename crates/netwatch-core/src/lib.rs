//! netwatch core - shared types for reachability monitoring
//!
//! This crate provides the domain types shared between the daemon
//! (netwatchd), the wire protocol, and the CLI client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod state;
pub mod transition;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use state::ReachState;
pub use transition::{Timestamp, Transition};
