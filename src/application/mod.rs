//! Application layer - orchestration of substitutions and test doubles.
//!
//! This layer drives the domain types at runtime:
//! - Substitution groups and their stack discipline
//! - The suspension-aware activator for futures and streams
//! - Call ledgers, waiters and verification queries
//! - Synchronous and deferred-result test doubles
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod activator;
pub(crate) mod assertions;
pub mod double;
pub mod group;
pub mod ledger;
pub mod mock;
pub mod ports;
pub(crate) mod signal;

