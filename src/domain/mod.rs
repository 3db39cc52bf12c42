//! Domain layer - pure types with no runtime behavior.
//!
//! This layer contains the core vocabulary of the crate:
//! - Substitution scopes
//! - The error taxonomy
//! - Test double variants
//! - Canned outcomes and their resolution rules
//! - Ledger records
//!
//! All types in this layer are pure and easily testable.

pub mod call;
pub mod error;
pub mod kind;
pub mod outcome;
pub mod scope;
