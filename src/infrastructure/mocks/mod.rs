//! Test doubles for the infrastructure side.
//!
//! - [`ManualDriver`] steps a computation one poll at a time
//! - [`suspend`] yields once from inside a computation
//! - [`LogCapture`] records emitted `tracing` events

pub mod capture;
pub mod driver;

pub use capture::{CapturedEvent, LogCapture};
pub use driver::{suspend, ManualDriver, Suspend};
