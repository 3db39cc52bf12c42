//! # async-patch
//!
//! Suspension-aware patching and deferred-result test doubles for async Rust.
//!
//! The crate provides two things test authors usually need together:
//!
//! - **Substitutions** that temporarily replace named values in a
//!   [`Namespace`] while a future or stream runs. A substitution's [`Scope`]
//!   decides when it is visible: `Global` substitutions stay in place for the
//!   whole life of the computation, `Limited` ones are only visible while the
//!   computation is actually running a step and are hidden whenever it is
//!   suspended.
//! - **Test doubles** whose calls return deferred results ([`AsyncMock`]).
//!   Calling records the invocation immediately; the outcome is produced when
//!   the returned future is driven. Completions are recorded in a
//!   [`CallLedger`] that supports verification queries and waiters.
//!
//! ## Quick Start
//!
//! ```rust
//! use async_patch::mocks::{suspend, ManualDriver};
//! use async_patch::{Namespace, PatchGroup, Substitution, WithPatches};
//! use std::sync::{Arc, Mutex};
//!
//! let config = Namespace::with_entries("app.config", [("mode", "prod")]);
//! let observed = Arc::new(Mutex::new(Vec::new()));
//!
//! let (reader, log) = (config.clone(), Arc::clone(&observed));
//! let computation = async move {
//!     log.lock().unwrap().push(reader.get("mode"));
//!     suspend().await;
//!     log.lock().unwrap().push(reader.get("mode"));
//! };
//!
//! let group = PatchGroup::new().with(Substitution::object(&config, "mode", "test").limited());
//! let mut driver = ManualDriver::new(computation.with_patches(group));
//!
//! assert!(driver.step().is_pending());
//! // Hidden while the computation is suspended
//! assert_eq!(config.get("mode"), Some("prod"));
//!
//! driver.run_to_completion().unwrap();
//! assert_eq!(*observed.lock().unwrap(), [Some("test"), Some("test")]);
//! ```
//!
//! ## Doubles as Replacements
//!
//! Doubles are cheap handles, so one can be installed as a replacement while
//! the test keeps another for assertions:
//!
//! ```rust
//! use async_patch::{AsyncMock, Namespace, PatchGroup, Substitution, WithPatches};
//!
//! # futures::executor::block_on(async {
//! let http = Namespace::new("app.http");
//! http.set("fetch", AsyncMock::<&str, u16, std::io::Error>::returning("real_fetch", 500));
//! let double = AsyncMock::returning("fetch", 200);
//!
//! let client = http.clone();
//! let status = async move {
//!     let fetch = client.get("fetch").unwrap();
//!     fetch.call("/health").await
//! }
//! .with_patches(PatchGroup::new().with(Substitution::object(&http, "fetch", double.clone())))
//! .await
//! .unwrap();
//!
//! assert_eq!(status.unwrap(), 200);
//! double.assert_awaited_once_with(&"/health").unwrap();
//! # });
//! ```
//!
//! ## Decorated Factories
//!
//! [`PatchGroup::decorate`] wraps a function that builds computations. Every
//! call runs with its own copy of the group, so concurrent invocations never
//! share activation state. Further decorators stack with
//! [`PatchedFn::patch`]; the outermost activates first and deactivates last.
//!
//! ## Mapping Substitutions
//!
//! [`MappingPatch`] overwrites several entries of a namespace (optionally
//! clearing it first) and restores the full previous contents afterwards.
//! Global mapping substitutions on the same namespace know about each other,
//! so restoring one does not erase a sibling that is still active.
//!
//! ## Logging
//!
//! Activation, resolution and restore failures are reported through
//! `tracing`. Restore failures that happen while another error is being
//! returned are logged at `WARN` and suppressed.
//!
//! ## Features
//!
//! - `async` (default): [`async_timeout`], driven by tokio's timer
//! - `test-helpers` (default): the [`mocks`] module with a manual step driver
//!   and a log capture layer

// Domain layer - pure types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    call::{Completion, Invocation},
    error::{AssertionError, ConfigurationError, Failure, PatchError, StateError},
    kind::DoubleKind,
    outcome::{DeferredOutcome, Outcome, Resolution},
    scope::Scope,
};

pub use application::{
    activator::{ActivatorState, Patched, PatchedFn, WithPatches},
    double::{AnyMock, BuildError, MockBuilder},
    group::PatchGroup,
    ledger::{CallLedger, Wait},
    mock::{AsyncMock, Mock, MockCall},
    ports::{Patch, Resolver, SpecClassifier},
};

pub use infrastructure::{
    config::{Settings, SettingsError, DEFAULT_TIMEOUT, TIMEOUT_ENV},
    mapping::MappingPatch,
    namespace::{Namespace, Snapshot},
    patch::{patch, patch_multiple, patch_object, Replacement, Substitution},
    resolver::ModuleRegistry,
    spec::AttributeSpec,
};

#[cfg(feature = "async")]
pub use infrastructure::config::{async_timeout, TimeoutError};

#[cfg(any(test, feature = "test-helpers"))]
pub use infrastructure::mocks;
