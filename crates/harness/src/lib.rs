//! Faultline — a fault-injection harness for persistent procedure
//! executors.
//!
//! The executor under test models long-running administrative operations
//! as ordered step sequences, persists progress after each step, resumes
//! from the last persisted step after a crash, and unwinds via
//! compensating steps when rollback is requested. The harness provides:
//!
//! - a [`ProcedureExecutor`] trait describing the executor interface, plus
//!   a [`DomainOracle`] trait for post-completion domain checks
//! - an [`AbortOnReload`] lifecycle listener that forces the rollback path
//!   by aborting a procedure the moment it is reloaded from the store
//! - a restart [`driver`] that forces a crash/restart cycle at every
//!   store-update boundary
//! - [`verify`] routines for forward recovery, rollback, point-of-no-return
//!   refusal, and retriable rollback failures
//! - an engine-agnostic [`suite`] that runs all of the above against any
//!   conforming executor and reports per-case results
//!
//! The harness is single-threaded and synchronous per scenario: one handle
//! is driven to completion before its assertions run, and every wait blocks
//! until the executor is quiescent. It performs no retries of its own —
//! retry behavior is a property being tested in the executor.

pub mod driver;
pub mod error;
pub mod listener;
pub mod suite;
pub mod traits;
pub mod verify;

pub use driver::{assert_not_yet_completed, restart_loop, Phase};
pub use error::HarnessError;
pub use listener::AbortOnReload;
pub use suite::{run_fault_suite, FaultSuiteReport, ScenarioFixture, TestCase};
pub use traits::{
    DomainOracle, LifecycleEvent, LifecycleListener, ListenerAction, ListenerId, OracleViolation,
    ProcId, ProcedureExecutor, ProcedureResult,
};
pub use verify::{
    recovery_and_double_execution, rollback_after_ponr, rollback_and_double_execution,
    rollback_retriable_failure,
};
