//! Engine-agnostic fault-injection suite.
//!
//! Any procedure executor can run the suite to verify its crash-recovery,
//! rollback, and point-of-no-return behavior. Scenarios are described by a
//! [`ScenarioFixture`] that supplies the executor, submits the operation
//! under test, and runs the domain-oracle checks; the suite derives every
//! resume point and every rollback depth from the fixture's step plan, so
//! nothing about the plan shape is hardcoded in the tests.
//!
//! # Usage
//!
//! ```ignore
//! use faultline_harness::suite::run_fault_suite;
//!
//! #[tokio::test]
//! async fn engine_fault_suite() {
//!     let report = run_fault_suite(|| async { MyFixture::new().await }).await;
//!     assert_eq!(report.failed, 0, "{report}");
//! }
//! ```

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::listener::AbortOnReload;
use crate::traits::{OracleViolation, ProcId, ProcedureExecutor};
use crate::verify::{
    recovery_and_double_execution, rollback_after_ponr, rollback_and_double_execution,
    rollback_retriable_failure,
};

/// One scenario environment: a fresh executor, a seeded domain, and the
/// operation under test. The suite's factory builds a new fixture per test
/// so scenarios cannot leak crash flags or listeners into each other.
#[async_trait]
pub trait ScenarioFixture: Send + Sync {
    type Exec: ProcedureExecutor;

    fn executor(&self) -> &Self::Exec;

    /// The target procedure's forward state enumeration, in order.
    fn step_states(&self) -> Vec<String>;

    /// The target procedure's point-of-no-return index, queried from the
    /// procedure type rather than hardcoded in scenarios. `None` means the
    /// whole plan is reversible.
    fn ponr_index(&self) -> Option<usize>;

    /// Submit the operation under test and return its handle.
    async fn submit_target(&self) -> ProcId;

    /// Submit a procedure with an empty step plan, if the engine supports
    /// one. Used for the zero-step pass-through case.
    async fn submit_empty(&self) -> Option<ProcId> {
        None
    }

    /// Whether the fixture can make the target's rollback steps fail
    /// transiently before succeeding.
    fn supports_retriable_rollback(&self) -> bool {
        false
    }

    /// Arm transient failures on the target's rollback steps.
    async fn arm_retriable_rollback(&self) {}

    /// Domain state matches a full, unfaulted forward execution.
    async fn verify_applied(&self) -> Result<(), OracleViolation>;

    /// Domain state is indistinguishable from never having run the
    /// operation.
    async fn verify_unapplied(&self) -> Result<(), OracleViolation>;
}

/// Result of a single suite case.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestCase {
    /// Case category (e.g. "recovery", "rollback", "ponr").
    pub category: String,
    /// Case name (e.g. "rollback_last_step_1").
    pub name: String,
    pub passed: bool,
    /// Error message if the case failed.
    pub message: Option<String>,
}

impl TestCase {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full suite run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FaultSuiteReport {
    pub cases: Vec<TestCase>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl FaultSuiteReport {
    /// JSON rendering of the report, for machine consumption.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl fmt::Display for FaultSuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fault suite: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for case in &self.cases {
            if !case.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    case.category,
                    case.name,
                    case.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full fault-injection suite against an engine.
///
/// The factory is called once per case to build a fresh fixture, ensuring
/// scenario isolation. Rollback is exercised at every `last_step` below the
/// PONR index, and abort refusal at every `last_step` at or beyond it.
pub async fn run_fault_suite<Fx, F, Fut>(factory: F) -> FaultSuiteReport
where
    Fx: ScenarioFixture,
    F: Fn() -> Fut,
    Fut: Future<Output = Fx>,
{
    let mut cases = Vec::new();

    let probe = factory().await;
    let num_steps = probe.step_states().len();
    let ponr = probe.ponr_index().unwrap_or(num_steps);
    let retriable = probe.supports_retriable_rollback();
    drop(probe);

    cases.push(TestCase::from_result(
        "recovery",
        "full_forward",
        full_forward(&factory().await).await,
    ));
    cases.push(TestCase::from_result(
        "recovery",
        "zero_step_passthrough",
        zero_step_passthrough(&factory().await).await,
    ));

    for last_step in 0..ponr {
        cases.push(TestCase::from_result(
            "rollback",
            &format!("last_step_{last_step}"),
            rollback_at(&factory().await, last_step).await,
        ));
    }

    for last_step in ponr..num_steps {
        cases.push(TestCase::from_result(
            "ponr",
            &format!("last_step_{last_step}"),
            ponr_at(&factory().await, last_step).await,
        ));
    }

    if retriable {
        let last_step = if ponr > 1 { 1 } else { 0 };
        cases.push(TestCase::from_result(
            "retriable",
            &format!("last_step_{last_step}"),
            retriable_at(&factory().await, last_step).await,
        ));
    }

    cases.push(TestCase::from_result(
        "listener",
        "unregistration_is_checked",
        unregistration_is_checked(&factory().await).await,
    ));
    cases.push(TestCase::from_result(
        "abort",
        "idempotent_after_finish",
        abort_idempotent_after_finish(&factory().await).await,
    ));

    let passed = cases.iter().filter(|c| c.passed).count();
    let total = cases.len();

    FaultSuiteReport {
        cases,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Cases ────────────────────────────────────────────────────────────────────

async fn full_forward<Fx: ScenarioFixture>(fx: &Fx) -> Result<(), String> {
    let exec = fx.executor();
    let states = fx.step_states();

    exec.wait_no_procedure_running().await;
    exec.set_crash_before_persist(true).await;
    let proc_id = fx.submit_target().await;

    let driven = recovery_and_double_execution(exec, proc_id, states.len(), &states).await;
    exec.set_crash_before_persist(false).await;
    driven.map_err(|e| e.to_string())?;

    fx.verify_applied().await.map_err(|e| e.to_string())
}

async fn zero_step_passthrough<Fx: ScenarioFixture>(fx: &Fx) -> Result<(), String> {
    let exec = fx.executor();

    exec.wait_no_procedure_running().await;
    exec.set_crash_before_persist(true).await;
    let submitted = fx.submit_empty().await;

    let driven = match submitted {
        // No retryable intermediate steps; a legal no-op scenario.
        Some(proc_id) => recovery_and_double_execution(exec, proc_id, 0, &[]).await,
        None => Ok(()),
    };
    exec.set_crash_before_persist(false).await;
    driven.map_err(|e| e.to_string())
}

async fn rollback_at<Fx: ScenarioFixture>(fx: &Fx, last_step: usize) -> Result<(), String> {
    let exec = fx.executor();
    let states = fx.step_states();

    exec.wait_no_procedure_running().await;
    exec.set_crash_before_persist(true).await;
    let proc_id = fx.submit_target().await;

    let driven = rollback_and_double_execution(exec, proc_id, last_step, &states).await;
    exec.set_crash_before_persist(false).await;
    driven.map_err(|e| e.to_string())?;

    fx.verify_unapplied().await.map_err(|e| e.to_string())
}

async fn ponr_at<Fx: ScenarioFixture>(fx: &Fx, last_step: usize) -> Result<(), String> {
    let exec = fx.executor();
    let states = fx.step_states();

    exec.wait_no_procedure_running().await;
    exec.set_crash_before_persist(true).await;
    let proc_id = fx.submit_target().await;

    let driven = rollback_after_ponr(exec, proc_id, last_step, &states).await;
    exec.set_crash_before_persist(false).await;
    driven.map_err(|e| e.to_string())?;

    fx.verify_applied().await.map_err(|e| e.to_string())
}

async fn retriable_at<Fx: ScenarioFixture>(fx: &Fx, last_step: usize) -> Result<(), String> {
    let exec = fx.executor();
    let states = fx.step_states();

    fx.arm_retriable_rollback().await;
    exec.wait_no_procedure_running().await;
    exec.set_crash_before_persist(true).await;
    let proc_id = fx.submit_target().await;

    let driven = rollback_retriable_failure(exec, proc_id, last_step, &states).await;
    exec.set_crash_before_persist(false).await;
    driven.map_err(|e| e.to_string())?;

    fx.verify_unapplied().await.map_err(|e| e.to_string())
}

async fn unregistration_is_checked<Fx: ScenarioFixture>(fx: &Fx) -> Result<(), String> {
    let exec = fx.executor();

    let listener_id = exec
        .register_listener(Box::new(AbortOnReload::new(ProcId(0))))
        .await;
    if !exec.unregister_listener(listener_id).await {
        return Err("unregistering a registered listener should succeed".to_string());
    }
    if exec.unregister_listener(listener_id).await {
        return Err("unregistering an unknown listener should report failure".to_string());
    }
    Ok(())
}

async fn abort_idempotent_after_finish<Fx: ScenarioFixture>(fx: &Fx) -> Result<(), String> {
    let exec = fx.executor();

    // Clean run: crash injection never armed.
    exec.wait_no_procedure_running().await;
    let proc_id = fx.submit_target().await;
    exec.wait_procedure(proc_id).await;

    exec.request_abort(proc_id).await;
    exec.request_abort(proc_id).await;

    match exec.result(proc_id).await {
        Some(result) if result.is_success() => {
            fx.verify_applied().await.map_err(|e| e.to_string())
        }
        Some(result) => Err(format!(
            "late abort requests changed the classification to '{}'",
            result.classification()
        )),
        None => Err("procedure has no result after a clean run".to_string()),
    }
}
