//! Retriable-rollback verification.

use crate::driver::{restart_loop, Phase};
use crate::error::HarnessError;
use crate::listener::AbortOnReload;
use crate::traits::{ProcId, ProcedureExecutor};
use crate::verify::expect_aborted;

/// Variant of the rollback verifier for procedures whose rollback steps
/// can fail with a transient error before succeeding.
///
/// Drives forward to `last_step`, disarms crash injection, injects the
/// abort on one clean restart, and lets the executor's own retry cycle
/// exhaust the transient failures. The terminal classification must still
/// be the abort outcome: a retriable rollback failure that surfaces as an
/// operational failure is a misclassification.
pub async fn rollback_retriable_failure<E: ProcedureExecutor>(
    exec: &E,
    proc_id: ProcId,
    last_step: usize,
    states: &[String],
) -> Result<(), HarnessError> {
    exec.wait_procedure(proc_id).await;

    restart_loop(exec, proc_id, 0..last_step, states, Phase::Forward).await?;

    // Execute the rollback with crash injection off; retries happen inside
    // the single resumed run.
    exec.set_crash_before_persist(false).await;
    let listener_id = exec
        .register_listener(Box::new(AbortOnReload::new(proc_id)))
        .await;
    let driven = restart_loop(
        exec,
        proc_id,
        std::iter::once(last_step),
        states,
        Phase::Rollback,
    )
    .await;
    let removed = exec.unregister_listener(listener_id).await;

    driven?;
    if !removed {
        return Err(HarnessError::ListenerBookkeeping { listener_id });
    }
    expect_aborted(exec, proc_id).await
}
