//! Rollback-on-abort verification.

use crate::driver::{restart_loop, Phase};
use crate::error::HarnessError;
use crate::listener::AbortOnReload;
use crate::traits::{ProcId, ProcedureExecutor};
use crate::verify::expect_aborted;

/// Drive a procedure forward to `last_step`, inject an abort on every
/// reload, and crash/resume across every rollback boundary back down to
/// the initial step.
///
/// `last_step` must be strictly below the procedure's point of no return,
/// or the abort will be refused and this verifier reports `NotAborted`.
///
/// The rollback phase runs `last_step + 2` restarts — the boundary set is
/// traversed in reverse, plus the abort-triggering reload itself. The
/// listener is unregistered on every exit path; unregistration failure is
/// a fatal bookkeeping error even when the drive itself passed.
pub async fn rollback_and_double_execution<E: ProcedureExecutor>(
    exec: &E,
    proc_id: ProcId,
    last_step: usize,
    states: &[String],
) -> Result<(), HarnessError> {
    exec.wait_procedure(proc_id).await;

    // Forward: land exactly at step `last_step`'s persisted boundary.
    restart_loop(exec, proc_id, 0..last_step, states, Phase::Forward).await?;

    // Rollback: crash/resume at every compensation boundary, in reverse.
    let listener_id = exec
        .register_listener(Box::new(AbortOnReload::new(proc_id)))
        .await;
    let driven = restart_loop(
        exec,
        proc_id,
        (0..=last_step + 1).rev(),
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
