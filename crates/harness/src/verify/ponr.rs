//! Point-of-no-return verification.

use crate::driver::{restart_loop, Phase};
use crate::error::HarnessError;
use crate::listener::AbortOnReload;
use crate::traits::{ProcId, ProcedureExecutor};
use crate::verify::expect_success;

/// Drive a procedure forward past its point of no return, inject an abort
/// on reload, and assert the abort is refused: the procedure must complete
/// forward, non-failed and non-aborted.
///
/// `last_step` must be at or beyond the PONR index. Crash injection is
/// disarmed before the final restart so the irreversible step commits and
/// persists uninterrupted; the single restart after that delivers the
/// abort, which the procedure's own policy must bounce. Same plumbing as
/// the rollback verifier, opposite expected outcome, selected purely by
/// which side of the boundary the reload lands on.
pub async fn rollback_after_ponr<E: ProcedureExecutor>(
    exec: &E,
    proc_id: ProcId,
    last_step: usize,
    states: &[String],
) -> Result<(), HarnessError> {
    exec.wait_procedure(proc_id).await;

    restart_loop(exec, proc_id, 0..last_step, states, Phase::Forward).await?;

    // Let the irreversible step commit, then try to inject the abort.
    exec.set_crash_before_persist(false).await;
    let listener_id = exec
        .register_listener(Box::new(AbortOnReload::new(proc_id)))
        .await;
    let driven = restart_loop(
        exec,
        proc_id,
        std::iter::once(last_step),
        states,
        Phase::Forward,
    )
    .await;
    let removed = exec.unregister_listener(listener_id).await;

    driven?;
    if !removed {
        return Err(HarnessError::ListenerBookkeeping { listener_id });
    }
    if !exec.is_running() {
        return Err(HarnessError::ExecutorStopped);
    }
    expect_success(exec, proc_id).await
}
