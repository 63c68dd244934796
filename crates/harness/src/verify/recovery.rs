//! Forward crash/recovery verification.

use crate::driver::{restart_loop, Phase};
use crate::error::HarnessError;
use crate::traits::{ProcId, ProcedureExecutor};
use crate::verify::expect_success;

/// Drive a procedure through every forward resume point.
///
/// The procedure must have been submitted with crash injection armed, so
/// every step is executed twice: once killed before its persist, once
/// replayed to completion after the next restart. The loop runs one
/// restart per step; the final restart lets the procedure complete clean.
///
/// `num_steps == 0` is a legal pass-through: the procedure completes on
/// the initial wait (an empty plan has no store-update boundary to crash
/// on) and only the terminal classification is checked.
pub async fn recovery_and_double_execution<E: ProcedureExecutor>(
    exec: &E,
    proc_id: ProcId,
    num_steps: usize,
    states: &[String],
) -> Result<(), HarnessError> {
    exec.wait_procedure(proc_id).await;
    if num_steps > 0 && exec.is_running() {
        return Err(HarnessError::CrashNotObserved);
    }

    // Restart the executor and execute the step twice:
    //   execute step N - crash before the store update
    //   restart executor/store
    //   execute step N - persist
    restart_loop(exec, proc_id, 0..num_steps, states, Phase::Forward).await?;

    if !exec.is_running() {
        return Err(HarnessError::ExecutorStopped);
    }
    expect_success(exec, proc_id).await
}
