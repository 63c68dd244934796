//! The restart driver.
//!
//! Repeats, once per requested iteration: check the procedure has not
//! completed successfully, force a restart of the executor (which reloads
//! persisted state and resumes), and block until the executor reaches a
//! quiescent point. The driver never advances the step index itself; crash
//! timing alone decides how far the executor gets between restarts, so
//! iteration `i` resumes exactly from the resume point left by iteration
//! `i-1`.

use crate::error::HarnessError;
use crate::traits::{ProcId, ProcedureExecutor};

/// Which half of a procedure's life a restart loop is exercising. Carried
/// for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Forward,
    Rollback,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Forward => write!(f, "forward"),
            Phase::Rollback => write!(f, "rollback"),
        }
    }
}

/// Check that the procedure has not completed successfully.
///
/// A recorded operational failure or abort is tolerated here: restarts of a
/// terminal procedure are no-ops and the loop must run to its full budget
/// so call sites can assert on the final recorded state. Early *successful*
/// completion means the driven cadence is wrong and is always fatal.
pub async fn assert_not_yet_completed<E: ProcedureExecutor>(
    exec: &E,
    proc_id: ProcId,
    iteration: usize,
    budget: usize,
    state: &str,
) -> Result<(), HarnessError> {
    match exec.result(proc_id).await {
        None => Ok(()),
        Some(result) if result.is_success() => Err(HarnessError::CompletedEarly {
            proc_id,
            iteration,
            budget,
            state: state.to_string(),
        }),
        Some(result) => {
            tracing::debug!(
                proc = %proc_id,
                classification = result.classification(),
                "procedure already terminal, continuing restart loop"
            );
            Ok(())
        }
    }
}

/// Run one forced crash/restart cycle per index in `labels`.
///
/// The indices are used to name the step state being exercised in logs;
/// forward phases pass `0..n`, rollback phases pass the same boundary set
/// in reverse. Every iteration runs: the loop never skips or short-circuits
/// on a terminal failure, and surfaces early successful completion as a
/// harness assertion failure.
pub async fn restart_loop<E, I>(
    exec: &E,
    proc_id: ProcId,
    labels: I,
    states: &[String],
    phase: Phase,
) -> Result<(), HarnessError>
where
    E: ProcedureExecutor,
    I: IntoIterator<Item = usize>,
{
    let labels: Vec<usize> = labels.into_iter().collect();
    let budget = labels.len();

    for (iteration, idx) in labels.into_iter().enumerate() {
        let state = states.get(idx).map(String::as_str).unwrap_or("?");
        tracing::info!(proc = %proc_id, restart = iteration, %phase, state, "restart");

        assert_not_yet_completed(exec, proc_id, iteration, budget, state).await?;
        exec.restart().await;
        exec.wait_procedure(proc_id).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{
        LifecycleListener, ListenerId, ProcedureExecutor, ProcedureResult,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Executor stub that records restart counts and serves a scripted
    /// result once a configured number of restarts has happened.
    struct ScriptedExec {
        restarts: AtomicUsize,
        terminal_after: usize,
        terminal: Mutex<Option<ProcedureResult>>,
    }

    impl ScriptedExec {
        fn new(terminal_after: usize, terminal: ProcedureResult) -> Self {
            Self {
                restarts: AtomicUsize::new(0),
                terminal_after,
                terminal: Mutex::new(Some(terminal)),
            }
        }
    }

    #[async_trait]
    impl ProcedureExecutor for ScriptedExec {
        type Operation = ();

        async fn submit(&self, _op: ()) -> ProcId {
            ProcId(1)
        }

        async fn wait_procedure(&self, _proc_id: ProcId) {}

        async fn wait_no_procedure_running(&self) {}

        fn is_running(&self) -> bool {
            true
        }

        async fn restart(&self) {
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }

        async fn result(&self, _proc_id: ProcId) -> Option<ProcedureResult> {
            if self.restarts.load(Ordering::SeqCst) >= self.terminal_after {
                self.terminal.lock().unwrap().clone()
            } else {
                None
            }
        }

        async fn register_listener(&self, _listener: Box<dyn LifecycleListener>) -> ListenerId {
            ListenerId(0)
        }

        async fn unregister_listener(&self, _listener_id: ListenerId) -> bool {
            true
        }

        async fn set_crash_before_persist(&self, _enabled: bool) {}

        async fn request_abort(&self, _proc_id: ProcId) {}
    }

    fn states(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("state_{i}")).collect()
    }

    #[tokio::test]
    async fn runs_every_iteration() {
        let exec = ScriptedExec::new(
            usize::MAX,
            ProcedureResult {
                failed: false,
                aborted: false,
                error: None,
            },
        );

        restart_loop(&exec, ProcId(1), 0..4, &states(4), Phase::Forward)
            .await
            .expect("loop should complete");
        assert_eq!(exec.restarts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn early_success_is_fatal() {
        let exec = ScriptedExec::new(
            2,
            ProcedureResult {
                failed: false,
                aborted: false,
                error: None,
            },
        );

        let err = restart_loop(&exec, ProcId(1), 0..4, &states(4), Phase::Forward)
            .await
            .expect_err("early completion must surface");
        assert!(matches!(err, HarnessError::CompletedEarly { iteration: 2, .. }));
    }

    #[tokio::test]
    async fn terminal_abort_does_not_short_circuit() {
        let exec = ScriptedExec::new(
            1,
            ProcedureResult {
                failed: false,
                aborted: true,
                error: Some("aborted".into()),
            },
        );

        restart_loop(&exec, ProcId(1), (0..=3).rev(), &states(4), Phase::Rollback)
            .await
            .expect("aborted result must not stop the loop");
        assert_eq!(exec.restarts.load(Ordering::SeqCst), 4);
    }
}
