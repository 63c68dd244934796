use crate::traits::{ListenerId, OracleViolation, ProcId};

/// All errors the harness can surface. Every variant is fatal to the
/// current scenario; the harness performs no local recovery or retry of its
/// own — retries are a property of the executor under test.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The procedure completed successfully before the restart budget was
    /// exhausted. The driven cadence is off, which is a harness bug, not a
    /// tolerable looseness.
    #[error(
        "{proc_id} completed successfully before restart {iteration} of {budget} (state {state})"
    )]
    CompletedEarly {
        proc_id: ProcId,
        iteration: usize,
        budget: usize,
        state: String,
    },

    /// No result was recorded after the final resume; the executor never
    /// reached a terminal state for this procedure.
    #[error("{proc_id} has no recorded result after the final resume")]
    StillTransient { proc_id: ProcId },

    /// The executor was expected to be live and steady after the final
    /// clean run, but reports not running.
    #[error("executor is not running after the final resume")]
    ExecutorStopped,

    /// The executor was expected to have stopped at an armed crash
    /// boundary, but reports still running.
    #[error("executor is still running; the armed crash boundary never fired")]
    CrashNotObserved,

    /// The procedure recorded an operational failure where none was
    /// expected.
    #[error("{proc_id} failed unexpectedly: {cause}")]
    UnexpectedFailure { proc_id: ProcId, cause: String },

    /// The procedure resolved to the abort outcome where forward completion
    /// was expected (e.g. past the point of no return).
    #[error("{proc_id} was aborted where forward completion was expected")]
    UnexpectedAbort { proc_id: ProcId },

    /// The procedure did not resolve to the abort outcome where rollback
    /// was expected. `observed` carries the actual classification.
    #[error("{proc_id} did not resolve to the abort outcome (observed: {observed})")]
    NotAborted { proc_id: ProcId, observed: String },

    /// Unregistering a listener that was not found registered. Indicates
    /// the harness's own bookkeeping is wrong.
    #[error("listener {listener_id:?} was not registered at unregistration time")]
    ListenerBookkeeping { listener_id: ListenerId },

    /// Domain state diverged from what the scenario expects.
    #[error("domain oracle violation: {0}")]
    Oracle(#[from] OracleViolation),
}
