use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Handle for one in-flight procedure, assigned monotonically by the
/// executor at submission. Immutable once issued; the harness only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcId(pub u64);

impl std::fmt::Display for ProcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

/// Handle returned by `register_listener`, required for unregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Terminal classification of a procedure, as recorded by the executor.
///
/// `failed` and `aborted` are mutually exclusive: `failed` means the
/// procedure's own step logic hit an operational error and unwound;
/// `aborted` means rollback was requested and completed. A clean forward
/// completion sets neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureResult {
    pub failed: bool,
    pub aborted: bool,
    /// Cause message for a failed or aborted outcome.
    pub error: Option<String>,
}

impl ProcedureResult {
    /// True for a clean forward completion (no failure, no abort).
    pub fn is_success(&self) -> bool {
        !self.failed && !self.aborted
    }

    /// Short classification string for diagnostics.
    pub fn classification(&self) -> &'static str {
        match (self.failed, self.aborted) {
            (false, false) => "success",
            (true, false) => "failed",
            (false, true) => "aborted",
            (true, true) => "failed+aborted",
        }
    }
}

/// Lifecycle events delivered to registered listeners, in
/// {submitted, reloaded (once per restart), finished (at most once)} order
/// for a given handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Submitted(ProcId),
    ReloadedFromStore(ProcId),
    Finished(ProcId),
}

/// Reaction a listener may request in response to an event.
///
/// The executor must apply the action before resuming execution past the
/// step named by the event, so an abort requested on reload is visible to
/// the procedure before it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAction {
    /// Request an abort of the procedure named by the event. Advisory and
    /// idempotent: the procedure's own policy decides whether to honor it,
    /// and repeated requests must not change the final classification.
    Abort,
}

/// A passive observer of executor lifecycle events.
///
/// Dispatch is synchronous and may happen on an executor-internal thread;
/// implementations must not assume they run on the harness's own thread.
pub trait LifecycleListener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent) -> Option<ListenerAction>;
}

/// The executor under test.
///
/// All waits block the caller until the executor reaches a quiescent point:
/// either fully idle, or stopped at a simulated crash boundary. The harness
/// never observes a partially-updated state as final.
#[async_trait]
pub trait ProcedureExecutor: Send + Sync {
    /// Descriptor for the operation a submitted procedure performs. Opaque
    /// to the harness; scenarios construct it.
    type Operation: Send + 'static;

    /// Submit a procedure and return its handle.
    async fn submit(&self, op: Self::Operation) -> ProcId;

    /// Block until the procedure is terminal or the executor has stopped at
    /// a simulated crash boundary.
    async fn wait_procedure(&self, proc_id: ProcId);

    /// Block until no procedure is actively executing.
    async fn wait_no_procedure_running(&self);

    /// Global executor liveness. False while stopped at a simulated crash.
    fn is_running(&self) -> bool;

    /// Tear down the executor's in-memory state, reload every unfinished
    /// procedure from the persistent store (dispatching `ReloadedFromStore`
    /// to listeners), and resume execution. Returns only after the reload
    /// and listener dispatch are complete, so the next liveness or
    /// completion check observes post-restart state.
    async fn restart(&self);

    /// The recorded result for a procedure, or `None` while it is still in
    /// flight.
    async fn result(&self, proc_id: ProcId) -> Option<ProcedureResult>;

    /// Register a lifecycle listener. The returned id is required for
    /// unregistration.
    async fn register_listener(&self, listener: Box<dyn LifecycleListener>) -> ListenerId;

    /// Unregister a listener. Returns false if the id was not registered,
    /// which the harness treats as a fatal bookkeeping error.
    async fn unregister_listener(&self, listener_id: ListenerId) -> bool;

    /// Arm or disarm crash injection. While armed, store-update boundaries
    /// alternate between a simulated crash (progress for the step just
    /// executed is lost) and a normal persist, starting with a crash. The
    /// flag must be reset to inactive at scenario end.
    async fn set_crash_before_persist(&self, enabled: bool);

    /// Request an abort. Advisory: the owning procedure's policy decides
    /// whether to honor it. Idempotent against finished or already-aborting
    /// procedures.
    async fn request_abort(&self, proc_id: ProcId);
}

/// A domain-state divergence reported by an oracle.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct OracleViolation {
    pub message: String,
}

impl OracleViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Domain validation oracle, checked after a procedure terminates.
///
/// "Present" means present in both persisted metadata and the backing
/// storage layout; a resource that exists in only one of the two is a
/// violation in either direction.
#[async_trait]
pub trait DomainOracle: Send + Sync {
    /// The resource exists with exactly the given sub-resources.
    async fn verify_resource_present(
        &self,
        resource: &str,
        sub_resources: &[&str],
    ) -> Result<(), OracleViolation>;

    /// The resource exists in neither metadata nor layout.
    async fn verify_resource_absent(&self, resource: &str) -> Result<(), OracleViolation>;

    /// The named sub-resource is attached to the resource.
    async fn verify_sub_resource_present(
        &self,
        resource: &str,
        sub_resource: &str,
    ) -> Result<(), OracleViolation>;

    /// The named sub-resource is fully removed, layout included.
    async fn verify_sub_resource_absent(
        &self,
        resource: &str,
        sub_resource: &str,
    ) -> Result<(), OracleViolation>;
}
