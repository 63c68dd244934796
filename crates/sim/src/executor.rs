//! The in-memory reference procedure engine.
//!
//! Execution model: `submit` and `restart` spawn a run task that drives
//! every unfinished procedure to a quiescent point — terminal, or stopped
//! at a simulated crash boundary — in one critical section, so waiters
//! never observe a partially-updated state. While crash injection is
//! armed, store-update boundaries alternate crash/persist starting with a
//! crash: each restart replays the step whose persist was suppressed and
//! then advances exactly one persisted step.
//!
//! Restart discards all volatile state (pending abort requests included)
//! and resumes from the store alone; `ReloadedFromStore` is dispatched to
//! listeners synchronously inside `restart`, before the resumed run can
//! advance past the reloaded step.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use faultline_harness::{
    LifecycleEvent, LifecycleListener, ListenerAction, ListenerId, ProcId, ProcedureExecutor,
    ProcedureResult,
};

use crate::domain::{SimDomain, SimOracle};
use crate::plan::SimOperation;
use crate::store::{Cursor, SimStore};

struct Runtime {
    /// Executor liveness; false while stopped at a simulated crash.
    running: bool,
    /// Invalidates run tasks spawned before the latest restart.
    epoch: u64,
    crash_enabled: bool,
    /// Alternation state: the next boundary crashes when armed.
    kill_armed: bool,
    /// Volatile; cleared on restart, which is why abort injection must
    /// happen on every reload.
    abort_requested: BTreeSet<u64>,
    /// Remaining transient compensation failures per procedure.
    comp_retries: HashMap<u64, u32>,
    listeners: Vec<(ListenerId, Box<dyn LifecycleListener>)>,
    next_listener_id: u64,
    next_proc_id: u64,
}

struct SimState {
    store: SimStore,
    domain: SimDomain,
    runtime: Runtime,
}

pub(crate) struct SimInner {
    state: Mutex<SimState>,
    tx: watch::Sender<u64>,
    rx: watch::Receiver<u64>,
}

impl SimInner {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state lock poisoned")
    }

    fn bump(&self) {
        self.tx.send_modify(|v| *v += 1);
    }

    pub(crate) fn with_domain<R>(&self, f: impl FnOnce(&SimDomain) -> R) -> R {
        f(&self.lock().domain)
    }
}

/// The executor under test in its reference form.
pub struct SimExecutor {
    inner: Arc<SimInner>,
}

impl Default for SimExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimExecutor {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(0u64);
        Self {
            inner: Arc::new(SimInner {
                state: Mutex::new(SimState {
                    store: SimStore::default(),
                    domain: SimDomain::default(),
                    runtime: Runtime {
                        running: true,
                        epoch: 0,
                        crash_enabled: false,
                        kill_armed: false,
                        abort_requested: BTreeSet::new(),
                        comp_retries: HashMap::new(),
                        listeners: Vec::new(),
                        next_listener_id: 0,
                        next_proc_id: 0,
                    },
                }),
                tx,
                rx,
            }),
        }
    }

    /// Oracle sharing this executor's domain.
    pub fn oracle(&self) -> SimOracle {
        SimOracle::new(self.inner.clone())
    }

    /// Seed a resource in catalog and layout. Setup helper, not a
    /// procedure.
    pub fn create_resource(&self, resource: &str, sub_resources: &[&str]) {
        self.inner
            .lock()
            .domain
            .create_resource(resource, sub_resources);
    }

    /// Seed rows under every sub-resource directory of a resource.
    pub fn load_rows(&self, resource: &str, rows: u64) {
        self.inner.lock().domain.set_rows(resource, rows);
    }

    /// Row count under one sub-resource directory, for assertions.
    pub fn row_count(&self, resource: &str, sub_resource: &str) -> Option<u64> {
        self.inner
            .with_domain(|domain| domain.row_count(resource, sub_resource))
    }

    fn spawn_run(&self, epoch: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_to_quiescence(&inner, epoch);
        });
    }
}

#[async_trait]
impl ProcedureExecutor for SimExecutor {
    type Operation = SimOperation;

    async fn submit(&self, op: SimOperation) -> ProcId {
        let (id, epoch) = {
            let mut st = self.inner.lock();
            let id = st.runtime.next_proc_id;
            st.runtime.next_proc_id += 1;
            st.runtime.comp_retries.insert(id, op.rollback_hiccups());
            st.store.insert(id, op);
            dispatch(&mut st, LifecycleEvent::Submitted(ProcId(id)));
            (id, st.runtime.epoch)
        };
        self.inner.bump();
        self.spawn_run(epoch);
        ProcId(id)
    }

    async fn wait_procedure(&self, proc_id: ProcId) {
        let mut rx = self.inner.rx.clone();
        loop {
            {
                let st = self.inner.lock();
                let terminal = st
                    .store
                    .slots
                    .get(&proc_id.0)
                    .is_none_or(|slot| slot.result.is_some());
                if terminal || !st.runtime.running {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn wait_no_procedure_running(&self) {
        let mut rx = self.inner.rx.clone();
        loop {
            {
                let st = self.inner.lock();
                if st.store.all_finished() || !st.runtime.running {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn is_running(&self) -> bool {
        self.inner.lock().runtime.running
    }

    async fn restart(&self) {
        let epoch = {
            let mut st = self.inner.lock();
            st.runtime.epoch += 1;
            st.runtime.running = true;
            st.runtime.kill_armed = st.runtime.crash_enabled && st.runtime.kill_armed;
            st.runtime.abort_requested.clear();
            let unfinished = st.store.unfinished_ids();
            st.runtime.comp_retries = unfinished
                .iter()
                .map(|id| (*id, st.store.slots[id].op.rollback_hiccups()))
                .collect();
            for id in unfinished {
                dispatch(&mut st, LifecycleEvent::ReloadedFromStore(ProcId(id)));
            }
            st.runtime.epoch
        };
        self.inner.bump();
        self.spawn_run(epoch);
    }

    async fn result(&self, proc_id: ProcId) -> Option<ProcedureResult> {
        self.inner
            .lock()
            .store
            .slots
            .get(&proc_id.0)
            .and_then(|slot| slot.result.clone())
    }

    async fn register_listener(&self, listener: Box<dyn LifecycleListener>) -> ListenerId {
        let mut st = self.inner.lock();
        let id = ListenerId(st.runtime.next_listener_id);
        st.runtime.next_listener_id += 1;
        st.runtime.listeners.push((id, listener));
        id
    }

    async fn unregister_listener(&self, listener_id: ListenerId) -> bool {
        let mut st = self.inner.lock();
        let before = st.runtime.listeners.len();
        st.runtime.listeners.retain(|(id, _)| *id != listener_id);
        st.runtime.listeners.len() != before
    }

    async fn set_crash_before_persist(&self, enabled: bool) {
        let mut st = self.inner.lock();
        st.runtime.crash_enabled = enabled;
        st.runtime.kill_armed = enabled;
    }

    async fn request_abort(&self, proc_id: ProcId) {
        {
            let mut st = self.inner.lock();
            apply_abort(&mut st, proc_id);
        }
        self.inner.bump();
    }
}

// ── Engine internals ─────────────────────────────────────────────────────────

enum BoundaryOutcome {
    Persisted,
    Crashed,
}

/// One store update. While crash injection is armed, boundaries alternate
/// crash/persist; a crash stops the whole executor.
fn store_update_boundary(rt: &mut Runtime) -> BoundaryOutcome {
    if rt.crash_enabled {
        if rt.kill_armed {
            rt.kill_armed = false;
            rt.running = false;
            return BoundaryOutcome::Crashed;
        }
        rt.kill_armed = true;
    }
    BoundaryOutcome::Persisted
}

fn event_target(event: &LifecycleEvent) -> ProcId {
    match *event {
        LifecycleEvent::Submitted(id)
        | LifecycleEvent::ReloadedFromStore(id)
        | LifecycleEvent::Finished(id) => id,
    }
}

fn dispatch(st: &mut SimState, event: LifecycleEvent) {
    let mut aborts = Vec::new();
    for (_, listener) in &st.runtime.listeners {
        if let Some(ListenerAction::Abort) = listener.on_event(&event) {
            aborts.push(event_target(&event));
        }
    }
    for proc_id in aborts {
        apply_abort(st, proc_id);
    }
}

/// Advisory and idempotent: no-op for finished or unknown procedures, and
/// repeat requests change nothing.
fn apply_abort(st: &mut SimState, proc_id: ProcId) {
    let live = st
        .store
        .slots
        .get(&proc_id.0)
        .is_some_and(|slot| slot.result.is_none());
    if live {
        st.runtime.abort_requested.insert(proc_id.0);
    }
}

fn run_to_quiescence(inner: &Arc<SimInner>, epoch: u64) {
    {
        let mut st = inner.lock();
        // Superseded by a restart, or spawned against a crashed executor.
        if st.runtime.epoch != epoch || !st.runtime.running {
            return;
        }
        for id in st.store.unfinished_ids() {
            if !run_one(&mut st, id) {
                break;
            }
        }
    }
    inner.bump();
}

/// Drive one procedure until it is terminal or the executor crashes.
/// Returns false when a simulated crash stopped the executor.
fn run_one(st: &mut SimState, id: u64) -> bool {
    loop {
        let Some(slot) = st.store.slots.get_mut(&id) else {
            return true;
        };
        if slot.result.is_some() {
            return true;
        }

        // A pending abort flips a forward cursor into rollback, unless the
        // persisted position is at or past the point of no return.
        if st.runtime.abort_requested.contains(&id) {
            if let Cursor::Forward { next } = slot.cursor {
                if slot.op.ponr_index().is_none_or(|ponr| next < ponr) {
                    tracing::debug!(proc = id, step = next, "abort honored, starting rollback");
                    slot.cursor = Cursor::Rollback {
                        pos: next,
                        cause: None,
                    };
                } else {
                    tracing::debug!(
                        proc = id,
                        step = next,
                        "abort refused past the point of no return"
                    );
                }
            }
        }

        match slot.cursor.clone() {
            Cursor::Forward { next } => {
                let num_steps = slot.op.states().len();
                if next >= num_steps {
                    // Empty plan: no boundary to cross, complete in place.
                    slot.result = Some(ProcedureResult {
                        failed: false,
                        aborted: false,
                        error: None,
                    });
                } else {
                    match slot.op.execute_step(next, &mut st.domain) {
                        Ok(()) => match store_update_boundary(&mut st.runtime) {
                            BoundaryOutcome::Crashed => {
                                tracing::debug!(
                                    proc = id,
                                    step = next,
                                    "simulated crash before persist"
                                );
                                return false;
                            }
                            BoundaryOutcome::Persisted => {
                                if next + 1 == num_steps {
                                    // Completion shares the final step's update.
                                    slot.result = Some(ProcedureResult {
                                        failed: false,
                                        aborted: false,
                                        error: None,
                                    });
                                } else {
                                    slot.cursor = Cursor::Forward { next: next + 1 };
                                }
                            }
                        },
                        Err(cause) => {
                            tracing::debug!(
                                proc = id,
                                step = next,
                                %cause,
                                "step failed, starting rollback"
                            );
                            slot.cursor = Cursor::Rollback {
                                pos: next,
                                cause: Some(cause),
                            };
                        }
                    }
                }
            }
            Cursor::Rollback { pos, cause } => {
                // Transient compensation failures retry in place and never
                // touch the terminal classification.
                if let Some(left) = st.runtime.comp_retries.get_mut(&id) {
                    if *left > 0 {
                        *left -= 1;
                        tracing::debug!(
                            proc = id,
                            step = pos,
                            remaining = *left,
                            "transient rollback failure, retrying"
                        );
                        continue;
                    }
                }

                slot.op.compensate_step(pos, &mut st.domain);
                match store_update_boundary(&mut st.runtime) {
                    BoundaryOutcome::Crashed => {
                        tracing::debug!(
                            proc = id,
                            step = pos,
                            "simulated crash before rollback persist"
                        );
                        return false;
                    }
                    BoundaryOutcome::Persisted => {
                        if pos == 0 {
                            slot.result = Some(match cause {
                                Some(cause) => ProcedureResult {
                                    failed: true,
                                    aborted: false,
                                    error: Some(cause),
                                },
                                None => ProcedureResult {
                                    failed: false,
                                    aborted: true,
                                    error: Some("procedure aborted by request".to_string()),
                                },
                            });
                        } else {
                            slot.cursor = Cursor::Rollback {
                                pos: pos - 1,
                                cause,
                            };
                        }
                    }
                }
            }
        }

        let finished = st
            .store
            .slots
            .get(&id)
            .is_some_and(|slot| slot.result.is_some());
        if finished {
            dispatch(st, LifecycleEvent::Finished(ProcId(id)));
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_op(hiccups: u32) -> SimOperation {
        SimOperation::DropSubResource {
            resource: "t".into(),
            sub_resource: "cf".into(),
            rollback_hiccups: hiccups,
        }
    }

    fn seeded() -> SimExecutor {
        let exec = SimExecutor::new();
        exec.create_resource("t", &["f1", "cf"]);
        exec
    }

    #[tokio::test]
    async fn clean_run_completes_forward() {
        let exec = seeded();
        let id = exec.submit(drop_op(0)).await;
        exec.wait_procedure(id).await;

        let result = exec.result(id).await.expect("result");
        assert!(result.is_success());
        assert!(exec.is_running());
    }

    #[tokio::test]
    async fn armed_crash_stops_executor_before_first_persist() {
        let exec = seeded();
        exec.set_crash_before_persist(true).await;
        let id = exec.submit(drop_op(0)).await;
        exec.wait_procedure(id).await;

        assert!(!exec.is_running());
        assert!(exec.result(id).await.is_none());
    }

    #[tokio::test]
    async fn each_restart_advances_one_persisted_step() {
        let exec = seeded();
        exec.set_crash_before_persist(true).await;
        let id = exec.submit(drop_op(0)).await;
        exec.wait_procedure(id).await;

        // One restart per step; the final one carries completion.
        for _ in 0..6 {
            assert!(exec.result(id).await.is_none());
            exec.restart().await;
            exec.wait_procedure(id).await;
        }
        let result = exec.result(id).await.expect("result");
        assert!(result.is_success());
        assert!(exec.is_running());
    }

    #[tokio::test]
    async fn operational_failure_rolls_back_and_is_not_an_abort() {
        let exec = seeded();
        let id = exec
            .submit(SimOperation::DropSubResource {
                resource: "t".into(),
                sub_resource: "nope".into(),
                rollback_hiccups: 0,
            })
            .await;
        exec.wait_procedure(id).await;

        let result = exec.result(id).await.expect("result");
        assert!(result.failed);
        assert!(!result.aborted);
        assert!(result.error.expect("cause").contains("not found"));
    }

    #[tokio::test]
    async fn abort_before_ponr_unwinds_and_classifies_as_aborted() {
        let exec = seeded();
        let id = exec.submit(drop_op(0)).await;
        exec.wait_procedure(id).await;
        // Finished procedure: late aborts are no-ops.
        exec.request_abort(id).await;
        exec.request_abort(id).await;
        assert!(exec.result(id).await.expect("result").is_success());

        // Fresh procedure aborted at reload before it runs again.
        let exec = seeded();
        exec.set_crash_before_persist(true).await;
        let id = exec.submit(drop_op(0)).await;
        exec.wait_procedure(id).await;
        exec.set_crash_before_persist(false).await;

        let lid = exec
            .register_listener(Box::new(faultline_harness::AbortOnReload::new(id)))
            .await;
        exec.restart().await;
        exec.wait_procedure(id).await;
        assert!(exec.unregister_listener(lid).await);

        let result = exec.result(id).await.expect("result");
        assert!(result.aborted);
        assert!(!result.failed);
    }

    #[tokio::test]
    async fn transient_rollback_failures_retry_within_one_run() {
        let exec = seeded();
        exec.set_crash_before_persist(true).await;
        let id = exec.submit(drop_op(3)).await;
        exec.wait_procedure(id).await;
        exec.set_crash_before_persist(false).await;

        let lid = exec
            .register_listener(Box::new(faultline_harness::AbortOnReload::new(id)))
            .await;
        exec.restart().await;
        exec.wait_procedure(id).await;
        assert!(exec.unregister_listener(lid).await);

        let result = exec.result(id).await.expect("result");
        assert!(result.aborted, "retries must resolve to the abort outcome");
        assert!(!result.failed);
    }

    #[tokio::test]
    async fn unregistering_unknown_listener_reports_failure() {
        let exec = SimExecutor::new();
        let lid = exec
            .register_listener(Box::new(faultline_harness::AbortOnReload::new(ProcId(0))))
            .await;
        assert!(exec.unregister_listener(lid).await);
        assert!(!exec.unregister_listener(lid).await);
    }
}
