//! The abort-on-reload listener.
//!
//! Registered before a restart that is expected to trigger a reload, it
//! answers every `ReloadedFromStore` event for its target handle with an
//! abort request, forcing the rollback path (or, past the point of no
//! return, exercising the executor's refusal to roll back). All other
//! events are ignored.

use crate::traits::{LifecycleEvent, LifecycleListener, ListenerAction, ProcId};

/// Requests an abort of the target procedure every time it is reloaded
/// from the store. Abort requests are advisory and idempotent, so firing
/// on every reload is safe even once the procedure is already unwinding
/// or finished.
#[derive(Debug, Clone, Copy)]
pub struct AbortOnReload {
    target: ProcId,
}

impl AbortOnReload {
    pub fn new(target: ProcId) -> Self {
        Self { target }
    }
}

impl LifecycleListener for AbortOnReload {
    fn on_event(&self, event: &LifecycleEvent) -> Option<ListenerAction> {
        match event {
            LifecycleEvent::ReloadedFromStore(id) if *id == self.target => {
                tracing::debug!(proc = %id, "injecting abort on reload");
                Some(ListenerAction::Abort)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborts_only_its_target_on_reload() {
        let listener = AbortOnReload::new(ProcId(7));

        assert_eq!(
            listener.on_event(&LifecycleEvent::ReloadedFromStore(ProcId(7))),
            Some(ListenerAction::Abort)
        );
        assert_eq!(
            listener.on_event(&LifecycleEvent::ReloadedFromStore(ProcId(8))),
            None
        );
    }

    #[test]
    fn ignores_submitted_and_finished() {
        let listener = AbortOnReload::new(ProcId(7));

        assert_eq!(listener.on_event(&LifecycleEvent::Submitted(ProcId(7))), None);
        assert_eq!(listener.on_event(&LifecycleEvent::Finished(ProcId(7))), None);
    }
}
