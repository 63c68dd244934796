//! The engine's persistent procedure store.
//!
//! Stands in for a durable store: only mutations applied at a store-update
//! boundary survive a simulated crash, because the run loop writes progress
//! nowhere else. Domain side effects are NOT in here — they model external
//! systems and land immediately, which is what makes replay after a crash a
//! genuine double execution.

use std::collections::BTreeMap;

use faultline_harness::ProcedureResult;

use crate::plan::SimOperation;

/// Persisted execution cursor for one procedure.
#[derive(Debug, Clone)]
pub(crate) enum Cursor {
    /// Steps `0..next` have persisted; `next` is the resume point.
    Forward { next: usize },
    /// Unwinding: compensations for steps `pos` down to `0` remain.
    /// `cause` is the operational failure that started the rollback, or
    /// `None` when rollback was abort-initiated — the distinction decides
    /// the terminal classification and must survive restarts.
    Rollback { pos: usize, cause: Option<String> },
}

#[derive(Debug)]
pub(crate) struct ProcSlot {
    pub op: SimOperation,
    pub cursor: Cursor,
    pub result: Option<ProcedureResult>,
}

#[derive(Debug, Default)]
pub(crate) struct SimStore {
    pub slots: BTreeMap<u64, ProcSlot>,
}

impl SimStore {
    pub fn insert(&mut self, id: u64, op: SimOperation) {
        self.slots.insert(
            id,
            ProcSlot {
                op,
                cursor: Cursor::Forward { next: 0 },
                result: None,
            },
        );
    }

    /// Ids of procedures without a terminal result, in submission order.
    pub fn unfinished_ids(&self) -> Vec<u64> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.result.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn all_finished(&self) -> bool {
        self.slots.values().all(|slot| slot.result.is_some())
    }
}
