//! Step plans for the operations the sim engine can run.
//!
//! Each operation carries a static forward state enumeration, an optional
//! point-of-no-return index, and the side effects of each step and its
//! compensation. Step side effects land on the domain immediately (they
//! model external systems, not the procedure store), which is exactly what
//! makes replay after a crash a double execution: every step must tolerate
//! running twice.

use crate::domain::SimDomain;

/// Forward states of the drop-sub-resource plan. The layout deletion is
/// irreversible, so the PONR sits on `delete_layout`.
pub const DROP_SUB_RESOURCE_STATES: [&str; 6] = [
    "prepare",
    "pre_operation",
    "update_catalog",
    "delete_layout",
    "post_operation",
    "reopen",
];

/// Index of `delete_layout` in [`DROP_SUB_RESOURCE_STATES`].
pub const DROP_SUB_RESOURCE_PONR: usize = 3;

/// Forward states of the row-loading plan. Fully reversible.
pub const LOAD_ROWS_STATES: [&str; 3] = ["prepare", "write_rows", "flush"];

/// An operation descriptor accepted by the sim engine.
#[derive(Debug, Clone)]
pub enum SimOperation {
    /// Drop one sub-resource: catalog metadata update first, then the
    /// irreversible layout deletion.
    DropSubResource {
        resource: String,
        sub_resource: String,
        /// Total transient failures rollback burns through before its
        /// compensations start succeeding. Zero means rollback never
        /// hiccups. The budget is restored on every restart.
        rollback_hiccups: u32,
    },
    /// Seed every sub-resource of a resource with `rows` rows. The write is
    /// an absolute assignment, so re-executing it after a crash converges
    /// instead of doubling.
    LoadRows { resource: String, rows: u64 },
    /// Empty plan: completes without a single store-update boundary.
    Noop,
}

impl SimOperation {
    pub fn states(&self) -> &'static [&'static str] {
        match self {
            SimOperation::DropSubResource { .. } => &DROP_SUB_RESOURCE_STATES,
            SimOperation::LoadRows { .. } => &LOAD_ROWS_STATES,
            SimOperation::Noop => &[],
        }
    }

    /// The step index at which this plan commits an irreversible side
    /// effect, queryable so scenarios never hardcode it.
    pub fn ponr_index(&self) -> Option<usize> {
        match self {
            SimOperation::DropSubResource { .. } => Some(DROP_SUB_RESOURCE_PONR),
            SimOperation::LoadRows { .. } | SimOperation::Noop => None,
        }
    }

    pub fn rollback_hiccups(&self) -> u32 {
        match self {
            SimOperation::DropSubResource {
                rollback_hiccups, ..
            } => *rollback_hiccups,
            SimOperation::LoadRows { .. } | SimOperation::Noop => 0,
        }
    }

    /// Execute the forward step at `idx`. An `Err` is an operational
    /// failure and triggers rollback from this step.
    pub(crate) fn execute_step(&self, idx: usize, domain: &mut SimDomain) -> Result<(), String> {
        match self {
            SimOperation::DropSubResource {
                resource,
                sub_resource,
                ..
            } => match idx {
                0 => {
                    if domain.sub_resource_in_catalog(resource, sub_resource) {
                        Ok(())
                    } else {
                        Err(format!(
                            "sub-resource '{sub_resource}' not found in '{resource}'"
                        ))
                    }
                }
                2 => {
                    domain.remove_sub_from_catalog(resource, sub_resource);
                    Ok(())
                }
                3 => {
                    domain.remove_sub_from_layout(resource, sub_resource);
                    Ok(())
                }
                // pre_operation, post_operation, reopen
                _ => Ok(()),
            },
            SimOperation::LoadRows { resource, rows } => match idx {
                0 => {
                    if domain.resource_in_catalog(resource) {
                        Ok(())
                    } else {
                        Err(format!("resource '{resource}' not found"))
                    }
                }
                1 => {
                    domain.set_rows(resource, *rows);
                    Ok(())
                }
                _ => Ok(()),
            },
            SimOperation::Noop => Ok(()),
        }
    }

    /// Compensate the step at `idx`. Compensations must tolerate the step
    /// having executed without persisting, and not at all.
    pub(crate) fn compensate_step(&self, idx: usize, domain: &mut SimDomain) {
        match self {
            SimOperation::DropSubResource {
                resource,
                sub_resource,
                ..
            } => {
                if idx == 2 {
                    domain.restore_sub_to_catalog(resource, sub_resource);
                }
            }
            SimOperation::LoadRows { resource, .. } => {
                if idx == 1 {
                    domain.set_rows(resource, 0);
                }
            }
            SimOperation::Noop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SimDomain;

    #[test]
    fn drop_plan_shape() {
        let op = SimOperation::DropSubResource {
            resource: "t".into(),
            sub_resource: "cf".into(),
            rollback_hiccups: 0,
        };
        assert_eq!(op.states().len(), 6);
        assert_eq!(op.ponr_index(), Some(3));
        assert_eq!(op.states()[3], "delete_layout");
    }

    #[test]
    fn forward_steps_are_idempotent_under_replay() {
        let mut domain = SimDomain::default();
        domain.create_resource("t", &["f1", "cf"]);
        let op = SimOperation::DropSubResource {
            resource: "t".into(),
            sub_resource: "cf".into(),
            rollback_hiccups: 0,
        };

        // Replay every step twice, as a crash before persist forces.
        for idx in 0..op.states().len() {
            op.execute_step(idx, &mut domain).expect("step");
            op.execute_step(idx, &mut domain).expect("replayed step");
        }
        assert!(!domain.sub_resource_in_catalog("t", "cf"));
        assert!(!domain.sub_resource_in_layout("t", "cf"));
        assert!(domain.sub_resource_in_catalog("t", "f1"));
    }

    #[test]
    fn compensation_restores_catalog_entry() {
        let mut domain = SimDomain::default();
        domain.create_resource("t", &["f1", "cf"]);
        let op = SimOperation::DropSubResource {
            resource: "t".into(),
            sub_resource: "cf".into(),
            rollback_hiccups: 0,
        };

        op.execute_step(2, &mut domain).expect("update_catalog");
        assert!(!domain.sub_resource_in_catalog("t", "cf"));
        op.compensate_step(2, &mut domain);
        assert!(domain.sub_resource_in_catalog("t", "cf"));
        assert!(domain.sub_resource_in_layout("t", "cf"));
    }
}
