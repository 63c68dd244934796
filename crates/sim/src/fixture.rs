//! Scenario fixture binding the sim engine to the fault suite.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use faultline_harness::{
    DomainOracle, OracleViolation, ProcId, ProcedureExecutor, ScenarioFixture,
};

use crate::executor::SimExecutor;
use crate::plan::{SimOperation, DROP_SUB_RESOURCE_STATES};

const RESOURCE: &str = "table_1";
const SUB_RESOURCES: [&str; 4] = ["f1", "f2", "f3", "cf_drop"];
const TARGET_SUB: &str = "cf_drop";

/// Drops `cf_drop` from a four-sub-resource seeded resource. Built fresh
/// per case by the suite factory.
pub struct DropSubResourceFixture {
    exec: SimExecutor,
    rollback_hiccups: AtomicU32,
}

impl DropSubResourceFixture {
    pub async fn new() -> Self {
        let exec = SimExecutor::new();
        exec.create_resource(RESOURCE, &SUB_RESOURCES);
        Self {
            exec,
            rollback_hiccups: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ScenarioFixture for DropSubResourceFixture {
    type Exec = SimExecutor;

    fn executor(&self) -> &SimExecutor {
        &self.exec
    }

    fn step_states(&self) -> Vec<String> {
        DROP_SUB_RESOURCE_STATES.iter().map(|s| s.to_string()).collect()
    }

    fn ponr_index(&self) -> Option<usize> {
        SimOperation::DropSubResource {
            resource: RESOURCE.to_string(),
            sub_resource: TARGET_SUB.to_string(),
            rollback_hiccups: 0,
        }
        .ponr_index()
    }

    async fn submit_target(&self) -> ProcId {
        self.exec
            .submit(SimOperation::DropSubResource {
                resource: RESOURCE.to_string(),
                sub_resource: TARGET_SUB.to_string(),
                rollback_hiccups: self.rollback_hiccups.load(Ordering::SeqCst),
            })
            .await
    }

    async fn submit_empty(&self) -> Option<ProcId> {
        Some(self.exec.submit(SimOperation::Noop).await)
    }

    fn supports_retriable_rollback(&self) -> bool {
        true
    }

    async fn arm_retriable_rollback(&self) {
        self.rollback_hiccups.store(3, Ordering::SeqCst);
    }

    async fn verify_applied(&self) -> Result<(), OracleViolation> {
        let oracle = self.exec.oracle();
        oracle.verify_resource_present(RESOURCE, &["f1", "f2", "f3"]).await?;
        oracle.verify_sub_resource_absent(RESOURCE, TARGET_SUB).await
    }

    async fn verify_unapplied(&self) -> Result<(), OracleViolation> {
        let oracle = self.exec.oracle();
        oracle.verify_resource_present(RESOURCE, &SUB_RESOURCES).await?;
        oracle.verify_sub_resource_present(RESOURCE, TARGET_SUB).await
    }
}
