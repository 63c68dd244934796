//! End-to-end fault scenarios for the drop-sub-resource procedure,
//! exercising the verify routines directly against the sim engine.

use faultline_harness::{
    recovery_and_double_execution, rollback_after_ponr, rollback_and_double_execution,
    rollback_retriable_failure, AbortOnReload, DomainOracle, ProcedureExecutor,
};
use faultline_sim::{
    SimExecutor, SimOperation, DROP_SUB_RESOURCE_PONR, DROP_SUB_RESOURCE_STATES, LOAD_ROWS_STATES,
};

const RESOURCE: &str = "table_1";
const SUBS: [&str; 4] = ["f1", "f2", "f3", "cf_drop"];
const TARGET: &str = "cf_drop";

fn seeded() -> SimExecutor {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let exec = SimExecutor::new();
    exec.create_resource(RESOURCE, &SUBS);
    exec
}

fn drop_op(hiccups: u32) -> SimOperation {
    SimOperation::DropSubResource {
        resource: RESOURCE.to_string(),
        sub_resource: TARGET.to_string(),
        rollback_hiccups: hiccups,
    }
}

fn drop_states() -> Vec<String> {
    DROP_SUB_RESOURCE_STATES.iter().map(|s| s.to_string()).collect()
}

async fn verify_dropped(exec: &SimExecutor) {
    let oracle = exec.oracle();
    oracle
        .verify_resource_present(RESOURCE, &["f1", "f2", "f3"])
        .await
        .expect("surviving sub-resources intact");
    oracle
        .verify_sub_resource_absent(RESOURCE, TARGET)
        .await
        .expect("target fully removed");
}

async fn verify_intact(exec: &SimExecutor) {
    let oracle = exec.oracle();
    oracle
        .verify_resource_present(RESOURCE, &SUBS)
        .await
        .expect("resource unchanged");
    oracle
        .verify_sub_resource_present(RESOURCE, TARGET)
        .await
        .expect("target still attached");
}

#[tokio::test]
async fn clean_drop() {
    let exec = seeded();
    let id = exec.submit(drop_op(0)).await;
    exec.wait_procedure(id).await;

    assert!(exec.result(id).await.expect("result").is_success());
    verify_dropped(&exec).await;
}

#[tokio::test]
async fn clean_drop_with_seeded_rows() {
    let exec = seeded();
    exec.load_rows(RESOURCE, 100);
    assert_eq!(exec.row_count(RESOURCE, TARGET), Some(100));

    let id = exec.submit(drop_op(0)).await;
    exec.wait_procedure(id).await;

    assert!(exec.result(id).await.expect("result").is_success());
    assert_eq!(exec.row_count(RESOURCE, TARGET), None);
    assert_eq!(exec.row_count(RESOURCE, "f1"), Some(100));
    verify_dropped(&exec).await;
}

#[tokio::test]
async fn dropping_twice_fails_operationally() {
    let exec = seeded();
    let first = exec.submit(drop_op(0)).await;
    exec.wait_procedure(first).await;
    assert!(exec.result(first).await.expect("result").is_success());

    let second = exec.submit(drop_op(0)).await;
    exec.wait_procedure(second).await;

    let result = exec.result(second).await.expect("result");
    assert!(result.failed, "second drop must fail, not succeed");
    assert!(!result.aborted, "an operational failure is not an abort");
    assert!(result.error.expect("cause").contains("not found"));
    verify_dropped(&exec).await;
}

#[tokio::test]
async fn dropping_unknown_sub_resource_fails_operationally() {
    let exec = seeded();
    let id = exec
        .submit(SimOperation::DropSubResource {
            resource: RESOURCE.to_string(),
            sub_resource: "cf_missing".to_string(),
            rollback_hiccups: 0,
        })
        .await;
    exec.wait_procedure(id).await;

    let result = exec.result(id).await.expect("result");
    assert!(result.failed);
    assert!(!result.aborted);
    verify_intact(&exec).await;
}

#[tokio::test]
async fn recovery_and_double_execution_completes_the_drop() {
    let exec = seeded();
    exec.load_rows(RESOURCE, 50);
    let states = drop_states();

    exec.set_crash_before_persist(true).await;
    let id = exec.submit(drop_op(0)).await;
    recovery_and_double_execution(&exec, id, states.len(), &states)
        .await
        .expect("recovery drive");
    exec.set_crash_before_persist(false).await;

    verify_dropped(&exec).await;
    assert_eq!(exec.row_count(RESOURCE, "f1"), Some(50));
}

#[tokio::test]
async fn rollback_before_catalog_update_leaves_resource_intact() {
    let exec = seeded();
    let states = drop_states();

    exec.set_crash_before_persist(true).await;
    let id = exec.submit(drop_op(0)).await;
    rollback_and_double_execution(&exec, id, 1, &states)
        .await
        .expect("rollback drive");
    exec.set_crash_before_persist(false).await;

    verify_intact(&exec).await;
}

#[tokio::test]
async fn rollback_after_catalog_update_restores_the_entry() {
    let exec = seeded();
    let states = drop_states();
    let last_step = DROP_SUB_RESOURCE_PONR - 1;

    exec.set_crash_before_persist(true).await;
    let id = exec.submit(drop_op(0)).await;
    rollback_and_double_execution(&exec, id, last_step, &states)
        .await
        .expect("rollback drive");
    exec.set_crash_before_persist(false).await;

    verify_intact(&exec).await;
}

#[tokio::test]
async fn abort_past_ponr_is_refused_and_the_drop_completes() {
    let exec = seeded();
    let states = drop_states();

    exec.set_crash_before_persist(true).await;
    let id = exec.submit(drop_op(0)).await;
    // Abort lands after the layout deletion has persisted.
    rollback_after_ponr(&exec, id, DROP_SUB_RESOURCE_PONR + 1, &states)
        .await
        .expect("ponr drive");

    verify_dropped(&exec).await;
}

#[tokio::test]
async fn transient_rollback_failures_still_reach_the_abort_outcome() {
    let exec = seeded();
    let states = drop_states();

    exec.set_crash_before_persist(true).await;
    let id = exec.submit(drop_op(3)).await;
    rollback_retriable_failure(&exec, id, 1, &states)
        .await
        .expect("retriable drive");

    verify_intact(&exec).await;
}

#[tokio::test]
async fn abort_during_failure_rollback_keeps_the_failed_classification() {
    let exec = seeded();

    // Fail operationally at `prepare`, then crash at the first rollback
    // boundary so the persisted cursor is already unwinding.
    exec.set_crash_before_persist(true).await;
    let id = exec
        .submit(SimOperation::DropSubResource {
            resource: RESOURCE.to_string(),
            sub_resource: "cf_missing".to_string(),
            rollback_hiccups: 0,
        })
        .await;
    exec.wait_procedure(id).await;
    assert!(!exec.is_running(), "rollback must crash at its first boundary");
    assert!(exec.result(id).await.is_none());
    exec.set_crash_before_persist(false).await;

    // Abort from both directions: injected on reload and requested
    // directly. Neither may re-classify a failure-initiated rollback.
    let listener_id = exec.register_listener(Box::new(AbortOnReload::new(id))).await;
    exec.request_abort(id).await;
    exec.restart().await;
    exec.wait_procedure(id).await;
    assert!(exec.unregister_listener(listener_id).await);

    let result = exec.result(id).await.expect("result");
    assert!(result.failed, "failure-initiated rollback must stay failed");
    assert!(!result.aborted, "a late abort must not become the outcome");
    assert!(result.error.expect("cause").contains("not found"));
    verify_intact(&exec).await;
}

#[tokio::test]
async fn oracle_distinguishes_absent_resources() {
    let exec = seeded();
    let oracle = exec.oracle();

    oracle
        .verify_resource_absent("table_missing")
        .await
        .expect("unknown resource is absent everywhere");
    assert!(
        oracle.verify_resource_absent(RESOURCE).await.is_err(),
        "a seeded resource must fail the absence check"
    );
}

#[tokio::test]
async fn load_rows_recovers_across_every_step() {
    let exec = seeded();
    let num_steps = LOAD_ROWS_STATES.len();

    exec.set_crash_before_persist(true).await;
    let id = exec
        .submit(SimOperation::LoadRows {
            resource: RESOURCE.to_string(),
            rows: 100,
        })
        .await;
    exec.wait_procedure(id).await;

    for _ in 0..num_steps {
        assert!(!exec.is_running(), "armed crash must stop the executor");
        assert!(exec.result(id).await.is_none());
        exec.restart().await;
        exec.wait_procedure(id).await;
    }
    exec.set_crash_before_persist(false).await;

    assert!(exec.is_running());
    assert!(exec.result(id).await.expect("result").is_success());
    for sub in SUBS {
        assert_eq!(exec.row_count(RESOURCE, sub), Some(100));
    }
}

#[tokio::test]
async fn zero_step_procedure_passes_through_armed_crash_injection() {
    let exec = seeded();

    exec.set_crash_before_persist(true).await;
    let id = exec.submit(SimOperation::Noop).await;
    exec.wait_procedure(id).await;
    exec.set_crash_before_persist(false).await;

    assert!(exec.is_running(), "a plan with no steps crosses no boundary");
    assert!(exec.result(id).await.expect("result").is_success());
}
