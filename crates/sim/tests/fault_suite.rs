//! Runs the engine-agnostic fault suite against the sim engine.

use faultline_harness::run_fault_suite;
use faultline_sim::DropSubResourceFixture;

#[tokio::test]
async fn sim_engine_passes_fault_suite() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let report = run_fault_suite(DropSubResourceFixture::new).await;
    assert_eq!(report.failed, 0, "{report}");
    // 6 forward states with PONR at 3: two recovery cases, three rollback
    // depths, three abort-refusal depths, retriable, listener, abort.
    assert_eq!(report.total, 11);
}
