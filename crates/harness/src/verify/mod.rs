//! The verifiers.
//!
//! Each submodule drives the restart driver through one fault-injection
//! scenario shape and asserts the terminal classification:
//!
//! - [`recovery`] — forward crash/recovery through every resume point
//! - [`rollback`] — abort injected on reload, unwound boundary by boundary
//! - [`ponr`] — abort injected past the point of no return and refused
//! - [`retriable`] — rollback steps that fail transiently before succeeding
//!
//! Scenarios supply the handle, the step count, and the state enumeration;
//! the enumeration carries no control logic and is used only to name the
//! resume point being exercised in logs.

pub mod ponr;
pub mod recovery;
pub mod retriable;
pub mod rollback;

pub use ponr::rollback_after_ponr;
pub use recovery::recovery_and_double_execution;
pub use retriable::rollback_retriable_failure;
pub use rollback::rollback_and_double_execution;

use crate::error::HarnessError;
use crate::traits::{ProcId, ProcedureExecutor};

/// The procedure must have completed forward: a recorded result with no
/// failure and no abort.
pub(crate) async fn expect_success<E: ProcedureExecutor>(
    exec: &E,
    proc_id: ProcId,
) -> Result<(), HarnessError> {
    match exec.result(proc_id).await {
        None => Err(HarnessError::StillTransient { proc_id }),
        Some(result) if result.aborted => Err(HarnessError::UnexpectedAbort { proc_id }),
        Some(result) if result.failed => Err(HarnessError::UnexpectedFailure {
            proc_id,
            cause: result.error.unwrap_or_else(|| "unknown cause".to_string()),
        }),
        Some(_) => Ok(()),
    }
}

/// The procedure must have resolved to the abort outcome, which is distinct
/// from an ordinary operational failure.
pub(crate) async fn expect_aborted<E: ProcedureExecutor>(
    exec: &E,
    proc_id: ProcId,
) -> Result<(), HarnessError> {
    match exec.result(proc_id).await {
        None => Err(HarnessError::StillTransient { proc_id }),
        Some(result) if result.aborted && !result.failed => Ok(()),
        Some(result) => Err(HarnessError::NotAborted {
            proc_id,
            observed: result.classification().to_string(),
        }),
    }
}
