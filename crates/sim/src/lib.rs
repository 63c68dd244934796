//! In-memory reference procedure engine for the faultline harness.
//!
//! [`SimExecutor`] implements the executor contract end to end: persistent
//! step cursors, crash injection at store-update boundaries, recovery by
//! replay, compensation-based rollback with a point of no return, and
//! lifecycle listener dispatch. [`DropSubResourceFixture`] wires it into
//! the engine-agnostic fault suite.

pub mod domain;
pub mod executor;
pub mod fixture;
pub mod plan;
mod store;

pub use domain::{SimDomain, SimOracle};
pub use executor::SimExecutor;
pub use fixture::DropSubResourceFixture;
pub use plan::{
    SimOperation, DROP_SUB_RESOURCE_PONR, DROP_SUB_RESOURCE_STATES, LOAD_ROWS_STATES,
};
