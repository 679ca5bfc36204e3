//! Reconciliation pipeline.
//!
//! - `plan`: which listing pages a pass must fetch
//! - `reconcile`: missing titles from remote, local and downloaded sets
//! - `pass`: one full pass for one entity
//! - `orchestrator`: bounded concurrent passes over many entities
//! - `scan`: entry point wiring the default collaborators

pub mod context;
pub mod orchestrator;
pub mod pass;
pub mod plan;
pub mod reconcile;
pub mod scan;

pub use context::RunContext;
pub use orchestrator::{Orchestrator, RunSummary, TaskState};
pub use pass::run_entity_pass;
pub use plan::{DRIFT_WINDOW, FetchRange, FetchRangePlanner, plan_range};
pub use reconcile::{ReconcileInput, Reconciliation, reconcile};
pub use scan::run_scan;
