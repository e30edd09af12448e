// Cleaning pipeline: per-table validation and write-back, then the merged dataset

pub mod orchestrator;
pub mod pacing;
pub mod processing;
pub mod reconcile;
pub mod remote_table;
pub mod report;

pub use orchestrator::Orchestrator;
