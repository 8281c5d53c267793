//! The incremental listing fact batch.

pub mod aggregation;
pub mod batch;
pub mod error;
pub mod previous_state;
pub mod report;
pub mod watermark;

pub use aggregation::{BatchAggregates, load_aggregates};
pub use batch::{BatchPipeline, RunOptions, build_drafts};
pub use error::PipelineError;
pub use previous_state::resolve_previous;
pub use report::{BatchReport, BatchStatus, ExecutionRecord, ExecutionStatus, LastExecution};
pub use watermark::{Watermark, enrich_candidates, read_watermark, select_candidates};
