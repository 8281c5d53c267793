//! Infrastructure layer: source, dimension and fact store boundaries, the
//! batch pipeline that connects them, and configuration.

pub mod config;
pub mod dimensions;
pub mod fact_store;
pub mod pipeline;
pub mod source;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{BatchPipeline, BatchReport, LastExecution, PipelineError, RunOptions, Watermark};

#[cfg(test)]
mod integration_tests;

#[cfg(test)]
mod test_support;
