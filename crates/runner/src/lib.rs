//! Batch runner: whole-batch retry around the listing fact pipeline.

pub mod retry;

pub use retry::{RetryPolicy, run_with_retry};
