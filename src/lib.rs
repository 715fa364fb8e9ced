//! Harvest: resumable batch pipeline for bioliterature retrieval.
//!
//! This crate handles:
//! - Partitioning an ordered work list into fixed-size batches
//! - Submitting each batch to an external lookup service with bounded retries
//!   and pacing delays
//! - Accumulating per-item results and routing exhausted ids to a failure set
//! - Periodic atomic checkpointing so interrupted runs resume without
//!   reprocessing completed work
//! - A dead letter queue of exhausted ids for offline resubmission

pub mod accumulate;
pub mod batch;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod dlq;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod signal;
pub mod source;
pub mod tracing;

// Re-export commonly used items
pub use accumulate::{AccumulatedState, StateSummary};
pub use batch::{Batch, partition};
pub use cache::{CachedFetcher, DiskCache};
pub use checkpoint::CheckpointManager;
pub use config::Config;
pub use dlq::DeadLetterQueue;
pub use error::PipelineError;
pub use pipeline::{DriverState, Pipeline, PipelineOptions, PipelineReport};
pub use retry::{
    AttemptOutcome, BatchFetcher, BatchOutcome, RetryController, RetryPolicy, ServiceFetcher,
};
pub use service::{
    BatchService, HttpBatchService, ItemResult, ItemStatus, JsonLinesParser, ResponseParser,
};
pub use source::{LineFileSource, WorkItem, WorkSource};

pub use crate::signal::shutdown_signal;
pub use crate::tracing::init_tracing;
