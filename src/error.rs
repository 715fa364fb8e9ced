//! Error types for the harvest pipeline.

use snafu::prelude::*;

/// Errors returned by the external batch service collaborator.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    /// Transport-level failure reaching the service.
    #[snafu(display("Transport failure: {message}"))]
    Transport { message: String },

    /// The service returned an empty response body.
    #[snafu(display("Service returned an empty response"))]
    EmptyResponse,

    /// The service rejected the request with a definitive status.
    #[snafu(display("Service rejected the request with status {code}: {message}"))]
    Rejected { code: u16, message: String },
}

impl ServiceError {
    /// Whether a retry has a chance of succeeding.
    ///
    /// Transport failures and empty responses are transient. Rejections are
    /// transient only for throttling and server-side status codes.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport { .. } | ServiceError::EmptyResponse => true,
            ServiceError::Rejected { code, .. } => matches!(code, 408 | 429) || *code >= 500,
        }
    }
}

/// Errors reading the work source.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to read the work source file.
    #[snafu(display("Failed to read work source {path}: {source}"))]
    ReadSource { path: String, source: std::io::Error },
}

/// Errors that can occur during checkpoint and cache persistence.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Failed to read a file.
    #[snafu(display("Failed to read {path}: {source}"))]
    Read { path: String, source: std::io::Error },

    /// Failed to write a file.
    #[snafu(display("Failed to write {path}: {source}"))]
    Write { path: String, source: std::io::Error },

    /// Failed to atomically replace a file with its temp sibling.
    #[snafu(display("Failed to replace {path}: {source}"))]
    Replace { path: String, source: std::io::Error },

    /// Failed to create a directory.
    #[snafu(display("Failed to create directory {path}: {source}"))]
    CreateDir { path: String, source: std::io::Error },

    /// Failed to serialize state to JSON.
    #[snafu(display("Failed to serialize state: {source}"))]
    Serialize { source: serde_json::Error },
}

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input path is empty.
    #[snafu(display("Input path cannot be empty"))]
    EmptyInputPath,

    /// Output directory is empty.
    #[snafu(display("Output directory cannot be empty"))]
    EmptyOutputDir,

    /// Batch size must be positive.
    #[snafu(display("batch_size must be greater than zero"))]
    ZeroBatchSize,

    /// Attempt bound must be positive.
    #[snafu(display("max_attempts must be greater than zero"))]
    ZeroMaxAttempts,

    /// Flush cadence must be positive.
    #[snafu(display("flush_interval_batches must be greater than zero"))]
    ZeroFlushInterval,

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

/// Errors that can occur during Dead Letter Queue operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts (e.g., WriteSnafu)
#[allow(clippy::enum_variant_names)]
pub enum DlqError {
    /// Failed to write to the DLQ file.
    #[snafu(display("Failed to write to DLQ"))]
    DlqWrite { source: std::io::Error },

    /// Failed to serialize a failed item record.
    #[snafu(display("Failed to serialize DLQ record"))]
    DlqSerialize { source: serde_json::Error },
}

/// Top-level pipeline errors.
///
/// Item-level and batch-level failures are recovered locally and never show
/// up here; only configuration, work-source, and storage failures are fatal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Work source error.
    #[snafu(display("Work source error: {source}"))]
    Source { source: SourceError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// DLQ error.
    #[snafu(display("DLQ error: {source}"))]
    Dlq { source: DlqError },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<SourceError> for PipelineError {
    fn from(source: SourceError) -> Self {
        PipelineError::Source { source }
    }
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<DlqError> for PipelineError {
    fn from(source: DlqError) -> Self {
        PipelineError::Dlq { source }
    }
}
