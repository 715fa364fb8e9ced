//! Work sources: the ordered collection of items to process.
//!
//! A work item's identity is derived purely from the input, so a resumed run
//! can recompute what is already done without re-requesting anything.

use std::path::PathBuf;

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::info;

use crate::error::{ReadSourceSnafu, SourceError};

/// One unit of input for the external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Unique identifier, stable across runs.
    pub id: String,
    /// Input data for the external call.
    pub payload: String,
}

/// Produces the ordered collection of items to process.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Load all work items in their canonical order.
    async fn load(&self) -> Result<Vec<WorkItem>, SourceError>;
}

/// Work source backed by a text file with one identifier per line.
///
/// Blank lines are skipped. The identifier doubles as the request payload,
/// which matches identifier-batch lookup services.
pub struct LineFileSource {
    path: PathBuf,
}

impl LineFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WorkSource for LineFileSource {
    async fn load(&self) -> Result<Vec<WorkItem>, SourceError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .context(ReadSourceSnafu {
                path: self.path.display().to_string(),
            })?;

        let items: Vec<WorkItem> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| WorkItem {
                id: line.to_string(),
                payload: line.to_string(),
            })
            .collect();

        info!(
            path = %self.path.display(),
            count = items.len(),
            "Loaded work items"
        );

        Ok(items)
    }
}
