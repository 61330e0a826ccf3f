//! Where the final artifact set goes when the scheduler shuts down.
//!
//! Grounded on
//! `examples/original_source/orchestrator/internal/storage/storage.go`'s
//! `DumpToFile`. Per SPEC_FULL.md §4.14 this is a trait rather than a fixed
//! file path, so a future sink (S3, a database) can be swapped in without
//! touching the scheduler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::artifact::Artifact;
use crate::error::ResultsError;

#[async_trait]
pub trait ResultsSink: Send + Sync {
    async fn write_all(&self, artifacts: &[Artifact]) -> Result<(), ResultsError>;
}

/// Writes the full artifact set as a single pretty-printed JSON array,
/// matching the original's `DumpToFile` output shape.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResultsSink for JsonFileSink {
    async fn write_all(&self, artifacts: &[Artifact]) -> Result<(), ResultsError> {
        let bytes = serde_json::to_vec_pretty(artifacts).map_err(ResultsError::Serialize)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(ResultsError::Write)?;
        info!(path = %self.path.display(), count = artifacts.len(), "wrote results");
        Ok(())
    }
}
