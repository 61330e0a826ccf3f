//! Wire types for the master/worker HTTP protocol (spec.md §6).
//!
//! Grounded on `examples/original_source/orchestrator/data/communication.go`.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// The three control messages a worker posts back to the master, matching
/// `data/communication.go`'s `scanner_msg` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerMsgKind {
    Register,
    Unregister,
    FinishTask,
}

/// Body of `POST /register`, `/unregister`, `/finish_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerInstanceControlMsg {
    pub scanner_template: String,
    pub scanner_instance: String,
    pub scanner_msg: ScannerMsgKind,
}

/// Body of `POST /artifact` on the master: an [`Artifact`] tagged with the
/// template/instance that produced it. Mirrors `ArtifactNamed`, which in Go
/// embeds `Artifact` anonymously — `encoding/json` flattens that embedding
/// to the same flat JSON shape `#[serde(flatten)]` produces here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactNamed {
    #[serde(flatten)]
    pub artifact: Artifact,
    pub scanner_template: String,
    pub scanner_instance: String,
}
