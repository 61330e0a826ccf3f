//! Abstraction over how a scanner worker's process is launched and torn
//! down.
//!
//! Grounded on `examples/original_source/orchestrator/internal/docker_utils/utils.go`,
//! which shells out to the configured container engine. Per SPEC_FULL.md
//! §4.15 this is a trait so a container engine is swappable for a bare
//! process launcher in tests; `ProcessRuntime` below is the default,
//! a plain `tokio::process::Command` launcher standing in for the
//! out-of-scope container runtime (spec.md §1).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::RuntimeError;

/// A running worker process, returned by [`WorkerRuntime::run`].
pub struct WorkerHandle {
    child: Option<Child>,
    name: String,
}

impl WorkerHandle {
    fn new(name: String, child: Child) -> Self {
        Self {
            child: Some(child),
            name,
        }
    }

    /// Stops and removes the worker. Consumes `self`: a handle is only ever
    /// torn down once.
    pub async fn stop_and_remove(mut self) -> Result<(), RuntimeError> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                warn!(instance = %self.name, error = %e, "failed to signal worker process");
            }
            child.wait().await.map_err(RuntimeError::Stop)?;
        }
        Ok(())
    }
}

/// How worker processes are launched and stopped. Implementations decide
/// what `image` means: a container image tag, a binary path, anything the
/// deployment needs.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    async fn run(&self, image: &str, name: &str, env: &[(String, String)]) -> Result<WorkerHandle, RuntimeError>;
}

/// Launches `image` as a bare child process, passing `env` as environment
/// variables. Grounded on the teacher's `tokio::process::Command` usage;
/// stands in for a container engine when none is configured.
pub struct ProcessRuntime;

#[async_trait]
impl WorkerRuntime for ProcessRuntime {
    async fn run(&self, image: &str, name: &str, env: &[(String, String)]) -> Result<WorkerHandle, RuntimeError> {
        info!(instance = name, image, "launching worker process");

        let mut cmd = Command::new(image);
        cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(RuntimeError::Launch)?;
        Ok(WorkerHandle::new(name.to_string(), child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_runtime_launches_and_stops() {
        let runtime = ProcessRuntime;
        let handle = runtime
            .run("sleep", "test_0", &[("NOVELVMP_SCANNER_PORT".to_string(), "30001".to_string())])
            .await;
        // `sleep` with no args exits immediately on most systems; either
        // outcome (launch succeeds then stop_and_remove no-ops on an
        // already-exited child, or launch fails because the binary takes no
        // bare invocation) is acceptable — this only asserts the happy path
        // doesn't panic.
        if let Ok(handle) = handle {
            assert!(handle.stop_and_remove().await.is_ok());
        }
    }
}
