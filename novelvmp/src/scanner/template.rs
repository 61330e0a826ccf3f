//! A scanner template: one scanner type's config, its rate-limited input
//! queue, and the pool of worker instances fed from it.
//!
//! Grounded on
//! `examples/original_source/orchestrator/internal/scheduler/scanner_template.go`.
//! The template owns its queue and instance pool exclusively (spec.md §5);
//! the scheduler drives `publish_collect_scanner_work` on a tick and routes
//! control messages to `handle_instance_msg`, mirroring the original's
//! `PublishCollectScannerWork`/`HandleScannerInstanceMsg` pair.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::artifact::Artifact;
use crate::config::ScannerConfig;
use crate::protocol::ScannerInstanceControlMsg;
use crate::queue::RateLimitedQueue;
use crate::rate_limiter::RateLimiter;
use crate::worker_runtime::WorkerRuntime;

use super::instance::{self, InstanceHandle, RunContext, ScannerInstance};

/// Bound on a single instance's control-message mailbox (spec.md §4.9).
const CONTROL_BUFFER: usize = 100;

pub struct ScannerTemplate {
    pub name: String,
    config: ScannerConfig,
    queue: RateLimitedQueue,
    instances: Vec<InstanceHandle>,
    instance_inputs: HashMap<usize, mpsc::Sender<Artifact>>,
    instance_tasks: Vec<JoinHandle<()>>,
    limiter: Arc<RateLimiter>,
    runtime: Arc<dyn WorkerRuntime>,
    master_host: String,
    max_requests: i64,
    credential_value: String,
}

impl ScannerTemplate {
    pub fn new(
        name: String,
        config: ScannerConfig,
        limiter: Arc<RateLimiter>,
        runtime: Arc<dyn WorkerRuntime>,
        master_host: String,
        max_requests: i64,
        credential_value: String,
    ) -> Self {
        let mode = config.rate_limit_type;
        Self {
            name,
            config,
            queue: RateLimitedQueue::new(mode),
            instances: Vec::new(),
            instance_inputs: HashMap::new(),
            instance_tasks: Vec::new(),
            limiter,
            runtime,
            master_host,
            max_requests,
            credential_value,
        }
    }

    /// The artifact kinds this template subscribes to, per its
    /// `config.yaml`'s `inputs` list.
    pub fn subscribed_kinds(&self) -> &[String] {
        &self.config.inputs
    }

    /// Enqueues an artifact this template has been handed (already filtered
    /// to scope and to its declared `inputs` by the scheduler).
    pub fn enqueue(&mut self, artifact: Artifact) {
        self.queue.add(artifact);
    }

    /// Spawns `self.config.instances` worker instances, naming each
    /// `<template>_<index>` per spec.md §4.9, wiring a bounded control
    /// channel and an unbounded per-instance artifact channel for each.
    pub fn spawn_instances(&mut self) {
        for _ in 0..self.config.instances {
            self.add_scanner();
        }
    }

    fn add_scanner(&mut self) {
        let idx = self.instances.len();
        let name = format!("{}_{idx}", self.name);
        let instance = Arc::new(ScannerInstance::new(name.clone(), self.name.clone(), self.config.image.clone()));

        let (ctrl_tx, ctrl_rx) = mpsc::channel(CONTROL_BUFFER);
        let (input_tx, input_rx) = mpsc::channel::<Artifact>(1);

        let ctx = RunContext {
            master_host: self.master_host.clone(),
            max_requests: self.max_requests,
            credential_value: self.credential_value.clone(),
            rate_limiter: self.limiter.clone(),
        };

        let task = tokio::spawn(instance::run(instance.clone(), self.runtime.clone(), ctrl_rx, input_rx, ctx));
        self.instance_tasks.push(task);

        self.instances.push(InstanceHandle { instance, ctrl_tx });
        self.instance_inputs.insert(idx, input_tx);
    }

    /// Whether this template should receive artifacts outside the global
    /// scope, per its `config.yaml`'s `ignore_scope` flag.
    pub fn ignores_scope(&self) -> bool {
        self.config.ignore_scope
    }

    /// Whether this template still has work outstanding: a non-empty queue,
    /// a busy instance, or (per spec.md §4.9's third disjunct) a non-empty
    /// subscription backlog. Subscriptions live on the scheduler, not the
    /// template (`scheduler.rs`'s `subscriptions`/`drain_subscriptions`), so
    /// the caller passes in whether this template's bus subscription still
    /// holds undrained events.
    pub fn is_busy(&self, subscription_pending: bool) -> bool {
        subscription_pending || self.instances.iter().any(|h| h.instance.is_busy()) || !self.queue.is_empty()
    }

    /// Periodic per-template status line (spec.md §4.11 step 5), mirroring
    /// the original's `PrintStatus`.
    pub fn log_status(&self) {
        let busy_instances = self.instances.iter().filter(|h| h.instance.is_busy()).count();
        info!(
            template = %self.name,
            queue_len = self.queue.len(),
            instances = self.instances.len(),
            busy_instances,
            "scanner template status"
        );
    }

    /// One scheduling tick: hands queued artifacts to idle instances until
    /// either the queue runs dry or every instance is busy. Mirrors the
    /// original's loop-until-no-progress shape exactly (spec.md §4.9).
    pub async fn publish_collect_scanner_work(&mut self) -> bool {
        let mut did_work = false;
        loop {
            let Some(idx) = self.next_idle_instance() else {
                return did_work;
            };

            let Some(artifact) = self.queue.pop(&self.limiter) else {
                return did_work;
            };

            let tx = self.instance_inputs.get(&idx).expect("instance index out of sync");
            if let Err(send_err) = tx.try_send(artifact) {
                let returned = match send_err {
                    mpsc::error::TrySendError::Full(a) | mpsc::error::TrySendError::Closed(a) => a,
                };
                self.queue.reverse_pop(&self.limiter, returned, crate::rate_limiter::Allocation::None);
                return did_work;
            }
            did_work = true;
        }
    }

    fn next_idle_instance(&self) -> Option<usize> {
        self.instances
            .iter()
            .position(|h| !h.instance.is_busy())
    }

    /// Routes an incoming control message to the addressed instance. An
    /// unknown instance name is a fatal programming-invariant error
    /// (spec.md §7).
    pub async fn handle_instance_msg(&self, msg: ScannerInstanceControlMsg) {
        let handle = self
            .instances
            .iter()
            .find(|h| h.instance.name == msg.scanner_instance)
            .unwrap_or_else(|| panic!("template {} received control message for unknown instance {}", self.name, msg.scanner_instance));

        if let Err(e) = handle.ctrl_tx.send(msg).await {
            error!(template = %self.name, error = %e, "failed to deliver control message, instance task must have exited");
        }
    }

    /// Drops every instance's input sender, which unblocks each instance
    /// task's `recv` loop and lets it tear down its worker process, then
    /// waits for every instance task to actually finish (spec.md §4.9).
    pub async fn close(&mut self) {
        info!(template = %self.name, "closing scanner template");
        self.instance_inputs.clear();
        for task in self.instance_tasks.drain(..) {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::config::RateLimitMode;
    use crate::worker_runtime::ProcessRuntime;

    fn config() -> ScannerConfig {
        ScannerConfig {
            inputs: vec!["domain".to_string()],
            outputs: vec!["host".to_string()],
            rate_limit_type: RateLimitMode::Disabled,
            instances: 2,
            ignore_scope: false,
            needs_key: String::new(),
            image: "test-image".to_string(),
        }
    }

    fn template() -> ScannerTemplate {
        ScannerTemplate::new(
            "tmpl".to_string(),
            config(),
            Arc::new(RateLimiter::new(HashMap::new())),
            Arc::new(ProcessRuntime),
            "localhost:1323".to_string(),
            -1,
            String::new(),
        )
    }

    #[test]
    fn starts_idle_with_empty_queue() {
        let t = template();
        assert!(!t.is_busy(false));
    }

    #[test]
    fn nonempty_queue_counts_as_busy_even_with_no_instances() {
        let mut t = template();
        t.enqueue(Artifact::new(ArtifactKind::Domain, "a.com", "scanner"));
        assert!(t.is_busy(false));
    }

    #[test]
    fn pending_subscription_backlog_counts_as_busy() {
        let t = template();
        assert!(t.is_busy(true));
    }

    #[test]
    fn subscribed_kinds_reflects_config_inputs() {
        let t = template();
        assert_eq!(t.subscribed_kinds(), &["domain".to_string()]);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut t = template();
        t.close().await;
        t.close().await;
    }
}
