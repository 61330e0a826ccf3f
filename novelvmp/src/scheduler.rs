//! Top-level scheduling loop.
//!
//! Grounded on `examples/original_source/orchestrator/internal/scheduler/scheduler.go`'s
//! `Run`/`IsBusy`: each iteration pumps every template's queue against its
//! idle instances, drains every currently-pending artifact and control
//! message, and routes bus traffic into template queues (scope-gated unless
//! a template opts out). If none of that did anything, busyness falls back
//! to "is the bus non-empty or any template still busy" — and if that is
//! also false the pipeline has quiesced: flush results, close every
//! template, and return (spec.md §4.11). `shutdown` is not the normal
//! termination path; it only forces an early exit (e.g. ctrl-c).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::ScannerConfig;
use crate::dns_cache::DnsCache;
use crate::events::EventBus;
use crate::protocol::{ArtifactNamed, ScannerInstanceControlMsg};
use crate::rate_limiter::RateLimiter;
use crate::results::ResultsSink;
use crate::scanner::ScannerTemplate;
use crate::scope::Scope;
use crate::storage::Storage;
use crate::worker_runtime::WorkerRuntime;

/// Sleep between iterations that did work but have nothing left queued up
/// (mirrors the original's flat 100ms tick).
const IDLE_SLEEP: Duration = Duration::from_millis(100);
/// Status line cadence, in iterations (spec.md §4.11 step 5).
const STATUS_EVERY: u64 = 10_000;

pub struct Scheduler {
    templates: HashMap<String, ScannerTemplate>,
    subscriptions: Vec<(String, mpsc::Receiver<Artifact>)>,
    storage: Storage,
    bus: Arc<EventBus<Artifact>>,
    scope: Scope,
    dns: Arc<DnsCache>,
    limiter: Arc<RateLimiter>,
    deriver_tx: mpsc::Sender<Artifact>,
}

impl Scheduler {
    pub fn new(
        scope: Scope,
        dns: Arc<DnsCache>,
        bus: Arc<EventBus<Artifact>>,
        limiter: Arc<RateLimiter>,
        deriver_tx: mpsc::Sender<Artifact>,
    ) -> Self {
        Self {
            templates: HashMap::new(),
            subscriptions: Vec::new(),
            storage: Storage::new(bus.clone()),
            bus,
            scope,
            dns,
            limiter,
            deriver_tx,
        }
    }

    /// Registers a scanner template: subscribes it to its declared input
    /// kinds on the bus and, unless `spawn_instances` is false (the
    /// `--scanner-test` CLI mode, which never starts a worker pool),
    /// spawns its configured worker instances.
    #[allow(clippy::too_many_arguments)]
    pub fn add_template(
        &mut self,
        name: String,
        config: ScannerConfig,
        runtime: Arc<dyn WorkerRuntime>,
        master_host: String,
        max_requests: i64,
        credential_value: String,
        spawn_instances: bool,
    ) {
        let mut template = ScannerTemplate::new(
            name.clone(),
            config,
            self.limiter.clone(),
            runtime,
            master_host,
            max_requests,
            credential_value,
        );
        let rx = self.bus.subscribe(template.subscribed_kinds());
        if spawn_instances {
            template.spawn_instances();
        }
        self.templates.insert(name.clone(), template);
        self.subscriptions.push((name, rx));
    }

    /// Publishes every in-scope ip/domain from the static scope config,
    /// treating the configured scope as the first batch of input.
    pub async fn seed_from_scope(&mut self) {
        let ips: Vec<_> = self.scope.iterate_ips().map(|ip| ip.to_string()).collect();
        let domains: Vec<_> = self.scope.iterate_domains().map(str::to_string).collect();

        for ip in ips {
            self.ingest(Artifact::new(ArtifactKind::Ip, ip, "scope")).await;
        }
        for domain in domains {
            self.ingest(Artifact::new(ArtifactKind::Domain, domain, "scope")).await;
        }
    }

    /// Runs until the pipeline quiesces (no template busy, no bus traffic,
    /// nothing pending), then flushes storage to `results` and closes every
    /// template before returning (spec.md §4.11 step 7). `shutdown` can
    /// force an earlier exit, taking the same teardown path.
    pub async fn run(
        mut self,
        mut artifact_rx: mpsc::Receiver<ArtifactNamed>,
        mut control_rx: mpsc::Receiver<ScannerInstanceControlMsg>,
        results: Arc<dyn ResultsSink>,
        shutdown: CancellationToken,
    ) {
        let mut iteration: u64 = 0;

        loop {
            if shutdown.is_cancelled() {
                info!("shutdown requested, tearing down");
                break;
            }

            let mut busy = false;
            let mut should_sleep = true;

            // Step 1: pump every template's queue against its idle instances.
            for template in self.templates.values_mut() {
                if template.publish_collect_scanner_work().await {
                    busy = true;
                }
            }

            // Step 2: drain every currently-pending newly-submitted artifact.
            let mut drained_artifact = false;
            while let Ok(named) = artifact_rx.try_recv() {
                drained_artifact = true;
                self.ingest(named.artifact).await;
            }
            if drained_artifact {
                busy = true;
                should_sleep = false;
            }

            // Step 3: drain every currently-pending control message.
            let mut drained_control = false;
            while let Ok(msg) = control_rx.try_recv() {
                drained_control = true;
                self.route_control(msg).await;
            }
            if drained_control {
                busy = true;
                should_sleep = false;
            }

            // Route bus traffic (freshly-stored artifacts, deriver output)
            // into each subscribed template's queue, scope-gated unless the
            // template opts out.
            if self.drain_subscriptions().await {
                busy = true;
                should_sleep = false;
            }

            // Step 4: if nothing above found work, fall back to whether the
            // bus still holds in-flight deliveries or any template instance
            // is still mid-task, including each template's own subscription
            // backlog (spec.md §4.9's "subscription buffer non-empty" disjunct,
            // which lives here rather than on the template since the
            // subscription itself is owned by the scheduler).
            if !busy {
                let backlog = self.subscription_backlog();
                busy = self.bus.events_in_bus()
                    || self
                        .templates
                        .iter()
                        .any(|(name, t)| t.is_busy(backlog.get(name).copied().unwrap_or(0) > 0));
            }

            // Step 5: periodic status line, one per template plus the
            // rate-limiter (spec.md §4.11 step 5).
            iteration += 1;
            if iteration % STATUS_EVERY == 0 {
                let (domains, ips, vservers) = self.limiter.status();
                info!(
                    artifacts = self.storage.len(),
                    domains_in_use = domains,
                    ips_in_use = ips,
                    vservers_in_use = vservers,
                    "scheduler status"
                );
                for template in self.templates.values() {
                    template.log_status();
                }
            }

            if busy {
                if should_sleep {
                    tokio::time::sleep(IDLE_SLEEP).await;
                }
            } else {
                info!("pipeline quiesced, finishing");
                break;
            }
        }

        // Step 7: final flush, close every template, exit.
        if let Err(e) = results.write_all(self.storage.artifacts()).await {
            error!(error = %e, "failed to flush results on shutdown");
        }
        for template in self.templates.values_mut() {
            template.close().await;
        }
    }

    /// Forwards `artifact` to the deriver and records it in storage,
    /// publishing to the bus on first sight of its (kind, value).
    async fn ingest(&mut self, artifact: Artifact) {
        let _ = self.deriver_tx.try_send(artifact.clone());
        if let Err(e) = self.storage.add_artifact(artifact) {
            warn!(error = %e, "dropping artifact with no dedup rule");
        }
    }

    /// Number of undrained events currently queued in each template's bus
    /// subscription, keyed by template name. Used for the quiescence
    /// fallback's "subscription buffer non-empty" disjunct.
    fn subscription_backlog(&self) -> HashMap<String, usize> {
        self.subscriptions
            .iter()
            .map(|(name, rx)| (name.clone(), rx.len()))
            .collect()
    }

    async fn drain_subscriptions(&mut self) -> bool {
        let mut did_work = false;
        for (name, rx) in &mut self.subscriptions {
            while let Ok(artifact) = rx.try_recv() {
                did_work = true;
                let ignores_scope = self
                    .templates
                    .get(name)
                    .map(|t| t.ignores_scope())
                    .unwrap_or(false);

                let in_scope = ignores_scope || self.scope.is_artifact_in_scope(&artifact, &self.dns).await;
                if in_scope {
                    if let Some(template) = self.templates.get_mut(name) {
                        template.enqueue(artifact);
                    }
                }
            }
        }
        did_work
    }

    /// Routes a control message to its addressed template. An unknown
    /// template name is a fatal programming-invariant error (spec.md §7).
    async fn route_control(&self, msg: ScannerInstanceControlMsg) {
        match self.templates.get(&msg.scanner_template) {
            Some(template) => template.handle_instance_msg(msg).await,
            None => panic!("control message for unknown scanner template {}", msg.scanner_template),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (Scheduler, mpsc::Receiver<Artifact>) {
        let bus = Arc::new(EventBus::new());
        let (deriver_tx, deriver_rx) = mpsc::channel(16);
        let dns = Arc::new(DnsCache::load(std::env::temp_dir().join("novelvmp-scheduler-test-dns.json")));
        let scope = Scope::new(vec![], vec![], vec![], vec![]);
        let limiter = Arc::new(RateLimiter::new(HashMap::new()));
        (Scheduler::new(scope, dns, bus, limiter, deriver_tx), deriver_rx)
    }

    #[tokio::test]
    async fn seeding_empty_scope_derives_nothing() {
        let (mut scheduler, _deriver_rx) = scheduler();
        scheduler.seed_from_scope().await;
        assert!(scheduler.storage.is_empty());
    }

    #[tokio::test]
    async fn ingest_forwards_to_deriver_and_storage() {
        let (mut scheduler, mut deriver_rx) = scheduler();
        scheduler
            .ingest(Artifact::new(ArtifactKind::Ip, "10.0.0.1", "scope"))
            .await;

        assert_eq!(scheduler.storage.len(), 1);
        let forwarded = deriver_rx.try_recv().unwrap();
        assert_eq!(forwarded.value, "10.0.0.1");
    }

    #[tokio::test]
    async fn unknown_template_control_message_panics() {
        let (scheduler, _deriver_rx) = scheduler();
        let msg = ScannerInstanceControlMsg {
            scanner_template: "ghost".to_string(),
            scanner_instance: "ghost_0".to_string(),
            scanner_msg: crate::protocol::ScannerMsgKind::Register,
        };

        let result = tokio::spawn(async move { scheduler.route_control(msg).await }).await;
        assert!(result.is_err());
    }
}
