//! Joins (IP, port, domain) sightings into synthesized `host` artifacts.
//!
//! Grounded on
//! `examples/original_source/orchestrator/internal/scheduler/artifact_derivations.go`.
//! Subscribes to `{host, domain, ip}` (spec.md §4.8 — the original's
//! `DeriveDomainHostFromIPHost` subscribes explicitly only to `host`/`domain`
//! in its constructor, handling `ip` as an implicit no-op elsewhere; spec.md
//! is authoritative here and the subscription covers all three). Owns its
//! tables exclusively (spec.md §5); runs as its own task, draining the bus
//! in a tight inner loop then sleeping ~100ms, mirroring the original's
//! `time.Sleep(100 * time.Millisecond)` tick.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::artifact::{Artifact, ArtifactKind, Location};
use crate::dns_cache::DnsCache;
use crate::events::EventBus;

const TICK: Duration = Duration::from_millis(100);

struct Tables {
    /// IP -> observed ports.
    ports: HashMap<String, HashSet<u16>>,
    /// IP -> observed domains.
    domains: HashMap<String, HashSet<String>>,
    /// Already-emitted `host` values, guaranteeing at-most-once emission.
    emitted: HashSet<String>,
}

impl Tables {
    fn new() -> Self {
        Self {
            ports: HashMap::new(),
            domains: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    fn ensure_ip(&mut self, ip: &str) {
        self.ports.entry(ip.to_string()).or_default();
        self.domains.entry(ip.to_string()).or_default();
    }

    fn add_port(&mut self, ip: &str, port: u16) {
        self.ensure_ip(ip);
        self.ports.get_mut(ip).unwrap().insert(port);
    }

    fn add_domain(&mut self, ip: &str, domain: &str) {
        self.ensure_ip(ip);
        self.domains.get_mut(ip).unwrap().insert(domain.to_string());
    }
}

/// Runs the artifact deriver to completion of its input channel. Intended to
/// be spawned on its own task by the scheduler at startup.
pub async fn run(mut input: mpsc::Receiver<Artifact>, bus: Arc<EventBus<Artifact>>, dns: Arc<DnsCache>) {
    let mut tables = Tables::new();

    loop {
        let mut drained_any = false;
        loop {
            match input.try_recv() {
                Ok(artifact) => {
                    drained_any = true;
                    handle(&mut tables, &bus, &dns, artifact).await;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return,
            }
        }

        if !drained_any {
            tokio::time::sleep(TICK).await;
        }
    }
}

async fn handle(tables: &mut Tables, bus: &EventBus<Artifact>, dns: &DnsCache, artifact: Artifact) {
    match artifact.kind {
        ArtifactKind::Host => {
            if let Some((host, port)) = artifact.host_parts() {
                let ip = resolve_to_ip(dns, host).await;
                if let Some(ip) = ip {
                    if host != ip {
                        tables.add_domain(&ip, host);
                    }
                    tables.add_port(&ip, port);
                    tables.emitted.insert(artifact.value.clone());
                    cross_join(tables, bus, &ip);
                }
            }
        }
        ArtifactKind::Domain => {
            if let Some(ip) = resolve_to_ip(dns, &artifact.value).await {
                tables.add_domain(&ip, &artifact.value);
                cross_join(tables, bus, &ip);
            }
        }
        ArtifactKind::Ip => {
            tables.ensure_ip(&artifact.value);
            cross_join(tables, bus, &artifact.value);
        }
        _ => {}
    }
}

/// A host string is either already a literal IP, or a domain to resolve via
/// the DNS cache. Resolution failures yield `None`, silently dropping the
/// observation (spec.md §7's "expected runtime misses").
async fn resolve_to_ip(dns: &DnsCache, host: &str) -> Option<String> {
    if host.parse::<std::net::Ipv4Addr>().is_ok() {
        return Some(host.to_string());
    }
    dns.lookup(host).await.ok().map(|ip| ip.to_string())
}

/// Cross-joins `ip`'s known domains x known ports, publishing a `host`
/// artifact for every pair not already emitted.
fn cross_join(tables: &mut Tables, bus: &EventBus<Artifact>, ip: &str) {
    let domains: Vec<String> = tables
        .domains
        .get(ip)
        .map(|s| s.iter().cloned().collect())
        .unwrap_or_default();
    let ports: Vec<u16> = tables
        .ports
        .get(ip)
        .map(|s| s.iter().copied().collect())
        .unwrap_or_default();

    for domain in &domains {
        for port in &ports {
            let value = format!("{domain}:{port}");
            if tables.emitted.insert(value.clone()) {
                let artifact = Artifact::new(
                    ArtifactKind::Host,
                    value,
                    "Domain:Port derived from IP:Port",
                )
                .with_location(Location {
                    ip: Some(ip.to_string()),
                    url: None,
                });
                bus.publish("host", artifact);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn derives_host_from_ip_host_and_domain_sightings() {
        let bus = Arc::new(EventBus::<Artifact>::new());
        let dns = Arc::new(DnsCache::load(
            std::env::temp_dir().join("novelvmp-deriver-test-dns.json"),
        ));
        dns.insert("svc", "10.0.0.1".parse().unwrap());

        let (tx, rx) = mpsc::channel(16);
        let mut derived = bus.subscribe(&["host"]);

        let handle = tokio::spawn(run(rx, bus.clone(), dns));

        // Scenario 4 from the spec: ip, host:port, and a domain resolving to
        // that ip together derive exactly one `host` artifact.
        tx.send(Artifact::new(ArtifactKind::Ip, "10.0.0.1", "scope"))
            .await
            .unwrap();
        tx.send(Artifact::new(ArtifactKind::Host, "10.0.0.1:80", "scanner"))
            .await
            .unwrap();
        tx.send(Artifact::new(ArtifactKind::Domain, "svc", "scanner"))
            .await
            .unwrap();

        let got = tokio::time::timeout(Duration::from_millis(500), derived.recv())
            .await
            .expect("a host artifact should have been derived")
            .unwrap();
        assert_eq!(got.value, "svc:80");
        assert_eq!(got.location.ip.as_deref(), Some("10.0.0.1"));

        let second = tokio::time::timeout(Duration::from_millis(300), derived.recv()).await;
        assert!(second.is_err(), "svc:80 must be emitted at most once");

        drop(tx);
        handle.abort();
    }

    #[test]
    fn cross_join_emits_each_pair_at_most_once() {
        let bus = EventBus::<Artifact>::new();
        let mut tables = Tables::new();
        tables.add_domain("10.0.0.1", "svc.internal");
        tables.add_port("10.0.0.1", 80);

        let mut rx = bus.subscribe(&["host"]);
        cross_join(&mut tables, &bus, "10.0.0.1");
        cross_join(&mut tables, &bus, "10.0.0.1");

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second cross_join must not re-emit");
    }
}
