//! Process-wide (but explicitly-owned, not global) rate limiter.
//!
//! Grounded on
//! `examples/original_source/orchestrator/internal/rate_limiter/rate_limiter.go`.
//! Per spec.md §9's "process-wide singletons" redesign flag, this is an
//! explicit `RateLimiter` object constructed once (typically held behind an
//! `Arc` by the scheduler) and passed to every template/instance that needs
//! it, rather than the original's `sync.Once`-backed package-level
//! singleton. Its single-mutex locking semantics are preserved exactly.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::warn;

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::RateLimitMode;

struct Inner {
    domains_in_use: HashSet<String>,
    ips_in_use: HashSet<String>,
    vservers_in_use: HashSet<String>,
    /// domain-pattern (suffix stripped of its `*.` prefix) -> virtual server name.
    vserver_mapping: HashMap<String, String>,
}

/// Which key (if any) a successful acquisition reserved, so the matching
/// release can free exactly that key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Domain(String),
    Ip(String),
    None,
}

pub struct RateLimiter {
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(vserver_mapping: HashMap<String, String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                domains_in_use: HashSet::new(),
                ips_in_use: HashSet::new(),
                vservers_in_use: HashSet::new(),
                vserver_mapping,
            }),
        }
    }

    /// Linear scan of the configured mapping: exact match is preferred;
    /// `*.suffix` entries match any domain *containing* `suffix` as a
    /// substring. This is the original's literal (not a true suffix match)
    /// behavior — spec.md §9 explicitly flags it as a bug-shaped pattern to
    /// leave alone pending confirmation, so it is reproduced verbatim here
    /// rather than "fixed" to a proper label-boundary suffix match.
    fn vserver_for_domain(&self, inner: &Inner, domain: &str) -> Option<String> {
        if let Some(v) = inner.vserver_mapping.get(domain) {
            return Some(v.clone());
        }
        for (pattern, vserver) in &inner.vserver_mapping {
            if domain.contains(pattern.as_str()) {
                return Some(vserver.clone());
            }
        }
        None
    }

    /// Succeeds iff `domain` is not in-use and its virtual server (if any)
    /// is not in-use either. On success, marks both.
    pub fn try_acquire_domain(&self, domain: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.domains_in_use.contains(domain) {
            return false;
        }
        let vserver = self.vserver_for_domain(&inner, domain);
        if let Some(v) = &vserver {
            if inner.vservers_in_use.contains(v) {
                return false;
            }
        }

        inner.domains_in_use.insert(domain.to_string());
        if let Some(v) = vserver {
            inner.vservers_in_use.insert(v);
        }
        true
    }

    /// Succeeds iff `ip` is not already in-use.
    pub fn try_acquire_ip(&self, ip: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.ips_in_use.contains(ip) {
            return false;
        }
        inner.ips_in_use.insert(ip.to_string());
        true
    }

    /// Idempotent-with-warning: releasing a domain that isn't in-use logs a
    /// warning rather than panicking (matching the original's behavior,
    /// distinct from `setVserverInUse`'s panic-on-double-set).
    pub fn release_domain(&self, domain: &str) {
        let mut inner = self.inner.lock();
        if !inner.domains_in_use.remove(domain) {
            warn!(domain, "releasing domain that was not in use");
            return;
        }
        if let Some(v) = self.vserver_for_domain(&inner, domain) {
            inner.vservers_in_use.remove(&v);
        }
    }

    pub fn release_ip(&self, ip: &str) {
        let mut inner = self.inner.lock();
        if !inner.ips_in_use.remove(ip) {
            warn!(ip, "releasing ip that was not in use");
        }
    }

    /// Whether `artifact` participates in rate limiting at all: only
    /// `domain`, `ip`, `host`, and `technology` kinds do.
    pub fn is_rate_limited_artifact(artifact: &Artifact) -> bool {
        matches!(
            artifact.kind,
            ArtifactKind::Domain | ArtifactKind::Ip | ArtifactKind::Host | ArtifactKind::Technology
        )
    }

    /// Attempts to acquire whichever key `artifact` is rate-limited on:
    /// domain-preferred, falling back to IP. Returns the allocation made (or
    /// `Allocation::None` if the artifact carries neither, or acquisition
    /// failed).
    pub fn try_acquire(&self, artifact: &Artifact, mode: RateLimitMode) -> Option<Allocation> {
        if mode == RateLimitMode::Disabled {
            return Some(Allocation::None);
        }

        let domain = artifact.domain();
        let ip = artifact.ip();

        match mode {
            RateLimitMode::Disabled => unreachable!(),
            RateLimitMode::PerDomain => {
                if !domain.is_empty() {
                    return self
                        .try_acquire_domain(&domain)
                        .then(|| Allocation::Domain(domain));
                }
                ip.map(|ip| self.try_acquire_ip(&ip).then(|| Allocation::Ip(ip)))
                    .flatten()
            }
            RateLimitMode::PerIp => {
                if let Some(ip) = ip {
                    return self.try_acquire_ip(&ip).then(|| Allocation::Ip(ip));
                }
                None
            }
        }
    }

    /// Releases whichever key (domain-preferred, else IP) `artifact` holds.
    /// Mirrors `FreeRateLimitAllocation`: only rate-limitable kinds
    /// participate; everything else is a no-op.
    pub fn free_allocation(&self, artifact: &Artifact) {
        if !Self::is_rate_limited_artifact(artifact) {
            return;
        }

        let domain = artifact.domain();
        if !domain.is_empty() {
            self.release_domain(&domain);
            return;
        }

        if let Some(ip) = artifact.ip() {
            self.release_ip(&ip);
            return;
        }

        warn!(value = %artifact.value, "artifact has neither domain nor ip to release");
    }

    /// Snapshot used by the scheduler's periodic status line (spec.md §4.11
    /// step 5).
    pub fn status(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        (
            inner.domains_in_use.len(),
            inner.ips_in_use.len(),
            inner.vservers_in_use.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        let mut mapping = HashMap::new();
        mapping.insert("shared".to_string(), "vs1".to_string());
        RateLimiter::new(mapping)
    }

    #[test]
    fn domain_acquire_release_roundtrip() {
        let rl = limiter();
        assert!(rl.try_acquire_domain("a.com"));
        assert!(!rl.try_acquire_domain("a.com"));
        rl.release_domain("a.com");
        assert!(rl.try_acquire_domain("a.com"));
    }

    #[test]
    fn vserver_wildcard_blocks_sibling_domain() {
        let rl = limiter();
        assert!(rl.try_acquire_domain("one.shared.example"));
        assert!(!rl.try_acquire_domain("two.shared.example"));
        rl.release_domain("one.shared.example");
        assert!(rl.try_acquire_domain("two.shared.example"));
    }

    #[test]
    fn release_not_in_use_does_not_panic() {
        let rl = limiter();
        rl.release_domain("never-acquired.com");
        rl.release_ip("10.0.0.1");
    }

    #[test]
    fn free_allocation_prefers_domain_over_ip() {
        let rl = limiter();
        let mut a = Artifact::new(ArtifactKind::Host, "a.com:80", "scanner");
        a.location.ip = Some("10.0.0.1".to_string());
        assert!(rl.try_acquire_domain("a.com"));
        assert!(rl.try_acquire_ip("10.0.0.1"));

        rl.free_allocation(&a);

        assert!(rl.try_acquire_domain("a.com"));
        assert!(!rl.try_acquire_ip("10.0.0.1"));
    }

    #[test]
    fn finding_is_never_rate_limited() {
        let a = Artifact::new(ArtifactKind::Finding, "x", "scanner");
        assert!(!RateLimiter::is_rate_limited_artifact(&a));
    }
}
