//! Per-template rate-limited artifact queue.
//!
//! Grounded on
//! `examples/original_source/orchestrator/internal/rate_limiter/rate_limited_artifact_queue.go`.
//! Owned exclusively by one [`crate::scanner::template::ScannerTemplate`]
//! task (per spec.md §5), so a plain `VecDeque` needs no internal locking.

use std::collections::VecDeque;

use tracing::warn;

use crate::artifact::Artifact;
use crate::config::RateLimitMode;
use crate::rate_limiter::{Allocation, RateLimiter};

/// An artifact waiting in a template's queue, remembering which allocation
/// (if any) it holds after a successful `pop`, so `reverse_pop` can release
/// exactly that allocation.
struct Entry {
    artifact: Artifact,
    allocation: Allocation,
}

/// FIFO of pending inputs for one scanner template, modulo rate-limit
/// skipping.
pub struct RateLimitedQueue {
    entries: VecDeque<Entry>,
    mode: RateLimitMode,
}

impl RateLimitedQueue {
    pub fn new(mode: RateLimitMode) -> Self {
        Self {
            entries: VecDeque::new(),
            mode,
        }
    }

    pub fn add(&mut self, artifact: Artifact) {
        self.entries.push_back(Entry {
            artifact,
            allocation: Allocation::None,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attempts to admit the next artifact.
    ///
    /// - `disabled`: always removes and returns the head.
    /// - `per_domain`/`per_ip`: scans head-to-tail for the first element
    ///   whose rate-limit key can be acquired. An element with neither a
    ///   domain nor an IP is also removed (with a warning) rather than left
    ///   to wedge the queue forever.
    ///
    /// Returns `None` if the queue is empty or nothing can be admitted
    /// right now.
    pub fn pop(&mut self, limiter: &RateLimiter) -> Option<Artifact> {
        if self.mode == RateLimitMode::Disabled {
            return self.entries.pop_front().map(|e| e.artifact);
        }

        let mut idx = 0;
        while idx < self.entries.len() {
            let artifact = &self.entries[idx].artifact;

            let domain = artifact.domain();
            let ip = artifact.ip();

            if domain.is_empty() && ip.is_none() {
                warn!(
                    value = %artifact.value,
                    "dropping queued artifact with neither domain nor ip to avoid wedging the queue"
                );
                self.entries.remove(idx);
                continue;
            }

            if let Some(allocation) = limiter.try_acquire(artifact, self.mode) {
                let mut entry = self.entries.remove(idx).expect("index just checked");
                entry.allocation = allocation;
                return Some(entry.artifact);
            }

            idx += 1;
        }

        None
    }

    /// Undoes a successful `pop`: releases the allocation it made and
    /// pushes the artifact back to the head, preserving FIFO order for the
    /// case where no worker was ready to receive it.
    pub fn reverse_pop(&mut self, limiter: &RateLimiter, artifact: Artifact, allocation: Allocation) {
        match &allocation {
            Allocation::Domain(d) => limiter.release_domain(d),
            Allocation::Ip(ip) => limiter.release_ip(ip),
            Allocation::None => {}
        }
        self.entries.push_front(Entry {
            artifact,
            allocation: Allocation::None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use std::collections::HashMap;

    fn host(value: &str) -> Artifact {
        Artifact::new(ArtifactKind::Host, value, "scanner")
    }

    #[test]
    fn disabled_mode_is_plain_fifo() {
        let limiter = RateLimiter::new(HashMap::new());
        let mut q = RateLimitedQueue::new(RateLimitMode::Disabled);
        q.add(host("a.com:80"));
        q.add(host("b.com:80"));

        assert_eq!(q.pop(&limiter).unwrap().value, "a.com:80");
        assert_eq!(q.pop(&limiter).unwrap().value, "b.com:80");
        assert!(q.pop(&limiter).is_none());
    }

    #[test]
    fn per_domain_mode_skips_busy_domain() {
        let limiter = RateLimiter::new(HashMap::new());
        let mut q = RateLimitedQueue::new(RateLimitMode::PerDomain);
        q.add(host("dom1:80")); // A
        q.add(host("dom1:81")); // B, same domain
        q.add(host("dom2:80")); // C

        let a = q.pop(&limiter).unwrap();
        assert_eq!(a.value, "dom1:80");

        let c = q.pop(&limiter).unwrap();
        assert_eq!(c.value, "dom2:80");

        assert!(q.pop(&limiter).is_none());

        limiter.release_domain("dom1");
        let b = q.pop(&limiter).unwrap();
        assert_eq!(b.value, "dom1:81");
    }

    #[test]
    fn reverse_pop_restores_fifo_and_releases() {
        let limiter = RateLimiter::new(HashMap::new());
        let mut q = RateLimitedQueue::new(RateLimitMode::PerDomain);
        q.add(host("dom1:80"));
        q.add(host("dom2:80"));

        let a = q.pop(&limiter).unwrap();
        assert!(!limiter.try_acquire_domain("dom1"));

        q.reverse_pop(&limiter, a, Allocation::Domain("dom1".to_string()));
        assert!(limiter.try_acquire_domain("dom1"));
        limiter.release_domain("dom1");

        assert_eq!(q.pop(&limiter).unwrap().value, "dom1:80");
    }

    #[test]
    fn elements_with_no_domain_or_ip_are_dropped() {
        let limiter = RateLimiter::new(HashMap::new());
        let mut q = RateLimitedQueue::new(RateLimitMode::PerDomain);
        q.add(Artifact::new(ArtifactKind::Finding, "nothing-to-key-on", "scanner"));
        q.add(host("dom1:80"));

        let next = q.pop(&limiter).unwrap();
        assert_eq!(next.value, "dom1:80");
        assert!(q.is_empty(), "the un-keyable finding should have been dropped, not left stuck");
    }
}
