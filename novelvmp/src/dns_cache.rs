//! A domain→IP memoizer with a 7-day TTL and on-disk persistence.
//!
//! Grounded on `examples/original_source/orchestrator/internal/scheduler/dns_cache.go`.
//! The original persists via `encoding/gob` to `dns_cache.gob`; this crate uses
//! `serde_json` (gob has no Rust equivalent and the pack's closest repos all
//! reach for `serde_json` for this kind of ad-hoc on-disk map) and names the
//! file `dns_cache.json`, per spec.md §1 ("the DNS cache persistence format"
//! is explicitly out of scope — any readable format satisfies it).
//!
//! Per spec.md §9's "process-wide singletons" redesign flag, this is an
//! explicit object constructed once and passed around (typically inside an
//! `Arc`), not a `lazy_static`/`OnceLock` global like the original's
//! `GetDNSCache()`. Its locking semantics — one mutex serializing every
//! operation — are preserved exactly.

use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DnsCacheError;

const TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    ip: IpAddr,
    expires_at: SystemTime,
}

#[derive(Default, Serialize, Deserialize)]
struct OnDiskCache {
    entries: HashMap<String, CacheEntry>,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
}

/// Mutex-serialized domain→IP cache with TTL expiry and synchronous disk
/// persistence. Safe to share across tasks behind an `Arc`.
pub struct DnsCache {
    inner: Mutex<Inner>,
    path: PathBuf,
}

impl DnsCache {
    /// Loads an existing cache file at `path` if present, otherwise starts
    /// empty. Never fails: a corrupt or missing cache file just means a
    /// cold start.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<OnDiskCache>(&bytes).ok())
            .map(|d| d.entries)
            .unwrap_or_default();

        Self {
            inner: Mutex::new(Inner { entries }),
            path,
        }
    }

    /// Resolves `domain`, using the in-memory cache when the entry is
    /// present and unexpired. On a cache miss or expiry, resolves via the
    /// system resolver, caches the first returned address for 7 days, and
    /// persists the whole table to disk before returning.
    pub async fn lookup(&self, domain: &str) -> Result<IpAddr, DnsCacheError> {
        if let Some(ip) = self.cached(domain) {
            return Ok(ip);
        }

        let ip = Self::resolve_system(domain).await?;
        self.insert(domain, ip);
        self.persist()?;
        Ok(ip)
    }

    /// Checks the in-memory table only, evicting the entry if expired.
    /// Does not touch the resolver or disk.
    fn cached(&self, domain: &str) -> Option<IpAddr> {
        let mut inner = self.inner.lock();
        match inner.entries.get(domain) {
            Some(entry) if entry.expires_at > SystemTime::now() => Some(entry.ip),
            Some(_) => {
                inner.entries.remove(domain);
                None
            }
            None => None,
        }
    }

    pub(crate) fn insert(&self, domain: &str, ip: IpAddr) {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            domain.to_string(),
            CacheEntry {
                ip,
                expires_at: SystemTime::now() + TTL,
            },
        );
    }

    fn persist(&self) -> Result<(), DnsCacheError> {
        let snapshot = {
            let inner = self.inner.lock();
            OnDiskCache {
                entries: inner.entries.clone(),
            }
        };
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|e| DnsCacheError::Persist {
            path: self.path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        std::fs::write(&self.path, bytes).map_err(|e| DnsCacheError::Persist {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    /// Resolves via the OS resolver. `ToSocketAddrs` is blocking, so the
    /// lookup runs on a blocking-pool thread.
    async fn resolve_system(domain: &str) -> Result<IpAddr, DnsCacheError> {
        let owned = domain.to_string();
        let addrs = tokio::task::spawn_blocking(move || (owned.as_str(), 0u16).to_socket_addrs())
            .await
            .expect("blocking resolve task panicked")
            .map_err(|source| DnsCacheError::Resolve {
                domain: domain.to_string(),
                source,
            })?;

        addrs
            .map(|addr| addr.ip())
            .next()
            .ok_or_else(|| DnsCacheError::NoAddresses(domain.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn cache_hit_avoids_resolver() {
        let dir = std::env::temp_dir().join(format!("novelvmp-dns-test-{}", std::process::id()));
        let cache = DnsCache::load(&dir);
        cache.insert("cached.example", IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(
            cache.cached("cached.example"),
            Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)))
        );
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let dir = std::env::temp_dir().join(format!("novelvmp-dns-test2-{}", std::process::id()));
        let cache = DnsCache::load(&dir);
        {
            let mut inner = cache.inner.lock();
            inner.entries.insert(
                "stale.example".to_string(),
                CacheEntry {
                    ip: IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
                    expires_at: SystemTime::now() - Duration::from_secs(1),
                },
            );
        }
        assert_eq!(cache.cached("stale.example"), None);
        assert!(!cache.inner.lock().entries.contains_key("stale.example"));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!("novelvmp-dns-test3-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&dir);
        let cache = DnsCache::load(&dir);
        cache.insert("persisted.example", IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)));
        cache.persist().unwrap();

        let reloaded = DnsCache::load(&dir);
        assert_eq!(
            reloaded.cached("persisted.example"),
            Some(IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)))
        );
        let _ = std::fs::remove_file(&dir);
    }
}
