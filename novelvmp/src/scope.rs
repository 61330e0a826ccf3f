//! In/out-of-scope predicate over IP ranges and domain lists.
//!
//! Grounded on `examples/original_source/orchestrator/internal/scheduler/scope.go`.

use crate::artifact::Artifact;
use crate::dns_cache::DnsCache;
use crate::ip_range::IpRange;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Four lists: included/excluded IP ranges, included/excluded domains. An
/// empty inclusion list means "any" for that axis; exclusions are checked
/// first and always win.
#[derive(Debug, Clone)]
pub struct Scope {
    ips: Vec<IpRange>,
    excluded_ips: Vec<IpRange>,
    domains: Vec<String>,
    excluded_domains: Vec<String>,
}

impl Scope {
    pub fn new(
        ips: Vec<IpRange>,
        excluded_ips: Vec<IpRange>,
        domains: Vec<String>,
        excluded_domains: Vec<String>,
    ) -> Self {
        Self {
            ips,
            excluded_ips,
            domains,
            excluded_domains,
        }
    }

    /// Folds `domainlist.txt` entries into the domain scope whenever their
    /// DNS-resolved IP falls inside the IP scope, matching
    /// `NewScopeFromViperConfig`'s behavior exactly. Lookup failures are
    /// ignored (the domain is simply not added), not propagated.
    pub async fn augment_from_domainlist(&mut self, candidates: Vec<String>, dns: &DnsCache) {
        for domain in candidates {
            if let Ok(ip) = dns.lookup(&domain).await {
                if let std::net::IpAddr::V4(v4) = ip {
                    if self.is_ip_in_scope(v4) {
                        self.domains.push(domain);
                    }
                }
            }
        }
    }

    pub fn is_ip_in_scope(&self, ip: Ipv4Addr) -> bool {
        if self.excluded_ips.iter().any(|r| r.contains(ip)) {
            return false;
        }
        if self.ips.is_empty() {
            return true;
        }
        self.ips.iter().any(|r| r.contains(ip))
    }

    pub fn is_domain_in_scope(&self, domain: &str) -> bool {
        if self.excluded_domains.iter().any(|d| d == domain) {
            return false;
        }
        if self.domains.is_empty() {
            return true;
        }
        self.domains.iter().any(|d| d == domain)
    }

    /// True iff the artifact's domain is in scope, OR its IP is in scope,
    /// OR its domain resolves (via the DNS cache) to an IP in scope.
    pub async fn is_artifact_in_scope(&self, artifact: &Artifact, dns: &DnsCache) -> bool {
        let domain = artifact.domain();
        if !domain.is_empty() && self.is_domain_in_scope(&domain) {
            return true;
        }

        if let Some(ip) = artifact.ip() {
            if let Ok(v4) = Ipv4Addr::from_str(&ip) {
                if self.is_ip_in_scope(v4) {
                    return true;
                }
            }
        }

        if !domain.is_empty() {
            if let Ok(std::net::IpAddr::V4(v4)) = dns.lookup(&domain).await {
                if self.is_ip_in_scope(v4) {
                    return true;
                }
            }
        }

        false
    }

    /// Yields each included IP exactly once, applying exclusions. An empty
    /// inclusion list yields nothing (there is nothing to enumerate for
    /// "any"; seeding only makes sense over explicitly configured ranges).
    pub fn iterate_ips(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.ips
            .iter()
            .flat_map(|r| r.iter())
            .filter(move |ip| !self.excluded_ips.iter().any(|r| r.contains(*ip)))
    }

    pub fn iterate_domains(&self) -> impl Iterator<Item = &str> + '_ {
        self.domains
            .iter()
            .map(String::as_str)
            .filter(move |d| !self.excluded_domains.iter().any(|e| e == d))
    }
}
