//! The pipeline's currency: a typed observation flowing through the event
//! bus, storage, and the worker protocol.
//!
//! Grounded on `examples/original_source/orchestrator/data/artifact.go`.
//! `Artifact::ip`/`Artifact::domain` reproduce that file's `GetIPFromArtifact`/
//! `GetDomainFromArtifact` precedence exactly.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::url::UrlParser;

/// The kind of observation an [`Artifact`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Domain,
    Ip,
    Host,
    Url,
    Cms,
    Httpmsg,
    Screenshot,
    Finding,
    Technology,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::Domain => "domain",
            ArtifactKind::Ip => "ip",
            ArtifactKind::Host => "host",
            ArtifactKind::Url => "url",
            ArtifactKind::Cms => "cms",
            ArtifactKind::Httpmsg => "httpmsg",
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Finding => "finding",
            ArtifactKind::Technology => "technology",
        };
        f.write_str(s)
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "domain" => Ok(ArtifactKind::Domain),
            "ip" => Ok(ArtifactKind::Ip),
            "host" => Ok(ArtifactKind::Host),
            "url" => Ok(ArtifactKind::Url),
            "cms" => Ok(ArtifactKind::Cms),
            "httpmsg" => Ok(ArtifactKind::Httpmsg),
            "screenshot" => Ok(ArtifactKind::Screenshot),
            "finding" => Ok(ArtifactKind::Finding),
            "technology" => Ok(ArtifactKind::Technology),
            other => Err(format!("unknown artifact kind: {other}")),
        }
    }
}

/// Where an artifact was observed. Both fields are optional; a worker may
/// report neither, either, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A typed observation in the scan pipeline.
///
/// `kind` and `scanner` are required; everything else is optional scanner-
/// or finding-specific detail. Fields follow §3 of the orchestrator
/// specification and `data/artifact.go`'s json tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub value: String,
    #[serde(default)]
    pub location: Location,
    pub scanner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_metrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_dom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, value: impl Into<String>, scanner: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            location: Location::default(),
            scanner: scanner.into(),
            severity: None,
            title: None,
            description: None,
            cve: None,
            cvss_metrics: None,
            cvss_score: None,
            request: None,
            response: None,
            response_dom: None,
            data: None,
            additional_data: None,
            version: None,
            categories: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Splits a `host` artifact's value (`ipOrDomain:port`) into its parts.
    /// Returns `None` if `value` has no `:port` suffix or the port doesn't parse.
    pub fn host_parts(&self) -> Option<(&str, u16)> {
        let (host, port) = self.value.rsplit_once(':')?;
        let port: u16 = port.parse().ok()?;
        Some((host, port))
    }

    /// The domain this artifact is about, or empty if none can be derived.
    ///
    /// Precedence (from `GetDomainFromArtifact`):
    /// 1. `value` directly, for `domain` kind.
    /// 2. The non-IP host part of `value`, for `host` kind.
    /// 3. The hostname parsed out of `location.url`.
    pub fn domain(&self) -> String {
        match self.kind {
            ArtifactKind::Domain => return self.value.clone(),
            ArtifactKind::Host => {
                if let Some((host, _)) = self.host_parts() {
                    if parse_literal_ip(host).is_none() {
                        return host.to_string();
                    }
                }
            }
            _ => {}
        }

        if let Some(url) = &self.location.url {
            if let Some(host) = host_of_url(url) {
                if parse_literal_ip(&host).is_none() {
                    return host;
                }
            }
        }

        String::new()
    }

    /// The IP this artifact is about, or `None` if none can be derived.
    ///
    /// Precedence (from `GetIPFromArtifact`):
    /// 1. `location.ip`, if set.
    /// 2. A literal IP parsed from `location.url`'s host.
    /// 3. For `ip` kind, `value` parsed as a literal IP.
    /// 4. For `host` kind, the host part of `value` if it's a literal IP.
    /// 5. For `url` kind, the host of `value` parsed as a URL.
    pub fn ip(&self) -> Option<String> {
        if let Some(ip) = &self.location.ip {
            if !ip.is_empty() {
                return Some(ip.clone());
            }
        }

        if let Some(url) = &self.location.url {
            if let Some(host) = host_of_url(url) {
                if let Some(ip) = parse_literal_ip(&host) {
                    return Some(ip);
                }
            }
        }

        match self.kind {
            ArtifactKind::Ip => parse_literal_ip(&self.value),
            ArtifactKind::Host => self
                .host_parts()
                .and_then(|(host, _)| parse_literal_ip(host)),
            ArtifactKind::Url => host_of_url(&self.value).and_then(|h| parse_literal_ip(&h)),
            _ => None,
        }
    }
}

/// Parses `s` as a literal IPv4 or IPv6 address, returning its canonical
/// string form. Brackets around an IPv6 literal (as found in URL hosts) are
/// stripped first.
fn parse_literal_ip(s: &str) -> Option<String> {
    let trimmed = s.trim_matches(|c| c == '[' || c == ']');
    if let Ok(v4) = Ipv4Addr::from_str(trimmed) {
        return Some(v4.to_string());
    }
    if let Ok(v6) = Ipv6Addr::from_str(trimmed) {
        return Some(v6.to_string());
    }
    None
}

/// Extracts the host portion of a URL string, tolerating parse failure the
/// way the original falls back to a regex scan: if the strict parser fails,
/// take everything between `://` and the first `/`, `:`, or end of string.
fn host_of_url(url: &str) -> Option<String> {
    if let Ok(parsed) = UrlParser::new(url) {
        return Some(parsed.target);
    }

    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host: String = after_scheme
        .chars()
        .take_while(|c| *c != '/' && *c != ':' && *c != '?' && *c != '#')
        .collect();
    if host.is_empty() { None } else { Some(host) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_artifact_domain_is_its_value() {
        let a = Artifact::new(ArtifactKind::Domain, "example.com", "scope");
        assert_eq!(a.domain(), "example.com");
    }

    #[test]
    fn host_artifact_domain_ignores_literal_ip_host() {
        let a = Artifact::new(ArtifactKind::Host, "10.0.0.1:80", "deriver");
        assert_eq!(a.domain(), "");

        let b = Artifact::new(ArtifactKind::Host, "svc.internal:80", "deriver");
        assert_eq!(b.domain(), "svc.internal");
    }

    #[test]
    fn ip_artifact_ip_is_its_value() {
        let a = Artifact::new(ArtifactKind::Ip, "127.0.0.1", "scope");
        assert_eq!(a.ip().as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn host_artifact_ip_from_literal_host_part() {
        let a = Artifact::new(ArtifactKind::Host, "10.0.0.1:443", "deriver");
        assert_eq!(a.ip().as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn location_ip_takes_precedence_over_value() {
        let mut a = Artifact::new(ArtifactKind::Ip, "127.0.0.1", "scope");
        a.location.ip = Some("10.0.0.9".to_string());
        assert_eq!(a.ip().as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn url_artifact_ip_from_value_host() {
        let a = Artifact::new(ArtifactKind::Url, "https://10.1.2.3/admin", "scanner");
        assert_eq!(a.ip().as_deref(), Some("10.1.2.3"));
    }

    #[test]
    fn host_parts_splits_last_colon() {
        let a = Artifact::new(ArtifactKind::Host, "svc:8080", "deriver");
        assert_eq!(a.host_parts(), Some(("svc", 8080)));
    }
}
