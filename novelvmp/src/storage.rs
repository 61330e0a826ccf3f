//! Append-only, deduplicating artifact log.
//!
//! Grounded on `examples/original_source/orchestrator/internal/storage/storage.go`.
//!
//! Note on a discrepancy in the original: its `deduplicate` switch has empty
//! `case Domain:`/`case IP:`/`case Host:` bodies that (per Go's
//! non-fallthrough `switch`) never execute the value-match loop written
//! under `case URL:` — only URL dedup is actually live in that source. This
//! looks like an unintentional bug, not a deliberate design choice, and
//! spec.md §4.7 is explicit that `ip`, `host`, `url`, and `domain` all
//! dedup identically on value equality. This crate implements the spec's
//! stated behavior for all four kinds rather than reproducing the apparent
//! bug.
//!
//! Owned exclusively by the scheduler task (spec.md §5); no internal
//! locking.

use tracing::info;

use crate::artifact::{Artifact, ArtifactKind};
use crate::error::StorageError;
use crate::events::EventBus;

/// The longest common prefix of two strings, used to collapse two
/// `technology` URLs that disagree (`unifyURL`/`commonPrefix` in the
/// original).
fn common_prefix(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// Append-only artifact log with per-kind dedup rules, publishing every
/// accepted artifact on the event bus under its own kind.
pub struct Storage {
    artifacts: Vec<Artifact>,
    bus: std::sync::Arc<EventBus<Artifact>>,
}

impl Storage {
    pub fn new(bus: std::sync::Arc<EventBus<Artifact>>) -> Self {
        Self {
            artifacts: Vec::new(),
            bus,
        }
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Applies the per-kind dedup rule, then either merges into an existing
    /// entry (dropping the new one), appends and publishes, or errors for
    /// kinds with no defined rule (`cms`, `screenshot`).
    pub fn add_artifact(&mut self, artifact: Artifact) -> Result<(), StorageError> {
        match artifact.kind {
            ArtifactKind::Ip | ArtifactKind::Host | ArtifactKind::Url | ArtifactKind::Domain => {
                if self
                    .artifacts
                    .iter()
                    .any(|a| a.kind == artifact.kind && a.value == artifact.value)
                {
                    info!(kind = %artifact.kind, value = %artifact.value, "dropping duplicate artifact");
                    return Ok(());
                }
            }
            ArtifactKind::Httpmsg => {
                let dup_url = artifact.location.url.as_deref();
                if self.artifacts.iter().any(|a| {
                    a.kind == ArtifactKind::Httpmsg && a.location.url.as_deref() == dup_url
                }) {
                    info!(url = ?dup_url, "dropping duplicate httpmsg artifact");
                    return Ok(());
                }
            }
            ArtifactKind::Technology => {
                let domain = artifact.domain();
                if let Some(existing) = self.artifacts.iter_mut().find(|a| {
                    a.kind == ArtifactKind::Technology
                        && a.value == artifact.value
                        && a.domain() == domain
                }) {
                    let existing_version = existing.version.clone().unwrap_or_default();
                    let new_version = artifact.version.clone().unwrap_or_default();

                    if existing_version.is_empty() && !new_version.is_empty() {
                        existing.version = artifact.version.clone();
                    }

                    if existing_version == new_version {
                        if let (Some(existing_url), Some(new_url)) =
                            (existing.location.url.clone(), artifact.location.url.clone())
                        {
                            if existing_url != new_url {
                                existing.location.url = Some(common_prefix(&existing_url, &new_url));
                            }
                        }
                    }

                    info!(value = %artifact.value, %domain, "merged duplicate technology artifact");
                    return Ok(());
                }
            }
            ArtifactKind::Finding => {
                // Never deduped.
            }
            ArtifactKind::Cms | ArtifactKind::Screenshot => {
                return Err(StorageError::UnsupportedKind(artifact.kind));
            }
        }

        let kind = artifact.kind;
        self.artifacts.push(artifact.clone());
        self.bus.publish(&kind.to_string(), artifact);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn storage() -> Storage {
        Storage::new(Arc::new(EventBus::new()))
    }

    #[test]
    fn duplicate_ip_is_dropped() {
        let mut s = storage();
        s.add_artifact(Artifact::new(ArtifactKind::Ip, "127.0.0.1", "scope"))
            .unwrap();
        s.add_artifact(Artifact::new(ArtifactKind::Ip, "127.0.0.1", "scope"))
            .unwrap();
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn duplicate_domain_twice_keeps_length_one() {
        let mut s = storage();
        s.add_artifact(Artifact::new(ArtifactKind::Domain, "a.com", "scope"))
            .unwrap();
        s.add_artifact(Artifact::new(ArtifactKind::Domain, "a.com", "scope"))
            .unwrap();
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn httpmsg_dedups_on_location_url() {
        let mut make = |url: &str| {
            let mut a = Artifact::new(ArtifactKind::Httpmsg, "ignored", "scanner");
            a.location.url = Some(url.to_string());
            a
        };
        let mut s = storage();
        s.add_artifact(make("https://x.com/a")).unwrap();
        s.add_artifact(make("https://x.com/a")).unwrap();
        s.add_artifact(make("https://x.com/b")).unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn technology_merge_adopts_version_and_common_prefix_url() {
        let mut first = Artifact::new(ArtifactKind::Technology, "WordPress", "scanner");
        first.location.url = Some("https://x.com/a".to_string());
        first.location.ip = None;
        first.version = Some(String::new());
        // domain() for a `technology` artifact falls back to the url host.

        let mut second = Artifact::new(ArtifactKind::Technology, "WordPress", "scanner");
        second.location.url = Some("https://x.com/b".to_string());
        second.version = Some("6.5".to_string());

        let mut s = storage();
        s.add_artifact(first).unwrap();
        s.add_artifact(second).unwrap();

        assert_eq!(s.len(), 1);
        let stored = &s.artifacts()[0];
        assert_eq!(stored.version.as_deref(), Some("6.5"));
        assert_eq!(stored.location.url.as_deref(), Some("https://x.com/"));
    }

    #[test]
    fn technology_merge_leaves_url_alone_when_versions_disagree() {
        let mut first = Artifact::new(ArtifactKind::Technology, "WordPress", "scanner");
        first.location.url = Some("https://x.com/a".to_string());
        first.version = Some("1.0".to_string());

        let mut second = Artifact::new(ArtifactKind::Technology, "WordPress", "scanner");
        second.location.url = Some("https://x.com/b".to_string());
        second.version = Some("2.0".to_string());

        let mut s = storage();
        s.add_artifact(first).unwrap();
        s.add_artifact(second).unwrap();

        assert_eq!(s.len(), 1);
        let stored = &s.artifacts()[0];
        assert_eq!(stored.version.as_deref(), Some("1.0"));
        assert_eq!(stored.location.url.as_deref(), Some("https://x.com/a"));
    }

    #[test]
    fn finding_is_never_deduped() {
        let mut s = storage();
        s.add_artifact(Artifact::new(ArtifactKind::Finding, "dup", "scanner"))
            .unwrap();
        s.add_artifact(Artifact::new(ArtifactKind::Finding, "dup", "scanner"))
            .unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn cms_and_screenshot_are_explicitly_unsupported() {
        let mut s = storage();
        assert!(matches!(
            s.add_artifact(Artifact::new(ArtifactKind::Cms, "joomla", "scanner")),
            Err(StorageError::UnsupportedKind(ArtifactKind::Cms))
        ));
        assert!(matches!(
            s.add_artifact(Artifact::new(ArtifactKind::Screenshot, "x", "scanner")),
            Err(StorageError::UnsupportedKind(ArtifactKind::Screenshot))
        ));
    }

    #[test]
    fn repeated_add_of_same_ip_is_idempotent() {
        let mut s = storage();
        for _ in 0..5 {
            s.add_artifact(Artifact::new(ArtifactKind::Ip, "1.2.3.4", "scope"))
                .unwrap();
        }
        assert_eq!(s.len(), 1);
    }
}
