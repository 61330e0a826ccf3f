//! Canned artifacts handed to a scanner instance in `--scanner-test` mode,
//! one per input kind a template might declare.
//!
//! Grounded on
//! `examples/original_source/orchestrator/internal/scheduler/test_artifacts.go`'s
//! `getTestArtifact`. Values are copied verbatim; this exists purely to let
//! a single scanner image be exercised end-to-end against a local target
//! without standing up the rest of the fleet.

use crate::artifact::{Artifact, ArtifactKind, Location};

/// Returns the canned artifact for `kind`, or panics if none is configured
/// for it — mirroring the original's `log.Fatalf` on an unhandled case.
pub fn canned_artifact(kind: ArtifactKind) -> Artifact {
    match kind {
        ArtifactKind::Host => Artifact::new(ArtifactKind::Host, "localhost:8081", "config"),
        ArtifactKind::Ip => Artifact::new(ArtifactKind::Ip, "127.0.0.1", "config"),
        ArtifactKind::Domain => Artifact::new(ArtifactKind::Domain, "localhost", "config"),
        ArtifactKind::Url => Artifact::new(ArtifactKind::Url, "http://localhost:8081/", "config"),
        ArtifactKind::Httpmsg => {
            let mut artifact = Artifact::new(ArtifactKind::Httpmsg, "http://localhost:3000/", "config");
            artifact.location = Location {
                url: Some("http://localhost:3000/".to_string()),
                ip: None,
            };
            artifact.request = Some("GET / HTTP/1.1\r\nHost: localhost:3000\r\n\r\n".to_string());
            artifact.response = Some(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
                 <html><head><title>Example Domain</title></head>\
                 <body><h1>Example Domain</h1></body></html>"
                    .to_string(),
            );
            artifact
        }
        other => panic!("test artifact not configured for: {other:?}"),
    }
}
