//! Crate-wide error types.
//!
//! Mirrors the error taxonomy of the orchestrator: configuration errors are
//! fatal at startup, programming invariants panic, and everything else is
//! either dropped with a log line or surfaced as a typed `Result`.

use thiserror::Error;

/// Errors raised while parsing an IP range (`A.B.C.D`, `A-B`, `A.B.C.D/n`).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum IpRangeError {
    #[error("invalid IP range syntax: {0}")]
    InvalidSyntax(String),
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),
    #[error("invalid CIDR prefix length: {0}")]
    InvalidPrefix(String),
}

/// Errors raised by the DNS cache.
#[derive(Debug, Error)]
pub enum DnsCacheError {
    #[error("resolution failed for {domain}: {source}")]
    Resolve {
        domain: String,
        #[source]
        source: std::io::Error,
    },
    #[error("resolver returned no addresses for {0}")]
    NoAddresses(String),
    #[error("failed to persist dns cache to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while adding an artifact to storage.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StorageError {
    #[error("artifact kind {0:?} has no defined deduplication rule")]
    UnsupportedKind(crate::artifact::ArtifactKind),
}

/// Fatal configuration-loading errors. The process aborts on these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("scanner template {name} declares no inputs")]
    EmptyInputs { name: String },
    #[error("scanner template {name} has invalid rate_limit_type {value:?}")]
    InvalidRateLimitType { name: String, value: String },
    #[error("scanner template {name} requires credential key {key:?}, but it is not present in the keyfile")]
    MissingCredentialKey { name: String, key: String },
    #[error("invalid IP range in scope config: {0}")]
    InvalidScopeRange(#[from] IpRangeError),
}

/// Errors surfaced at the master HTTP boundary; always mapped to 400.
#[derive(Debug, Error)]
pub enum MasterApiError {
    #[error("failed to deserialize request body: {0}")]
    Bind(#[from] axum::extract::rejection::JsonRejection),
    #[error("no scanner template named {0}")]
    UnknownTemplate(String),
}

/// Errors raised by a `WorkerRuntime` implementation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to launch worker process: {0}")]
    Launch(#[source] std::io::Error),
    #[error("failed to stop worker process: {0}")]
    Stop(#[source] std::io::Error),
}

/// Errors raised by a `ResultsSink` implementation.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("failed to write results: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to serialize results: {0}")]
    Serialize(#[source] serde_json::Error),
}
