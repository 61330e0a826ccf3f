#![cfg_attr(docsrs, feature(doc_cfg))]
//! # novelvmp
//!
//! Orchestrator core for a distributed, scope-aware security scanner. The
//! crate drives a fleet of heterogeneous, containerized scanner workers
//! through a pipeline that progressively derives deeper artifacts — IPs,
//! open hosts, domains, URLs, HTTP exchanges, technologies, findings — from
//! a configured scope, and shuts itself down once the pipeline quiesces.
//!
//! ## Architecture
//!
//! - [`ip_range`] / [`dns_cache`] — the leaf building blocks: CIDR/range
//!   parsing and a TTL'd domain→IP memoizer.
//! - [`events`] — a generic, named-kind publish/subscribe bus that every
//!   [`artifact::Artifact`] flows through.
//! - [`rate_limiter`] / [`queue`] — the process-wide in-use registry and the
//!   per-template queue built on top of it.
//! - [`scope`] — the in/out-of-scope predicate.
//! - [`storage`] — the deduplicating artifact log.
//! - [`deriver`] — cross-joins IP/domain/port sightings into synthesized
//!   `host` artifacts.
//! - [`scanner`] — a scanner template's worker pool (`scanner::template`)
//!   and the per-instance lifecycle wrapper (`scanner::instance`).
//! - [`scheduler`] — the top-level run loop tying all of the above together
//!   and detecting quiescence.
//! - [`master`] — the HTTP surface workers talk to (`/register`,
//!   `/finish_task`, `/artifact`, ...).
//! - [`config`] / [`results`] / [`worker_runtime`] — the configuration
//!   loader and the two external collaborators (results sink, container
//!   runtime) the scheduler is deliberately decoupled from.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use novelvmp::dns_cache::DnsCache;
//! use novelvmp::scope::Scope;
//!
//! # async fn run() {
//! let dns = DnsCache::load("dns_cache.json");
//! let scope = Scope::new(vec![], vec![], vec![], vec![]);
//! let ips: Vec<_> = scope.iterate_ips().collect();
//! # }
//! ```
//!
//! See `novelvmp-cli` for the `master` subcommand that wires every module
//! here into a running server.

pub mod artifact;
pub mod config;
pub mod deriver;
pub mod dns_cache;
pub mod error;
pub mod events;
pub mod ip_range;
pub mod master;
pub mod protocol;
pub mod queue;
pub mod rate_limiter;
pub mod results;
pub mod scanner;
pub mod scheduler;
pub mod scope;
pub mod storage;
pub mod utils;
pub mod worker_runtime;
