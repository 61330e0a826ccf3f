//! `novelvmp-cli`: the `master` subcommand that wires every `novelvmp`
//! module into a running orchestrator process.
//!
//! Grounded on `examples/original_source/orchestrator/internal/cli/cli.go`'s
//! `cobra` root command and `internal/master/server.go`'s `Start`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use novelvmp::artifact::ArtifactKind;
use novelvmp::config::{self, MasterConfig, ScannerConfig};
use novelvmp::dns_cache::DnsCache;
use novelvmp::events::EventBus;
use novelvmp::master::{self, MasterState};
use novelvmp::rate_limiter::RateLimiter;
use novelvmp::results::JsonFileSink;
use novelvmp::scheduler::Scheduler;
use novelvmp::worker_runtime::ProcessRuntime;
use novelvmp::deriver;

/// Port the master HTTP API listens on, matching `cli.go`/`master/server.go`.
const MASTER_PORT: u16 = 1323;
/// Bound on the channels workers deliver artifacts/control messages over.
const CHANNEL_BUFFER: usize = 256;

#[derive(Parser)]
#[command(name = "novelvmpfang", about = "Distributed, scope-aware security scanner orchestrator")]
struct Cli {
    /// Skip standing up the real worker fleet and scheduler; instead feed a
    /// single canned artifact to whichever scanner registers, for exercising
    /// one scanner image end-to-end against a local target.
    #[arg(long, global = true)]
    scanner_test: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the master: loads `config.yaml`, registers every configured
    /// scanner template, and serves the HTTP API on port 1323.
    Master,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Master => run_master(cli.scanner_test).await,
    }
}

async fn run_master(scanner_test: bool) -> Result<()> {
    let master_config = MasterConfig::load("config.yaml").context("loading config.yaml")?;
    let keyfile = config::load_keyfile(&master_config.keyfile).context("loading credential keyfile")?;
    let vserver_mapping = config::load_vserver_mapping("vserver-mapping.yaml")?;
    let domainlist = config::load_domainlist("domainlist.txt");

    let dns = Arc::new(DnsCache::load("dns_cache.json"));

    let mut scope = master_config.scope;
    if !domainlist.is_empty() {
        scope.augment_from_domainlist(domainlist, &dns).await;
    }

    let bus = Arc::new(EventBus::new());
    let limiter = Arc::new(RateLimiter::new(vserver_mapping));
    let (deriver_tx, deriver_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (artifact_tx, artifact_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (control_tx, control_rx) = mpsc::channel(CHANNEL_BUFFER);

    let mut scheduler = Scheduler::new(scope, dns.clone(), bus.clone(), limiter, deriver_tx);

    let master_host = format!("localhost:{MASTER_PORT}");
    let mut template_first_input = HashMap::new();

    for scanner_dir in &master_config.scanners {
        let config = ScannerConfig::load(scanner_dir)
            .with_context(|| format!("loading scanner config at {}", scanner_dir.display()))?;
        let name = config.image.clone();

        let credential_value = resolve_credential(&name, &config, &keyfile)?;
        if let Some(first_input) = config.inputs.first() {
            if let Ok(kind) = first_input.parse::<ArtifactKind>() {
                template_first_input.insert(name.clone(), kind);
            }
        }

        scheduler.add_template(
            name,
            config,
            Arc::new(ProcessRuntime),
            master_host.clone(),
            master_config.max_requests,
            credential_value,
            !scanner_test,
        );
    }

    let master_state = Arc::new(MasterState {
        artifact_tx,
        control_tx,
        template_first_input,
        scanner_test,
        http: reqwest::Client::new(),
    });
    let app = master::router(master_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", MASTER_PORT))
        .await
        .with_context(|| format!("binding master HTTP API to port {MASTER_PORT}"))?;

    info!(port = MASTER_PORT, scanner_test, "master listening");

    if scanner_test {
        // `--scanner-test` never starts the scheduler or instance pool; the
        // HTTP server alone is enough to exercise one registered scanner.
        axum::serve(listener, app).await.context("serving master HTTP API")?;
        return Ok(());
    }

    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.context("serving master HTTP API")
    });

    tokio::spawn(deriver::run(deriver_rx, bus.clone(), dns.clone()));

    scheduler.seed_from_scope().await;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, forcing shutdown");
                shutdown.cancel();
            }
        }
    });

    let results = Arc::new(JsonFileSink::new("results.json"));
    scheduler.run(artifact_rx, control_rx, results, shutdown).await;

    info!("scheduler quiesced, shutting down");
    server.abort();
    Ok(())
}

/// Looks up the secret a scanner template's `needs_key` names in the
/// credential keyfile. An empty `needs_key` means the template takes no
/// credential at all; a non-empty one that isn't present is a fatal
/// configuration error (spec.md §7).
fn resolve_credential(name: &str, config: &ScannerConfig, keyfile: &HashMap<String, String>) -> Result<String> {
    if config.needs_key.is_empty() {
        return Ok(String::new());
    }
    match keyfile.get(&config.needs_key) {
        Some(value) => Ok(value.clone()),
        None => bail!(novelvmp::error::ConfigError::MissingCredentialKey {
            name: name.to_string(),
            key: config.needs_key.clone(),
        }),
    }
}
