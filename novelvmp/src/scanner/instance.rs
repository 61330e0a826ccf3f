//! Lifecycle wrapper over one worker process.
//!
//! Grounded on
//! `examples/original_source/orchestrator/internal/scheduler/scanner_instance.go`.
//! Busy-flag double-set/-clear and handshake mismatches are fatal
//! programming-invariant panics, matching the original's `log.Fatal`/
//! `log.Panicf` at the same points (spec.md §7).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::protocol::{ScannerInstanceControlMsg, ScannerMsgKind};
use crate::rate_limiter::RateLimiter;
use crate::artifact::Artifact;
use crate::worker_runtime::{WorkerHandle, WorkerRuntime};

/// Process-wide port counter, starting at 30 001 per spec.md §4.10 /
/// `scanner_instance.go`'s `portStart = 30000` (incremented before first
/// use).
static NEXT_PORT: AtomicU32 = AtomicU32::new(30_001);

fn allocate_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::SeqCst) as u16
}

/// One worker instance's mutable runtime state: its busy flag and the
/// timestamp its current task started at.
struct State {
    busy: bool,
    task_started_at: Option<Instant>,
}

/// A single scanner worker process, addressable on `self.port`.
pub struct ScannerInstance {
    pub name: String,
    pub template_name: String,
    pub image: String,
    pub port: u16,
    state: Mutex<State>,
}

impl ScannerInstance {
    pub fn new(name: String, template_name: String, image: String) -> Self {
        Self {
            name,
            template_name,
            image,
            port: allocate_port(),
            state: Mutex::new(State {
                busy: true,
                task_started_at: None,
            }),
        }
    }

    /// Mutex-guarded; double-set is a fatal programming error (spec.md §7,
    /// §4.10).
    pub fn set_busy(&self) {
        let mut state = self.state.lock();
        if state.busy {
            panic!("instance {} double set-busy", self.name);
        }
        state.busy = true;
        state.task_started_at = Some(Instant::now());
    }

    pub fn unset_busy(&self) {
        let mut state = self.state.lock();
        if !state.busy {
            panic!("instance {} double unset-busy", self.name);
        }
        state.busy = false;
        state.task_started_at = None;
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }
}

/// A control channel plus the artifact input sender wired to this instance,
/// returned to the template so it can route control messages and shared
/// input.
pub struct InstanceHandle {
    pub instance: Arc<ScannerInstance>,
    pub ctrl_tx: mpsc::Sender<ScannerInstanceControlMsg>,
}

/// Arguments needed to run one instance's task body (spec.md §4.10).
pub struct RunContext {
    pub master_host: String,
    pub max_requests: i64,
    pub credential_value: String,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Runs the instance's full lifecycle: launch, handshake, task loop,
/// teardown. Spawned as its own task by `ScannerTemplate::add_scanner`.
#[instrument(skip(runtime, ctrl_rx, input, ctx), fields(instance = %instance.name))]
pub async fn run(
    instance: Arc<ScannerInstance>,
    runtime: Arc<dyn WorkerRuntime>,
    mut ctrl_rx: mpsc::Receiver<ScannerInstanceControlMsg>,
    mut input: mpsc::Receiver<Artifact>,
    ctx: RunContext,
) {
    let env = vec![
        ("NOVELVMP_MASTER_HOST".to_string(), ctx.master_host.clone()),
        ("NOVELVMP_TEMPLATE_NAME".to_string(), instance.template_name.clone()),
        ("NOVELVMP_SCANNER_NAME".to_string(), instance.name.clone()),
        ("NOVELVMP_SCANNER_PORT".to_string(), instance.port.to_string()),
        ("NOVELVMP_MAX_REQUESTS".to_string(), ctx.max_requests.to_string()),
        ("NOVELVMP_KEY".to_string(), ctx.credential_value.clone()),
    ];

    let handle: WorkerHandle = match runtime.run(&instance.image, &instance.name, &env).await {
        Ok(h) => h,
        Err(e) => panic!("instance {} failed to launch worker process: {e}", instance.name),
    };

    wait_for(&mut ctrl_rx, &instance, ScannerMsgKind::Register).await;
    instance.unset_busy();
    info!("instance registered and ready");

    while let Some(artifact) = input.recv().await {
        instance.set_busy();

        let client = reqwest::Client::new();
        let url = format!("http://localhost:{}/artifact", instance.port);
        match client.post(&url).json(&artifact).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => panic!(
                "instance {} received non-200 from worker: {}",
                instance.name,
                resp.status()
            ),
            Err(e) => panic!("instance {} failed to post artifact to worker: {e}", instance.name),
        }

        wait_for(&mut ctrl_rx, &instance, ScannerMsgKind::FinishTask).await;
        ctx.rate_limiter.free_allocation(&artifact);
        instance.unset_busy();
    }

    if let Err(e) = handle.stop_and_remove().await {
        warn!(error = %e, "failed to stop/remove worker process");
    }
}

/// Blocks until a control message of `expected` kind addressed to this
/// instance arrives; any mismatch (wrong instance, wrong message kind, or a
/// closed channel) is a fatal programming-invariant error.
async fn wait_for(
    ctrl_rx: &mut mpsc::Receiver<ScannerInstanceControlMsg>,
    instance: &ScannerInstance,
    expected: ScannerMsgKind,
) {
    let msg = ctrl_rx
        .recv()
        .await
        .unwrap_or_else(|| panic!("instance {} control channel closed awaiting {expected:?}", instance.name));

    if msg.scanner_instance != instance.name || msg.scanner_msg != expected {
        panic!(
            "instance {} expected {expected:?} handshake, got {:?} from {}",
            instance.name, msg.scanner_msg, msg.scanner_instance
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_allocated_monotonically_from_30001() {
        let a = allocate_port();
        let b = allocate_port();
        assert!(b == a + 1);
        assert!(a >= 30_001);
    }

    #[test]
    fn busy_flag_starts_true_and_toggles() {
        let instance = ScannerInstance::new("t_0".into(), "t".into(), "img".into());
        assert!(instance.is_busy());
        instance.unset_busy();
        assert!(!instance.is_busy());
        instance.set_busy();
        assert!(instance.is_busy());
    }

    #[test]
    #[should_panic(expected = "double set-busy")]
    fn double_set_busy_panics() {
        let instance = ScannerInstance::new("t_0".into(), "t".into(), "img".into());
        instance.set_busy();
    }

    #[test]
    #[should_panic(expected = "double unset-busy")]
    fn double_unset_busy_panics() {
        let instance = ScannerInstance::new("t_0".into(), "t".into(), "img".into());
        instance.unset_busy();
        instance.unset_busy();
    }
}
