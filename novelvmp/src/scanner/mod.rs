//! A scanner template's worker pool: per-template queue, control-message
//! fan-out, and the instance lifecycle wrapper.
//!
//! Grounded on `examples/original_source/orchestrator/internal/scheduler/scanner_template.go`
//! and `scanner_instance.go`. The concurrency shape — one task per instance,
//! an RAII-guarded busy flag, bounded control channels — follows the
//! teacher's own `scanner/mod.rs` (`ActiveTasksGuard`, `Scanner`/
//! `BuiltScanner` split between shared state and the task that drives it).
//! The teacher's per-connection scanning engine (`actions`, `buffer_pool`,
//! `formatter`) has no counterpart here: this orchestrator treats individual
//! scanner workers as black boxes (spec.md §1) addressed purely over HTTP.

pub mod instance;
pub mod template;

pub use instance::{InstanceHandle, ScannerInstance};
pub use template::ScannerTemplate;
