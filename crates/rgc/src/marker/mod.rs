//! Marker Module - Mark protocol, liveness and tracing
//!
//! - [`MarkState`]: per-object mark field and the global mark values
//! - [`liveness`]: per-region live-byte counters
//! - [`RegionTraceLocal`]: single-threaded closure driver
//! - [`WorkQueue`]: work-stealing queue for the parallel collector

pub mod liveness;
pub mod mark;
pub mod trace;
pub mod work_queue;

pub use liveness::LivenessView;
pub use mark::MarkState;
pub use trace::{scan_object, trace_object_with, RegionTraceLocal, TraceKind, TransitiveClosure};
pub use work_queue::{LocalQueue, WorkQueue};
