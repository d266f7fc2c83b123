//! # UR Tuft Core
//!
//! Core types shared by the toolpath compiler, the controller transport and
//! the binary: unified errors, shared-state aliases, the injected key-value
//! store abstraction and the per-job progress store.

pub mod error;
pub mod progress;
pub mod store;
pub mod types;

pub use error::{CompileError, ConnectionError, Error, Result, TelemetryError};

pub use progress::{clamp_index, ProgressEntry, ProgressEvent, ProgressStore};

pub use store::{InMemoryStore, KeyValueStore};

// Re-export type aliases for convenience
pub use types::{thread_safe_rw_map, ThreadSafeRwMap};
