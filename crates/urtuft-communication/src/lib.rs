//! # UR Tuft Communication
//!
//! TCP transport between UR Tuft and the robot controller. Programs go out
//! on the controller's script port, one connection per delivery; progress
//! comes back on a listener the running program connects to.

pub mod communication;
pub mod telemetry;

pub use communication::{
    deliver_or_skip, ingest, DeliveryOutcome, ListenerHandle, ProgramDelivery, ProgressListener,
    ScriptClient, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_SCRIPT_PORT, DEFAULT_TELEMETRY_PORT,
};
pub use telemetry::{normalize_line, parse_status_line, ProgressRecord};
