//! Controller transport: outbound program delivery and inbound progress.

pub mod progress_listener;
pub mod script_client;

pub use progress_listener::{ingest, ListenerHandle, ProgressListener, DEFAULT_TELEMETRY_PORT};
pub use script_client::{
    deliver_or_skip, DeliveryOutcome, ProgramDelivery, ScriptClient, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_SCRIPT_PORT,
};
