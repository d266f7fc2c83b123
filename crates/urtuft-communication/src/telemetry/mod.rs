//! Telemetry sent back by running programs.

pub mod status_parser;

pub use status_parser::{normalize_line, parse_status_line, ProgressRecord};
