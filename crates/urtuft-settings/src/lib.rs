//! UR Tuft Settings Crate
//!
//! Handles application configuration: file loading, validation and the
//! conversion into compiler, rendering and transport options.

pub mod config;
pub mod error;

pub use config::{Config, FrameSettings, RobotSettings, TelemetrySettings, ToolpathSettings};
pub use error::{SettingsError, SettingsResult};
