//! Configuration for UR Tuft
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML files, by default stored in the platform configuration directory.
//!
//! Configuration is organized into sections:
//! - Robot (controller address, script port, speeds, tool output)
//! - Toolpath (workpiece geometry, heights, threshold, chunk ceiling)
//! - Frame (the calibrated coordinate frame every pose is relative to)
//! - Telemetry (progress listener and the address programs report to)

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use urtuft_communication::{
    ScriptClient, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_SCRIPT_PORT, DEFAULT_TELEMETRY_PORT,
};
use urtuft_toolpath::{
    CompileOptions, CoordinateFrame, RenderOptions, TelemetryTarget, DEFAULT_MAX_MOTIONS_PER_CHUNK,
    MAX_TOOL_OUTPUT, MOTIONS_PER_SEGMENT,
};

/// Robot controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSettings {
    /// Controller hostname or IP; delivery is skipped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Script port programs are delivered to
    pub script_port: u16,
    /// Bound on connecting and writing, in milliseconds
    pub connect_timeout_ms: u64,
    /// Digital output driving the tufting gun
    pub tool_output: u8,
    /// Travel, plunge and retract speed in mm/s
    pub travel_speed_mm_s: f64,
    /// Tufting speed in mm/s
    pub tuft_speed_mm_s: f64,
    /// TCP force in newtons that stops a plunge early
    pub contact_force_threshold_n: f64,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            host: None,
            script_port: DEFAULT_SCRIPT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            tool_output: 0,
            travel_speed_mm_s: 200.0,
            tuft_speed_mm_s: 60.0,
            contact_force_threshold_n: 15.0,
        }
    }
}

/// Toolpath generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolpathSettings {
    pub workpiece_width_mm: f64,
    pub workpiece_height_mm: f64,
    pub margin_mm: f64,
    /// Absolute clearance Z in the frame
    pub safe_height_mm: f64,
    /// Absolute contact Z in the frame; must be below the safe height
    pub surface_height_mm: f64,
    /// Pixels at or below this intensity are tufted
    pub black_pixel_threshold: u8,
    /// Controller ceiling on motion instructions per program
    pub max_motions_per_chunk: usize,
    /// Name of the generated URScript function
    pub program_name: String,
}

impl Default for ToolpathSettings {
    fn default() -> Self {
        let options = CompileOptions::default();
        Self {
            workpiece_width_mm: options.workpiece_width_mm,
            workpiece_height_mm: options.workpiece_height_mm,
            margin_mm: options.margin_mm,
            safe_height_mm: options.safe_height_mm,
            surface_height_mm: options.surface_height_mm,
            black_pixel_threshold: options.black_pixel_threshold,
            max_motions_per_chunk: DEFAULT_MAX_MOTIONS_PER_CHUNK,
            program_name: RenderOptions::default().program_name,
        }
    }
}

/// Coordinate frame settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// URScript variable holding the frame
    pub name: String,
    /// Frame pose in metres and radians
    pub pose: [f64; 6],
}

impl Default for FrameSettings {
    fn default() -> Self {
        let frame = CoordinateFrame::default();
        Self {
            name: frame.name,
            pose: frame.pose,
        }
    }
}

/// Progress telemetry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Emit progress reports from generated programs
    pub enabled: bool,
    /// Interface the listener binds to
    pub bind_address: String,
    /// Listener port
    pub port: u16,
    /// Address of this machine as seen from the controller
    pub callback_host: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_TELEMETRY_PORT,
            callback_host: "127.0.0.1".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub robot: RobotSettings,
    pub toolpath: ToolpathSettings,
    pub frame: FrameSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// `<config dir>/urtuft/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("urtuft").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            _ => {
                tracing::debug!("No configuration file; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => {
                toml::to_string_pretty(self).map_err(|e| SettingsError::SaveError(e.to_string()))?
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.robot.connect_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "robot.connect_timeout_ms",
                "must be > 0",
            ));
        }
        if self.robot.script_port == 0 {
            return Err(SettingsError::invalid("robot.script_port", "must be > 0"));
        }
        if let Some(host) = &self.robot.host {
            if host.trim().is_empty() {
                return Err(SettingsError::invalid("robot.host", "must not be empty"));
            }
        }

        if self.robot.tool_output > MAX_TOOL_OUTPUT {
            return Err(SettingsError::invalid(
                "robot.tool_output",
                format!("must be 0-{}", MAX_TOOL_OUTPUT),
            ));
        }

        // Smaller ceilings cannot hold a single tufting stroke.
        if self.toolpath.max_motions_per_chunk < MOTIONS_PER_SEGMENT {
            return Err(SettingsError::invalid(
                "toolpath.max_motions_per_chunk",
                format!("must be >= {}", MOTIONS_PER_SEGMENT),
            ));
        }

        if self.telemetry.enabled {
            if self.telemetry.port == 0 {
                return Err(SettingsError::invalid("telemetry.port", "must be > 0"));
            }
            if self.telemetry.callback_host.trim().is_empty() {
                return Err(SettingsError::invalid(
                    "telemetry.callback_host",
                    "must not be empty",
                ));
            }
        }

        self.compile_options()
            .validate()
            .map_err(|e| SettingsError::invalid("toolpath", e.to_string()))
    }

    /// Compiler options from the robot, toolpath and frame sections.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            workpiece_width_mm: self.toolpath.workpiece_width_mm,
            workpiece_height_mm: self.toolpath.workpiece_height_mm,
            margin_mm: self.toolpath.margin_mm,
            safe_height_mm: self.toolpath.safe_height_mm,
            surface_height_mm: self.toolpath.surface_height_mm,
            black_pixel_threshold: self.toolpath.black_pixel_threshold,
            travel_speed_mm_s: self.robot.travel_speed_mm_s,
            tuft_speed_mm_s: self.robot.tuft_speed_mm_s,
            tool_output: self.robot.tool_output,
            contact_force_threshold_n: self.robot.contact_force_threshold_n,
            frame: CoordinateFrame {
                name: self.frame.name.clone(),
                pose: self.frame.pose,
            },
        }
    }

    /// Where generated programs report progress, when enabled.
    pub fn telemetry_target(&self) -> Option<TelemetryTarget> {
        self.telemetry.enabled.then(|| TelemetryTarget {
            host: self.telemetry.callback_host.clone(),
            port: self.telemetry.port,
        })
    }

    /// Rendering options for a job labelled `label`.
    pub fn render_options(&self, label: &str) -> RenderOptions {
        RenderOptions {
            program_name: self.toolpath.program_name.clone(),
            job_label: label.to_string(),
            telemetry: self.telemetry_target(),
        }
    }

    /// `bind_address:port` for the progress listener.
    pub fn listener_address(&self) -> String {
        format!("{}:{}", self.telemetry.bind_address, self.telemetry.port)
    }

    /// Delivery client, when a controller host is configured.
    pub fn script_client(&self) -> Option<ScriptClient> {
        self.robot.host.as_ref().map(|host| {
            ScriptClient::new(host.clone(), self.robot.script_port)
                .with_timeout(Duration::from_millis(self.robot.connect_timeout_ms))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.robot.script_port, 30002);
        assert_eq!(config.telemetry.port, 30010);
        assert_eq!(config.toolpath.max_motions_per_chunk, 500);
        assert!(config.script_client().is_none());
    }

    #[test]
    fn test_inverted_heights_rejected() {
        let mut config = Config::default();
        config.toolpath.surface_height_mm = config.toolpath.safe_height_mm + 1.0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "toolpath"
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.robot.connect_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_ceiling_must_fit_a_segment() {
        let mut config = Config::default();
        config.toolpath.max_motions_per_chunk = 3;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "toolpath.max_motions_per_chunk"
        ));

        config.toolpath.max_motions_per_chunk = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tool_output_range() {
        let mut config = Config::default();
        config.robot.tool_output = 8;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "robot.tool_output"
        ));

        config.robot.tool_output = 7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_render_options_follow_telemetry() {
        let mut config = Config::default();
        config.telemetry.callback_host = "10.0.0.2".to_string();
        let render = config.render_options("rug");
        assert_eq!(render.job_label, "rug");
        assert_eq!(
            render.telemetry,
            Some(TelemetryTarget {
                host: "10.0.0.2".to_string(),
                port: 30010
            })
        );

        config.telemetry.enabled = false;
        assert!(config.render_options("rug").telemetry.is_none());
    }

    #[test]
    fn test_compile_options_mapping() {
        let mut config = Config::default();
        config.robot.tool_output = 3;
        config.robot.contact_force_threshold_n = 20.0;
        config.frame.name = "easel".to_string();
        let options = config.compile_options();
        assert_eq!(options.tool_output, 3);
        assert_eq!(options.contact_force_threshold_n, 20.0);
        assert_eq!(options.frame.name, "easel");
        assert_eq!(options.safe_height_mm, 150.0);
    }

    #[test]
    fn test_unknown_extension() {
        let err = Config::default()
            .save_to_file(Path::new("config.yaml"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedFormat(ref ext) if ext == "yaml"));
    }
}
