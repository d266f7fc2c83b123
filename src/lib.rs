//! # UR Tuft
//!
//! Turns a greyscale image into URScript programs that drive a tufting gun
//! mounted on a Universal Robots arm, delivers them to the controller and
//! tracks their progress as they run.
//!
//! ## Architecture
//!
//! UR Tuft is organized as a workspace with multiple crates:
//!
//! 1. **urtuft-core** - Errors, the injected key-value store, progress tracking
//! 2. **urtuft-toolpath** - Raster decoding, toolpath compiler, chunking, job plans
//! 3. **urtuft-communication** - Script port delivery and the progress listener
//! 4. **urtuft-settings** - Configuration files and validation
//! 5. **urtuft** - The [`App`] wiring and the command line binary

pub mod app;

pub use app::App;

pub use urtuft_communication::{DeliveryOutcome, ListenerHandle, ProgressListener, ScriptClient};
pub use urtuft_core::{Error, ProgressEntry, ProgressEvent, ProgressStore, Result};
pub use urtuft_settings::Config;
pub use urtuft_toolpath::{
    compile, CompileOptions, JobContextStore, JobRegistration, PixelGrid, ProgramChunk,
    ToolpathMetadata,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output on stderr, so program text on stdout stays clean
/// - RUST_LOG environment variable support, INFO otherwise
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.as_str()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
