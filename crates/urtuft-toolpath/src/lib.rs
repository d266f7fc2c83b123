//! # UR Tuft Toolpath
//!
//! Turns a greyscale image into URScript programs for a tufting gun on a
//! Universal Robots arm, and keeps the compiled plans around so a job can be
//! resumed or scrubbed later.
//!
//! ## Pipeline
//!
//! - **Raster**: decode uploads into a single-channel [`PixelGrid`]
//! - **Compiler**: scan columns for dark runs and emit a [`MovementBlock`] plan
//! - **Chunker**: split the plan into [`ProgramChunk`]s under the controller's
//!   motion-instruction ceiling, never mid-segment
//! - **Jobs**: [`JobContextStore`] retains each plan and builds resume and seek
//!   programs against it
//! - **URScript**: program text rendering shared by all of the above

pub mod chunker;
pub mod compiler;
pub mod error;
pub mod job;
pub mod plan;
pub mod raster;
pub mod urscript;

pub use chunker::{
    plan_chunks, render_chunks, ChunkRange, ProgramChunk, DEFAULT_MAX_MOTIONS_PER_CHUNK,
};
pub use compiler::{
    compile, CompileOptions, CompiledToolpath, ToolpathMetadata, MAX_TOOL_OUTPUT,
    MIN_CONTACT_FORCE_N, MOTIONS_PER_SEGMENT,
};
pub use error::{ToolpathError, ToolpathResult};
pub use job::{JobContext, JobContextStore, JobRegistration};
pub use plan::{
    motion_count, BlockKind, BoundingBoxMm, Motion, MotionPhase, MovementBlock, Segment, TargetMm,
    ToolState, ToolSwitch,
};
pub use raster::PixelGrid;
pub use urscript::{CoordinateFrame, ProgramWriter, RenderOptions, TelemetryTarget};
