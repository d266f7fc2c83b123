//! Toolpath Compiler
//!
//! Converts a greyscale pixel grid into an ordered motion plan for the
//! tufting gun. Each image column is scanned top to bottom; every contiguous
//! run of dark pixels becomes one [`Segment`] and one tufting stroke:
//! approach at safe height, plunge, gun on, traverse, gun off, retract.
//!
//! Heights are absolute Z coordinates in the coordinate frame, Z pointing
//! away from the work surface, so the surface height must sit below the safe
//! height.

use crate::plan::{
    motion_count, BoundingBoxMm, Motion, MotionPhase, MovementBlock, Segment, TargetMm, ToolState,
};
use crate::raster::PixelGrid;
use crate::urscript::CoordinateFrame;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use urtuft_core::CompileError;

/// Motions emitted for a segment the tool is not already above.
pub const MOTIONS_PER_SEGMENT: usize = 4;

/// Highest standard digital output on the controller.
pub const MAX_TOOL_OUTPUT: u8 = 7;

/// Smallest contact force a plunge may be guarded with.
pub const MIN_CONTACT_FORCE_N: f64 = 0.5;

/// Compilation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Workpiece width in millimetres (image X axis)
    pub workpiece_width_mm: f64,
    /// Workpiece height in millimetres (image Y axis)
    pub workpiece_height_mm: f64,
    /// Margin kept free on every side of the workpiece
    pub margin_mm: f64,
    /// Clearance height for travel moves
    pub safe_height_mm: f64,
    /// Height at which the tool contacts the surface
    pub surface_height_mm: f64,
    /// Pixels with intensity at or below this value are tufted
    pub black_pixel_threshold: u8,
    /// Travel speed in mm/s (also used for plunge and retract)
    pub travel_speed_mm_s: f64,
    /// Tufting speed in mm/s
    pub tuft_speed_mm_s: f64,
    /// Digital output driving the tufting gun
    pub tool_output: u8,
    /// TCP force in newtons that stops a plunge early
    pub contact_force_threshold_n: f64,
    /// Reference frame for every emitted pose
    pub frame: CoordinateFrame,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            workpiece_width_mm: 500.0,
            workpiece_height_mm: 500.0,
            margin_mm: 0.0,
            safe_height_mm: 150.0,
            surface_height_mm: 145.0,
            black_pixel_threshold: 64,
            travel_speed_mm_s: 200.0,
            tuft_speed_mm_s: 60.0,
            tool_output: 0,
            contact_force_threshold_n: 15.0,
            frame: CoordinateFrame::default(),
        }
    }
}

impl CompileOptions {
    /// Reject option sets that cannot produce a physically meaningful plan.
    pub fn validate(&self) -> Result<(), CompileError> {
        if !(self.surface_height_mm < self.safe_height_mm) {
            return Err(CompileError::InvalidHeights {
                safe_mm: self.safe_height_mm,
                surface_mm: self.surface_height_mm,
            });
        }

        let positive = [
            ("workpiece_width_mm", self.workpiece_width_mm),
            ("workpiece_height_mm", self.workpiece_height_mm),
            ("travel_speed_mm_s", self.travel_speed_mm_s),
            ("tuft_speed_mm_s", self.tuft_speed_mm_s),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(invalid(name, format!("must be > 0, got {}", value)));
            }
        }

        if self.tool_output > MAX_TOOL_OUTPUT {
            return Err(invalid(
                "tool_output",
                format!("must be 0-{}, got {}", MAX_TOOL_OUTPUT, self.tool_output),
            ));
        }

        if !(self.contact_force_threshold_n >= MIN_CONTACT_FORCE_N)
            || !self.contact_force_threshold_n.is_finite()
        {
            return Err(invalid(
                "contact_force_threshold_n",
                format!(
                    "must be at least {}N, got {}",
                    MIN_CONTACT_FORCE_N, self.contact_force_threshold_n
                ),
            ));
        }

        if !(self.margin_mm >= 0.0) {
            return Err(invalid("margin_mm", "must not be negative"));
        }
        if self.margin_mm * 2.0 >= self.workpiece_width_mm.min(self.workpiece_height_mm) {
            return Err(invalid(
                "margin_mm",
                format!("{}mm leaves no working area", self.margin_mm),
            ));
        }

        if !is_identifier(&self.frame.name) {
            return Err(invalid(
                "frame.name",
                format!("'{}' is not a valid URScript identifier", self.frame.name),
            ));
        }

        Ok(())
    }

    /// Vertical distance covered by one plunge or retract.
    pub fn plunge_depth_mm(&self) -> f64 {
        self.safe_height_mm - self.surface_height_mm
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> CompileError {
    CompileError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Summary statistics of a compiled plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolpathMetadata {
    pub estimated_cycle_time_seconds: u64,
    pub resolution: String,
    pub image_width: u32,
    pub image_height: u32,
    pub tuft_segments: usize,
    pub active_pixels: u64,
    pub bounding_box_mm: Option<BoundingBoxMm>,
    /// Motion instructions in the plan; the job-wide progress total.
    pub movement_count: usize,
    pub motion_instruction_count: usize,
    /// All blocks, tool switches included.
    pub block_count: usize,
}

/// Compiler output.
#[derive(Debug, Clone)]
pub struct CompiledToolpath {
    pub blocks: Vec<MovementBlock>,
    pub segments: Vec<Segment>,
    /// Block range emitted for each segment, parallel to `segments`.
    pub segment_blocks: Vec<Range<usize>>,
    pub metadata: ToolpathMetadata,
    pub options: CompileOptions,
}

impl CompiledToolpath {
    /// Whether there is nothing to tuft.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Maps pixel indices to millimetres inside the margin-inset working area.
#[derive(Debug, Clone, Copy)]
struct PixelMapping {
    margin_mm: f64,
    pitch_x_mm: f64,
    pitch_y_mm: f64,
}

impl PixelMapping {
    fn new(options: &CompileOptions, width: u32, height: u32) -> Self {
        let margin = options.margin_mm;
        Self {
            margin_mm: margin,
            pitch_x_mm: (options.workpiece_width_mm - 2.0 * margin) / width as f64,
            pitch_y_mm: (options.workpiece_height_mm - 2.0 * margin) / height as f64,
        }
    }

    fn x(&self, column: u32) -> f64 {
        self.margin_mm + (column as f64 + 0.5) * self.pitch_x_mm
    }

    fn y(&self, row: u32) -> f64 {
        self.margin_mm + (row as f64 + 0.5) * self.pitch_y_mm
    }

    /// Box over pixel edges, so a single pixel still has a positive extent.
    fn bounding_box(&self, columns: (u32, u32), rows: (u32, u32)) -> BoundingBoxMm {
        BoundingBoxMm {
            min_x: self.margin_mm + columns.0 as f64 * self.pitch_x_mm,
            max_x: self.margin_mm + (columns.1 + 1) as f64 * self.pitch_x_mm,
            min_y: self.margin_mm + rows.0 as f64 * self.pitch_y_mm,
            max_y: self.margin_mm + (rows.1 + 1) as f64 * self.pitch_y_mm,
        }
    }
}

/// Scan result before any motion is emitted.
#[derive(Debug, Default)]
struct RasterScan {
    segments: Vec<Segment>,
    active_pixels: u64,
    columns: Option<(u32, u32)>,
    rows: Option<(u32, u32)>,
}

impl RasterScan {
    fn run(grid: &PixelGrid, threshold: u8) -> Self {
        let mut scan = RasterScan::default();
        for column in 0..grid.width() {
            let mut row = 0;
            while row < grid.height() {
                if grid.intensity(column, row) > threshold {
                    row += 1;
                    continue;
                }
                let start = row;
                while row < grid.height() && grid.intensity(column, row) <= threshold {
                    row += 1;
                }
                scan.add(Segment {
                    column,
                    start_row: start,
                    end_row: row - 1,
                });
            }
        }
        scan
    }

    fn add(&mut self, segment: Segment) {
        self.active_pixels += segment.pixel_count() as u64;
        self.columns = Some(match self.columns {
            Some((min, max)) => (min.min(segment.column), max.max(segment.column)),
            None => (segment.column, segment.column),
        });
        self.rows = Some(match self.rows {
            Some((min, max)) => (min.min(segment.start_row), max.max(segment.end_row)),
            None => (segment.start_row, segment.end_row),
        });
        self.segments.push(segment);
    }
}

/// Emits blocks while tracking tool position, output state and distances.
struct Emitter<'a> {
    options: &'a CompileOptions,
    blocks: Vec<MovementBlock>,
    tool: ToolState,
    last_safe: Option<(f64, f64)>,
    last_surface: Option<(f64, f64)>,
    travel_distance_mm: f64,
    tuft_distance_mm: f64,
    vertical_distance_mm: f64,
}

impl<'a> Emitter<'a> {
    fn new(options: &'a CompileOptions) -> Self {
        Self {
            options,
            blocks: Vec::new(),
            tool: ToolState::Off,
            last_safe: None,
            last_surface: None,
            travel_distance_mm: 0.0,
            tuft_distance_mm: 0.0,
            vertical_distance_mm: 0.0,
        }
    }

    fn motion(&mut self, phase: MotionPhase, target: TargetMm, velocity: f64, segment: usize) {
        let motion = Motion {
            phase,
            target,
            velocity_mm_s: velocity,
        };
        self.blocks.push(MovementBlock::motion(
            motion,
            &self.options.frame.name,
            Some(segment),
        ));
    }

    fn approach(&mut self, x: f64, y: f64, segment: usize) {
        if self.last_safe == Some((x, y)) {
            return;
        }
        if let Some((last_x, last_y)) = self.last_safe {
            self.travel_distance_mm += (x - last_x).hypot(y - last_y);
        }
        let target = TargetMm::new(x, y, self.options.safe_height_mm);
        self.motion(
            MotionPhase::Approach,
            target,
            self.options.travel_speed_mm_s,
            segment,
        );
        self.last_safe = Some((x, y));
    }

    fn plunge(&mut self, x: f64, y: f64, segment: usize) {
        self.vertical_distance_mm += self.options.plunge_depth_mm();
        let target = TargetMm::new(x, y, self.options.surface_height_mm);
        self.motion(
            MotionPhase::Plunge,
            target,
            self.options.travel_speed_mm_s,
            segment,
        );
        self.last_surface = Some((x, y));
    }

    fn traverse(&mut self, x: f64, y: f64, segment: usize) {
        if let Some((last_x, last_y)) = self.last_surface {
            self.tuft_distance_mm += (x - last_x).hypot(y - last_y);
        }
        let target = TargetMm::new(x, y, self.options.surface_height_mm);
        self.motion(
            MotionPhase::Traverse,
            target,
            self.options.tuft_speed_mm_s,
            segment,
        );
        self.last_surface = Some((x, y));
    }

    fn retract(&mut self, x: f64, y: f64, segment: usize) {
        self.vertical_distance_mm += self.options.plunge_depth_mm();
        let target = TargetMm::new(x, y, self.options.safe_height_mm);
        self.motion(
            MotionPhase::Retract,
            target,
            self.options.travel_speed_mm_s,
            segment,
        );
        self.last_surface = None;
        self.last_safe = Some((x, y));
    }

    fn ensure_tool(&mut self, desired: ToolState, segment: usize) {
        if let Some(switch) = self.tool.switch_to(desired) {
            self.blocks.push(MovementBlock::tool(
                switch,
                self.options.tool_output,
                Some(segment),
            ));
            self.tool = switch.target();
        }
    }

    fn estimated_cycle_time_seconds(&self) -> u64 {
        let travel = self.travel_distance_mm / self.options.travel_speed_mm_s;
        let tuft = self.tuft_distance_mm / self.options.tuft_speed_mm_s;
        let vertical = self.vertical_distance_mm / self.options.travel_speed_mm_s;
        (travel + tuft + vertical).round() as u64
    }
}

/// Compile `grid` into a motion plan.
///
/// Fails without side effects on invalid options.
pub fn compile(grid: &PixelGrid, options: &CompileOptions) -> Result<CompiledToolpath, CompileError> {
    options.validate()?;

    let (width, height) = (grid.width(), grid.height());
    let scan = RasterScan::run(grid, options.black_pixel_threshold);
    let mapping = PixelMapping::new(options, width, height);

    let mut metadata = ToolpathMetadata {
        estimated_cycle_time_seconds: 0,
        resolution: format!("{}x{}", width, height),
        image_width: width,
        image_height: height,
        tuft_segments: scan.segments.len(),
        active_pixels: scan.active_pixels,
        bounding_box_mm: None,
        movement_count: 0,
        motion_instruction_count: 0,
        block_count: 0,
    };

    let (columns, rows) = match (scan.columns, scan.rows) {
        (Some(columns), Some(rows)) => (columns, rows),
        _ => {
            tracing::info!(resolution = %metadata.resolution, "No active pixels; nothing to tuft");
            return Ok(CompiledToolpath {
                blocks: Vec::new(),
                segments: Vec::new(),
                segment_blocks: Vec::new(),
                metadata,
                options: options.clone(),
            });
        }
    };
    metadata.bounding_box_mm = Some(mapping.bounding_box(columns, rows));

    let mut emitter = Emitter::new(options);
    let mut segment_blocks = Vec::with_capacity(scan.segments.len());

    for (index, segment) in scan.segments.iter().enumerate() {
        let first_block = emitter.blocks.len();
        let x = mapping.x(segment.column);
        let start_y = mapping.y(segment.start_row);
        let end_y = mapping.y(segment.end_row);

        emitter.approach(x, start_y, index);
        emitter.plunge(x, start_y, index);
        emitter.ensure_tool(ToolState::On, index);
        emitter.traverse(x, end_y, index);
        emitter.ensure_tool(ToolState::Off, index);
        emitter.retract(x, end_y, index);

        segment_blocks.push(first_block..emitter.blocks.len());
    }

    let motions = motion_count(&emitter.blocks);
    metadata.estimated_cycle_time_seconds = emitter.estimated_cycle_time_seconds();
    metadata.movement_count = motions;
    metadata.motion_instruction_count = motions;
    metadata.block_count = emitter.blocks.len();

    tracing::info!(
        resolution = %metadata.resolution,
        segments = metadata.tuft_segments,
        active_pixels = metadata.active_pixels,
        motions,
        estimated_seconds = metadata.estimated_cycle_time_seconds,
        "Compiled toolpath"
    );

    Ok(CompiledToolpath {
        blocks: emitter.blocks,
        segments: scan.segments,
        segment_blocks,
        metadata,
        options: options.clone(),
    })
}
