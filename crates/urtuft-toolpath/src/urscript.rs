//! URScript program text.
//!
//! Formatting is significant to the controller: positions and speeds use four
//! decimals, accelerations one, poses are `p[x, y, z, rx, ry, rz]` in metres
//! and radians. Every pose is wrapped in `pose_trans(<frame>, ...)` so the
//! plan stays valid when the frame is recalibrated.

use crate::compiler::CompileOptions;
use crate::plan::{Motion, MotionPhase, MovementBlock, TargetMm, ToolState};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tool orientation: pointing straight down.
pub const TOOL_ORIENTATION: [f64; 3] = [0.0, PI, 0.0];

/// Acceleration for travel and tufting moves.
pub const MOVE_ACCELERATION: f64 = 1.2;

/// Acceleration for plunge and retract moves.
pub const APPROACH_ACCELERATION: f64 = 0.8;

/// Socket name used by the telemetry bootstrap.
pub const PROGRESS_SOCKET: &str = "progress_socket";

/// Name of the default-pose global.
pub const DEFAULT_POSE_VAR: &str = "default_pose";

/// Descent per contact probing step, in millimetres.
pub const CONTACT_PROBE_STEP_MM: f64 = 1.0;

const INDENT: &str = "    ";

/// Named reference pose all targets are expressed relative to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFrame {
    /// URScript global holding the pose.
    pub name: String,
    /// Pose in metres and radians.
    pub pose: [f64; 6],
}

impl Default for CoordinateFrame {
    fn default() -> Self {
        Self {
            name: "tuft_frame".to_string(),
            pose: [0.0; 6],
        }
    }
}

/// Where the running program reports its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryTarget {
    /// Host the controller connects back to.
    pub host: String,
    /// Progress listener port.
    pub port: u16,
}

/// Rendering options that do not influence the compiled motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Name of the generated `def`.
    pub program_name: String,
    /// Human readable job label, shown on the teach pendant.
    pub job_label: String,
    /// Progress reporting; `None` renders a program without telemetry.
    pub telemetry: Option<TelemetryTarget>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            program_name: "tuft_program".to_string(),
            job_label: "upload".to_string(),
            telemetry: None,
        }
    }
}

/// Millimetres to metres.
pub fn mm_to_m(value_mm: f64) -> f64 {
    value_mm / 1000.0
}

/// Render a pose literal.
pub fn format_pose(pose: &[f64; 6]) -> String {
    format!(
        "p[{:.4}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}]",
        pose[0], pose[1], pose[2], pose[3], pose[4], pose[5]
    )
}

/// Tool pose for a millimetre target.
pub fn tool_pose(target: TargetMm) -> [f64; 6] {
    [
        mm_to_m(target.x),
        mm_to_m(target.y),
        mm_to_m(target.z),
        TOOL_ORIENTATION[0],
        TOOL_ORIENTATION[1],
        TOOL_ORIENTATION[2],
    ]
}

/// `movel` relative to `frame`.
pub fn movel(frame: &str, motion: &Motion) -> String {
    format!(
        "movel(pose_trans({}, {}), a={:.1}, v={:.4})",
        frame,
        format_pose(&tool_pose(motion.target)),
        motion.acceleration(),
        mm_to_m(motion.velocity_mm_s)
    )
}

/// Force-guarded descent onto the surface.
///
/// The tool steps down `contact_probe_step` at a time, in frame coordinates,
/// while the TCP force stays under `contact_force_threshold` and more than a
/// step remains above the surface. The final move to the target only runs
/// when no contact was felt on the way down.
pub fn guarded_plunge(frame: &str, motion: &Motion) -> String {
    let surface_z = mm_to_m(motion.target.z);
    let acceleration = motion.acceleration();
    let velocity = mm_to_m(motion.velocity_mm_s);
    [
        format!(
            "contact_pose = pose_trans(pose_inv({}), get_actual_tcp_pose())",
            frame
        ),
        format!(
            "while norm(get_tcp_force()) < contact_force_threshold and contact_pose[2] - contact_probe_step > {:.4}:",
            surface_z
        ),
        format!("{}contact_pose = pose_add(contact_pose, p[0, 0, -contact_probe_step, 0, 0, 0])", INDENT),
        format!(
            "{}movel(pose_trans({}, contact_pose), a={:.1}, v={:.4})",
            INDENT, frame, acceleration, velocity
        ),
        "end".to_string(),
        "if norm(get_tcp_force()) < contact_force_threshold:".to_string(),
        format!("{}{}", INDENT, movel(frame, motion)),
        "end".to_string(),
    ]
    .join("\n")
}

/// Statement for a motion: plunges are force guarded, everything else is a
/// plain `movel`.
pub fn motion_statement(frame: &str, motion: &Motion) -> String {
    match motion.phase {
        MotionPhase::Plunge => guarded_plunge(frame, motion),
        _ => movel(frame, motion),
    }
}

/// `set_digital_out` for the tool output.
pub fn set_digital_out(output: u8, state: ToolState) -> String {
    format!("set_digital_out({}, {})", output, state.as_urscript())
}

/// Quote a string literal.
pub fn quote(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// `textmsg` statement.
pub fn textmsg(message: &str) -> String {
    format!("textmsg({})", quote(message))
}

/// Incrementally builds one self-contained program.
///
/// ```rust,ignore
/// let mut writer = ProgramWriter::new(&options, &render, "job", 12);
/// writer.header("Starting", 0);
/// for block in &blocks { writer.block(block); }
/// let text = writer.finish("Done");
/// ```
pub struct ProgramWriter<'a> {
    options: &'a CompileOptions,
    render: &'a RenderOptions,
    job_id: &'a str,
    total_motions: u64,
    lines: Vec<String>,
}

impl<'a> ProgramWriter<'a> {
    /// Start a program for `job_id`; `total_motions` is the job-wide total.
    pub fn new(
        options: &'a CompileOptions,
        render: &'a RenderOptions,
        job_id: &'a str,
        total_motions: u64,
    ) -> Self {
        Self {
            options,
            render,
            job_id,
            total_motions,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, statement: impl AsRef<str>) {
        for line in statement.as_ref().lines() {
            self.lines.push(format!("{}{}", INDENT, line));
        }
    }

    /// Definition line, frame and default pose globals, safety preamble and,
    /// when enabled, the telemetry bootstrap with its counter pre-set to
    /// `progress_start`.
    pub fn header(&mut self, message: &str, progress_start: u64) {
        let options = self.options;
        self.lines.push(format!("def {}():", self.render.program_name));
        self.push(format!(
            "global {} = {}",
            options.frame.name,
            format_pose(&options.frame.pose)
        ));
        self.push(format!(
            "global {} = {}",
            DEFAULT_POSE_VAR,
            format_pose(&tool_pose(TargetMm::new(0.0, 0.0, options.safe_height_mm)))
        ));
        self.push(textmsg(message));
        self.push(set_digital_out(options.tool_output, ToolState::Off));
        self.push(format!(
            "global travel_speed = {:.4}",
            mm_to_m(options.travel_speed_mm_s)
        ));
        self.push(format!(
            "global tuft_speed = {:.4}",
            mm_to_m(options.tuft_speed_mm_s)
        ));
        self.push(format!(
            "global contact_force_threshold = {:.2}",
            options.contact_force_threshold_n
        ));
        self.push(format!(
            "global contact_probe_step = {:.4}",
            mm_to_m(CONTACT_PROBE_STEP_MM)
        ));
        self.push(format!("global contact_pose = {}", format_pose(&[0.0; 6])));

        if let Some(telemetry) = &self.render.telemetry {
            self.push(format!(
                "socket_open({}, {}, {})",
                quote(&telemetry.host),
                telemetry.port,
                quote(PROGRESS_SOCKET)
            ));
            self.push(format!("global progress_current = {}", progress_start));
        }
    }

    /// A plan block, followed by a progress report when it is a motion.
    pub fn block(&mut self, block: &MovementBlock) {
        self.push(&block.statement);
        if block.is_motion() {
            self.progress_report();
        }
    }

    fn progress_report(&mut self) {
        if self.render.telemetry.is_none() {
            return;
        }
        self.push("progress_current = progress_current + 1");
        let prefix = quote(&format!("{{jobId:{},current:", quote(self.job_id)));
        let suffix = quote(&format!(",total:{}}}", self.total_motions));
        self.push(format!(
            "socket_send_line(str_cat({}, str_cat(to_str(progress_current), {})), {})",
            prefix,
            suffix,
            quote(PROGRESS_SOCKET)
        ));
    }

    /// Completion message, tool off, `end` and the invocation line.
    pub fn finish(mut self, message: &str) -> String {
        let output = self.options.tool_output;
        self.push(set_digital_out(output, ToolState::Off));
        self.push(textmsg(message));
        if self.render.telemetry.is_some() {
            self.push(format!("socket_close({})", quote(PROGRESS_SOCKET)));
        }
        self.lines.push("end".to_string());
        self.lines.push(format!("{}()", self.render.program_name));

        let mut program = self.lines.join("\n");
        program.push('\n');
        program
    }
}
