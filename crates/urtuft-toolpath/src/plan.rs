//! Motion plan data model.
//!
//! A compiled job is an ordered list of [`MovementBlock`]s. Each block is
//! either a linear move or a tool-output switch, and carries both its rendered
//! URScript statement and the numeric data it was rendered from, so nothing
//! ever has to parse generated program text back into numbers.

use crate::urscript;
use serde::{Deserialize, Serialize};

/// Contiguous vertical run of active pixels within one image column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Image column.
    pub column: u32,
    /// First active row (inclusive).
    pub start_row: u32,
    /// Last active row (inclusive).
    pub end_row: u32,
}

impl Segment {
    /// Number of pixels covered.
    pub fn pixel_count(&self) -> u32 {
        self.end_row - self.start_row + 1
    }
}

/// Millimetre extents covering every active pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBoxMm {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBoxMm {
    /// Width in millimetres.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height in millimetres.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Target position in millimetres, relative to the coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetMm {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TargetMm {
    /// Create a target.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Same XY, different height.
    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }
}

/// Role of a motion within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionPhase {
    /// Travel at safe height to above the segment start
    Approach,
    /// Descend from safe height to the surface
    Plunge,
    /// Tufting stroke at surface height
    Traverse,
    /// Ascend back to safe height
    Retract,
    /// Scrubbing move at safe height
    Hover,
}

impl MotionPhase {
    /// Controller acceleration used for this phase.
    pub fn acceleration(self) -> f64 {
        match self {
            MotionPhase::Plunge | MotionPhase::Retract => urscript::APPROACH_ACCELERATION,
            MotionPhase::Approach | MotionPhase::Traverse | MotionPhase::Hover => {
                urscript::MOVE_ACCELERATION
            }
        }
    }
}

/// A linear move to a target pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Motion {
    pub phase: MotionPhase,
    pub target: TargetMm,
    /// Tool speed in mm/s.
    pub velocity_mm_s: f64,
}

impl Motion {
    /// Acceleration passed to `movel`.
    pub fn acceleration(&self) -> f64 {
        self.phase.acceleration()
    }

    /// The same move lifted to `safe_height_mm`, as a hover.
    pub fn hovering(&self, safe_height_mm: f64, travel_speed_mm_s: f64) -> Motion {
        Motion {
            phase: MotionPhase::Hover,
            target: self.target.with_z(safe_height_mm),
            velocity_mm_s: travel_speed_mm_s,
        }
    }
}

/// Tool output state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    #[default]
    Off,
    On,
}

impl ToolState {
    /// Switch towards `target`; `None` when already there.
    ///
    /// This is the only way to obtain a [`ToolSwitch`], so a block that
    /// toggles the output to the state it is already in cannot be built.
    pub fn switch_to(self, target: ToolState) -> Option<ToolSwitch> {
        (self != target).then_some(ToolSwitch { to: target })
    }

    /// URScript boolean literal.
    pub fn as_urscript(self) -> &'static str {
        match self {
            ToolState::Off => "False",
            ToolState::On => "True",
        }
    }
}

/// A change of tool output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolSwitch {
    to: ToolState,
}

impl ToolSwitch {
    /// State after the switch.
    pub fn target(&self) -> ToolState {
        self.to
    }
}

/// What a block does.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlockKind {
    Motion(Motion),
    Tool(ToolSwitch),
}

/// Smallest schedulable unit of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementBlock {
    pub kind: BlockKind,
    /// Rendered URScript statement, without indentation.
    pub statement: String,
    /// Index of the segment that emitted this block.
    pub segment: Option<usize>,
}

impl MovementBlock {
    /// Motion block rendered relative to `frame`.
    pub fn motion(motion: Motion, frame: &str, segment: Option<usize>) -> Self {
        Self {
            statement: urscript::motion_statement(frame, &motion),
            kind: BlockKind::Motion(motion),
            segment,
        }
    }

    /// Tool switch block on digital output `output`.
    pub fn tool(switch: ToolSwitch, output: u8, segment: Option<usize>) -> Self {
        Self {
            statement: urscript::set_digital_out(output, switch.target()),
            kind: BlockKind::Tool(switch),
            segment,
        }
    }

    /// Whether this block moves the robot.
    pub fn is_motion(&self) -> bool {
        matches!(self.kind, BlockKind::Motion(_))
    }

    /// The motion, if any.
    pub fn as_motion(&self) -> Option<&Motion> {
        match &self.kind {
            BlockKind::Motion(motion) => Some(motion),
            BlockKind::Tool(_) => None,
        }
    }

    /// Literal target of a motion block.
    pub fn target(&self) -> Option<TargetMm> {
        self.as_motion().map(|motion| motion.target)
    }
}

/// Count motion blocks in `blocks`.
pub fn motion_count(blocks: &[MovementBlock]) -> usize {
    blocks.iter().filter(|block| block.is_motion()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_to_same_state_is_none() {
        assert!(ToolState::Off.switch_to(ToolState::Off).is_none());
        assert!(ToolState::On.switch_to(ToolState::On).is_none());
        let switch = ToolState::Off.switch_to(ToolState::On).unwrap();
        assert_eq!(switch.target(), ToolState::On);
    }

    #[test]
    fn test_hovering_keeps_xy() {
        let motion = Motion {
            phase: MotionPhase::Traverse,
            target: TargetMm::new(10.0, 20.0, 145.0),
            velocity_mm_s: 60.0,
        };
        let hover = motion.hovering(150.0, 200.0);
        assert_eq!(hover.phase, MotionPhase::Hover);
        assert_eq!(hover.target, TargetMm::new(10.0, 20.0, 150.0));
        assert_eq!(hover.velocity_mm_s, 200.0);
    }

    #[test]
    fn test_block_target() {
        let motion = Motion {
            phase: MotionPhase::Plunge,
            target: TargetMm::new(1.0, 2.0, 3.0),
            velocity_mm_s: 200.0,
        };
        let block = MovementBlock::motion(motion, "tuft_frame", Some(0));
        assert!(block.is_motion());
        assert_eq!(block.target(), Some(TargetMm::new(1.0, 2.0, 3.0)));

        let switch = ToolState::Off.switch_to(ToolState::On).unwrap();
        let block = MovementBlock::tool(switch, 2, Some(0));
        assert!(!block.is_motion());
        assert_eq!(block.target(), None);
        assert_eq!(block.statement, "set_digital_out(2, True)");
    }
}
