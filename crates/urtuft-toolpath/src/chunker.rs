//! Program Chunker
//!
//! The controller rejects programs with too many motion instructions, so a
//! plan is split into chunks that each stay under a ceiling. Chunk boundaries
//! always fall on segment boundaries: a tufting stroke is never split between
//! two programs. A single segment larger than the ceiling still gets a chunk
//! of its own.

use crate::compiler::CompileOptions;
use crate::plan::{motion_count, MovementBlock};
use crate::urscript::{ProgramWriter, RenderOptions};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Default motion-instruction ceiling per program.
pub const DEFAULT_MAX_MOTIONS_PER_CHUNK: usize = 500;

/// A block range of the plan, before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start_index: usize,
    pub end_index: usize,
    pub motion_count: usize,
    /// Motions completed before this chunk starts.
    pub progress_start: usize,
}

/// One rendered, self-contained program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramChunk {
    pub program: String,
    pub start_index: usize,
    pub end_index: usize,
    pub block_count: usize,
    pub motion_count: usize,
    pub progress_start: usize,
}

/// Partition `blocks` at segment boundaries.
///
/// `segment_blocks` lists the block range of every segment in emission
/// order. Blocks outside any segment stay with their neighbours. An empty
/// plan yields no chunks; a non-empty one always yields at least one.
pub fn plan_chunks(
    blocks: &[MovementBlock],
    segment_blocks: &[Range<usize>],
    max_motions: usize,
) -> Vec<ChunkRange> {
    if blocks.is_empty() {
        return Vec::new();
    }

    let max_motions = max_motions.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut pending_motions = 0;
    let mut progress = 0;

    let close = |chunks: &mut Vec<ChunkRange>, start: usize, end: usize, progress: &mut usize| {
        let motions = motion_count(&blocks[start..end]);
        chunks.push(ChunkRange {
            start_index: start,
            end_index: end,
            motion_count: motions,
            progress_start: *progress,
        });
        *progress += motions;
    };

    for range in segment_blocks {
        let segment_motions = motion_count(&blocks[range.clone()]);
        if pending_motions > 0 && pending_motions + segment_motions > max_motions {
            close(&mut chunks, start, range.start, &mut progress);
            start = range.start;
            pending_motions = 0;
        }
        pending_motions += segment_motions;
    }
    close(&mut chunks, start, blocks.len(), &mut progress);

    chunks
}

/// Render every chunk of a plan.
pub fn render_chunks(
    job_id: &str,
    blocks: &[MovementBlock],
    ranges: &[ChunkRange],
    options: &CompileOptions,
    render: &RenderOptions,
) -> Vec<ProgramChunk> {
    let total_motions = motion_count(blocks) as u64;
    let parts = ranges.len();

    ranges
        .iter()
        .enumerate()
        .map(|(index, range)| {
            let mut writer = ProgramWriter::new(options, render, job_id, total_motions);
            writer.header(
                &format!(
                    "Starting tufting job {} (part {}/{})",
                    render.job_label,
                    index + 1,
                    parts
                ),
                range.progress_start as u64,
            );
            for block in &blocks[range.start_index..range.end_index] {
                writer.block(block);
            }
            let program = writer.finish(&format!("Tufting job part {}/{} finished", index + 1, parts));

            ProgramChunk {
                program,
                start_index: range.start_index,
                end_index: range.end_index,
                block_count: range.end_index - range.start_index,
                motion_count: range.motion_count,
                progress_start: range.progress_start,
            }
        })
        .collect()
}
