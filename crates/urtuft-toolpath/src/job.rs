//! Job Context Store
//!
//! Keeps every compiled plan for the lifetime of the process, keyed by job
//! identifier, and builds derived programs against it on demand: resuming
//! from a motion ordinal and seeking (hovering) to a single step.
//!
//! Step and resume indices are motion ordinals, the same numbers the running
//! program reports as progress. Tool switches are not counted.

use crate::chunker::{plan_chunks, render_chunks, ProgramChunk, DEFAULT_MAX_MOTIONS_PER_CHUNK};
use crate::compiler::{CompileOptions, CompiledToolpath, ToolpathMetadata};
use crate::error::{ToolpathError, ToolpathResult};
use crate::plan::{MovementBlock, TargetMm};
use crate::urscript::{ProgramWriter, RenderOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use urtuft_core::{InMemoryStore, KeyValueStore, ProgressEntry, ProgressStore};
use uuid::Uuid;

/// A compiled job, immutable once registered.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub blocks: Vec<MovementBlock>,
    pub chunks: Vec<ProgramChunk>,
    pub options: CompileOptions,
    pub render: RenderOptions,
    pub metadata: ToolpathMetadata,
    pub created_at: DateTime<Utc>,
    /// Block index of every motion, by motion ordinal.
    motion_blocks: Vec<usize>,
}

impl JobContext {
    fn new(job_id: String, compiled: CompiledToolpath, render: RenderOptions, max_motions: usize) -> Self {
        let ranges = plan_chunks(&compiled.blocks, &compiled.segment_blocks, max_motions);
        let chunks = render_chunks(&job_id, &compiled.blocks, &ranges, &compiled.options, &render);
        let motion_blocks = compiled
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.is_motion())
            .map(|(index, _)| index)
            .collect();

        Self {
            job_id,
            blocks: compiled.blocks,
            chunks,
            options: compiled.options,
            render,
            metadata: compiled.metadata,
            created_at: Utc::now(),
            motion_blocks,
        }
    }

    /// Motions in the plan; the job-wide progress total.
    pub fn movement_count(&self) -> usize {
        self.motion_blocks.len()
    }

    /// Block index of motion `step`.
    pub fn motion_block_index(&self, step: usize) -> Option<usize> {
        self.motion_blocks.get(step).copied()
    }

    /// Literal target of motion `step`.
    pub fn step_coordinates(&self, step: usize) -> Option<TargetMm> {
        self.motion_block_index(step)
            .and_then(|index| self.blocks[index].target())
    }

    /// One program covering every block from motion `from` to the end.
    ///
    /// The range starts right after the previous motion, so a tool switch
    /// that belongs before motion `from` is replayed. Returns `None` when
    /// there is nothing left to run.
    pub fn resume_program(&self, from: usize) -> Option<ProgramChunk> {
        if from >= self.movement_count() {
            return None;
        }
        let start_index = match from {
            0 => 0,
            _ => self.motion_blocks[from - 1] + 1,
        };
        let end_index = self.blocks.len();

        let mut writer = ProgramWriter::new(
            &self.options,
            &self.render,
            &self.job_id,
            self.movement_count() as u64,
        );
        writer.header(
            &format!(
                "Resuming tufting job {} at step {}/{}",
                self.render.job_label,
                from,
                self.movement_count()
            ),
            from as u64,
        );
        for block in &self.blocks[start_index..end_index] {
            writer.block(block);
        }
        let program = writer.finish(&format!("Tufting job {} finished", self.render.job_label));

        Some(ProgramChunk {
            program,
            start_index,
            end_index,
            block_count: end_index - start_index,
            motion_count: self.movement_count() - from,
            progress_start: from,
        })
    }

    /// A program that hovers over the target of motion `step`.
    ///
    /// The target height is replaced by the safe height whatever the motion
    /// originally was, so scrubbing never touches the surface. No telemetry
    /// is emitted.
    pub fn seek_program(&self, step: usize) -> Option<String> {
        let motion = self
            .motion_block_index(step)
            .and_then(|index| self.blocks[index].as_motion())?;
        let hover = motion.hovering(self.options.safe_height_mm, self.options.travel_speed_mm_s);
        let block = MovementBlock::motion(hover, &self.options.frame.name, None);

        let render = RenderOptions {
            program_name: format!("{}_seek", self.render.program_name),
            telemetry: None,
            ..self.render.clone()
        };
        let mut writer = ProgramWriter::new(&self.options, &render, &self.job_id, 0);
        writer.header(
            &format!("Seeking tufting job {} to step {}", self.render.job_label, step),
            0,
        );
        writer.block(&block);
        Some(writer.finish("Seek complete"))
    }
}

/// What the caller gets back from registering a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRegistration {
    pub job_id: String,
    pub metadata: ToolpathMetadata,
    pub chunks: Vec<ProgramChunk>,
}

/// Compiled plans by job identifier, over an injected store.
pub struct JobContextStore<S = InMemoryStore<Arc<JobContext>>> {
    contexts: S,
    max_motions_per_chunk: usize,
}

impl JobContextStore<InMemoryStore<Arc<JobContext>>> {
    /// Store backed by a fresh in-memory map with the default chunk ceiling.
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new(), DEFAULT_MAX_MOTIONS_PER_CHUNK)
    }
}

impl<S> JobContextStore<S>
where
    S: KeyValueStore<Arc<JobContext>>,
{
    /// Wrap `contexts`; chunks hold at most `max_motions_per_chunk` motions
    /// unless a single segment is larger.
    pub fn new(contexts: S, max_motions_per_chunk: usize) -> Self {
        Self {
            contexts,
            max_motions_per_chunk: max_motions_per_chunk.max(1),
        }
    }

    /// Motion ceiling per chunk.
    pub fn max_motions_per_chunk(&self) -> usize {
        self.max_motions_per_chunk
    }

    /// Chunk, render and store `compiled` under a fresh job id, and start
    /// tracking its progress at zero.
    pub fn register<P>(
        &self,
        compiled: CompiledToolpath,
        render: RenderOptions,
        progress: &ProgressStore<P>,
    ) -> JobRegistration
    where
        P: KeyValueStore<ProgressEntry>,
    {
        let job_id = Uuid::new_v4().to_string();
        let context = JobContext::new(job_id.clone(), compiled, render, self.max_motions_per_chunk);

        progress.register(&job_id, context.movement_count() as u64);

        tracing::info!(
            job_id = %job_id,
            label = %context.render.job_label,
            motions = context.movement_count(),
            chunks = context.chunks.len(),
            "Registered tufting job"
        );

        let registration = JobRegistration {
            job_id: job_id.clone(),
            metadata: context.metadata.clone(),
            chunks: context.chunks.clone(),
        };
        self.contexts.insert(job_id, Arc::new(context));
        registration
    }

    /// The stored context for `job_id`.
    pub fn get(&self, job_id: &str) -> ToolpathResult<Arc<JobContext>> {
        self.contexts
            .get(job_id)
            .ok_or_else(|| ToolpathError::JobNotFound(job_id.to_string()))
    }

    /// Identifiers of every stored job.
    pub fn job_ids(&self) -> Vec<String> {
        self.contexts.keys()
    }

    /// Resume program from motion `from_index`; `Ok(None)` when the job has
    /// no remaining motions.
    pub fn build_resume_program(
        &self,
        job_id: &str,
        from_index: u64,
    ) -> ToolpathResult<Option<ProgramChunk>> {
        let context = self.get(job_id)?;
        let program = to_index(from_index).and_then(|from| context.resume_program(from));
        if program.is_none() {
            tracing::debug!(job_id, from_index, "Nothing left to resume");
        }
        Ok(program)
    }

    /// Hover program for motion `step_index`; `Ok(None)` when out of range.
    pub fn build_seek_program(&self, job_id: &str, step_index: u64) -> ToolpathResult<Option<String>> {
        let context = self.get(job_id)?;
        Ok(to_index(step_index).and_then(|step| context.seek_program(step)))
    }

    /// Target of motion `step_index`.
    pub fn get_step_coordinates(
        &self,
        job_id: &str,
        step_index: u64,
    ) -> ToolpathResult<Option<TargetMm>> {
        let context = self.get(job_id)?;
        Ok(to_index(step_index).and_then(|step| context.step_coordinates(step)))
    }

    /// Target of the last motion the controller confirmed; `Ok(None)` before
    /// the first confirmation.
    pub fn get_last_recorded_coordinates<P>(
        &self,
        job_id: &str,
        progress: &ProgressStore<P>,
    ) -> ToolpathResult<Option<TargetMm>>
    where
        P: KeyValueStore<ProgressEntry>,
    {
        let context = self.get(job_id)?;
        let confirmed = progress.get_resume_position(job_id);
        Ok(match confirmed.checked_sub(1).and_then(to_index) {
            Some(step) => context.step_coordinates(step),
            None => None,
        })
    }
}

fn to_index(value: u64) -> Option<usize> {
    usize::try_from(value).ok()
}
