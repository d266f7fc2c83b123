//! Application wiring
//!
//! [`App`] owns the configuration and the two stores and glues the compiler,
//! the job store and the transport together. It is what a request layer or
//! the command line talks to.

use std::path::Path;
use std::sync::Arc;
use urtuft_communication::{
    deliver_or_skip, DeliveryOutcome, ListenerHandle, ProgramDelivery, ProgressListener,
};
use urtuft_core::{Error, ProgressEntry, ProgressStore, Result};
use urtuft_settings::Config;
use urtuft_toolpath::{compile, JobContextStore, JobRegistration, PixelGrid};

/// Compiler, stores and transport behind one handle.
pub struct App {
    config: Config,
    jobs: JobContextStore,
    progress: Arc<ProgressStore>,
}

impl App {
    /// Fresh in-memory stores for `config`.
    pub fn new(config: Config) -> Self {
        let jobs = JobContextStore::new(
            urtuft_core::InMemoryStore::new(),
            config.toolpath.max_motions_per_chunk,
        );
        Self {
            config,
            jobs,
            progress: Arc::new(ProgressStore::in_memory()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn jobs(&self) -> &JobContextStore {
        &self.jobs
    }

    pub fn progress(&self) -> &Arc<ProgressStore> {
        &self.progress
    }

    /// Compile `grid` and register the plan under a new job id.
    ///
    /// Nothing is registered when compilation fails.
    pub fn submit(&self, grid: &PixelGrid, label: &str) -> Result<JobRegistration> {
        let compiled = compile(grid, &self.config.compile_options())?;
        Ok(self
            .jobs
            .register(compiled, self.config.render_options(label), &self.progress))
    }

    /// Decode an image file and [`submit`](Self::submit) it, labelled by file stem.
    pub fn submit_file(&self, path: &Path) -> Result<JobRegistration> {
        let grid = PixelGrid::from_file(path)?;
        let label = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.submit(&grid, &label)
    }

    /// Send `program` to the configured controller, if any.
    pub async fn deliver(&self, program: &str) -> DeliveryOutcome {
        let client = self.config.script_client();
        deliver_or_skip(
            client.as_ref().map(|client| client as &dyn ProgramDelivery),
            program,
        )
        .await
    }

    /// Deliver chunk `index` of a registered job.
    pub async fn deliver_chunk(&self, job_id: &str, index: usize) -> Result<DeliveryOutcome> {
        let context = self.jobs.get(job_id)?;
        let chunk = context
            .chunks
            .get(index)
            .ok_or_else(|| Error::ChunkOutOfRange {
                job_id: job_id.to_string(),
                index,
                chunks: context.chunks.len(),
            })?;
        tracing::info!(
            job_id,
            chunk = index,
            motions = chunk.motion_count,
            "Delivering program chunk"
        );
        Ok(self.deliver(&chunk.program).await)
    }

    /// Pause a job; the resume position freezes at its current progress.
    pub fn pause(&self, job_id: &str) -> Result<ProgressEntry> {
        self.progress
            .mark_job_paused(job_id)
            .ok_or_else(|| not_found(job_id))
    }

    /// Deliver the rest of a job from its last confirmed position.
    ///
    /// `Ok(None)` when the job has already finished.
    pub async fn resume(&self, job_id: &str) -> Result<Option<DeliveryOutcome>> {
        let from = self.progress.get_resume_position(job_id);
        let Some(resume) = self.jobs.build_resume_program(job_id, from)? else {
            return Ok(None);
        };
        self.progress.resume_job(job_id);
        tracing::info!(job_id, from, motions = resume.motion_count, "Resuming job");
        Ok(Some(self.deliver(&resume.program).await))
    }

    /// Hover over step `step` and move the job's progress there.
    ///
    /// `Ok(None)` when the step is out of range.
    pub async fn seek(&self, job_id: &str, step: u64) -> Result<Option<DeliveryOutcome>> {
        let Some(program) = self.jobs.build_seek_program(job_id, step)? else {
            return Ok(None);
        };
        let index = i64::try_from(step).unwrap_or(i64::MAX);
        self.progress.override_progress(job_id, index);
        Ok(Some(self.deliver(&program).await))
    }

    /// Start the progress listener when telemetry is enabled.
    pub async fn start_listener(&self) -> Result<Option<ListenerHandle>> {
        if !self.config.telemetry.enabled {
            return Ok(None);
        }
        let listener =
            ProgressListener::bind(&self.config.listener_address(), Arc::clone(&self.progress))
                .await?;
        Ok(Some(listener.spawn()?))
    }
}

fn not_found(job_id: &str) -> Error {
    Error::JobNotFound {
        job_id: job_id.to_string(),
    }
}
