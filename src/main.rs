use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use urtuft::{init_logging, App, Config, DeliveryOutcome, JobRegistration, ProgressEvent};

#[derive(Parser, Debug)]
#[command(name = "urtuft", version, about)]
struct Cli {
    /// Configuration file (.toml or .json); defaults to the user config dir
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile an image and print its metadata and chunks
    Compile {
        image: PathBuf,
        /// Directory to write one .script file per chunk into
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the registration as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Compile an image, deliver it chunk by chunk and follow its progress
    Run {
        image: PathBuf,
        /// First chunk to deliver
        #[arg(long, default_value_t = 0)]
        chunk: usize,
    },
    /// Only run the progress listener
    Listen,
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::debug!(version = urtuft::VERSION, built = urtuft::BUILD_DATE, "Starting urtuft");

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let app = App::new(config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Compile {
                image,
                output,
                json,
            } => compile(&app, &image, output.as_deref(), json),
            Command::Run { image, chunk } => run(&app, &image, chunk).await,
            Command::Listen => listen(&app).await,
        }
    })
}

fn compile(app: &App, image: &Path, output: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let registration = app
        .submit_file(image)
        .with_context(|| format!("Failed to compile {}", image.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registration)?);
    } else {
        print_summary(&registration);
    }

    if let Some(dir) = output {
        std::fs::create_dir_all(dir)?;
        let stem = image
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        for (index, chunk) in registration.chunks.iter().enumerate() {
            let path = dir.join(format!("{}_{:03}.script", stem, index + 1));
            std::fs::write(&path, &chunk.program)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote program chunk");
        }
    }
    Ok(())
}

fn print_summary(registration: &JobRegistration) {
    let metadata = &registration.metadata;
    println!("Job:              {}", registration.job_id);
    println!("Resolution:       {}", metadata.resolution);
    println!("Segments:         {}", metadata.tuft_segments);
    println!("Active pixels:    {}", metadata.active_pixels);
    println!("Motions:          {}", metadata.movement_count);
    println!("Estimated time:   {}s", metadata.estimated_cycle_time_seconds);
    match &metadata.bounding_box_mm {
        Some(bbox) => println!(
            "Bounding box:     x {:.1}..{:.1} mm, y {:.1}..{:.1} mm",
            bbox.min_x, bbox.max_x, bbox.min_y, bbox.max_y
        ),
        None => println!("Bounding box:     none"),
    }
    for (index, chunk) in registration.chunks.iter().enumerate() {
        println!(
            "Chunk {:>3}: blocks {}..{}, {} motions, progress from {}",
            index + 1,
            chunk.start_index,
            chunk.end_index,
            chunk.motion_count,
            chunk.progress_start
        );
    }
}

async fn run(app: &App, image: &Path, first_chunk: usize) -> anyhow::Result<()> {
    let listener = app.start_listener().await?;
    if listener.is_none() {
        tracing::warn!("Telemetry disabled; only the first chunk will be delivered");
    }

    let registration = app
        .submit_file(image)
        .with_context(|| format!("Failed to compile {}", image.display()))?;
    print_summary(&registration);
    if registration.chunks.is_empty() {
        tracing::info!("Nothing to tuft");
        return Ok(());
    }

    let job_id = registration.job_id.clone();
    let mut events = app.progress().subscribe();
    let mut next = first_chunk;

    if !delivered(app.deliver_chunk(&job_id, next).await?) || listener.is_none() {
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                app.pause(&job_id)?;
                tracing::info!("Interrupted; job paused");
                break;
            }
            event = events.recv() => match event {
                Ok(ProgressEvent::Recorded(entry)) if entry.job_id == job_id => {
                    if entry.is_complete() {
                        tracing::info!(job_id = %job_id, "Job complete");
                        break;
                    }
                    let chunk = &registration.chunks[next];
                    if entry.current as usize >= chunk.progress_start + chunk.motion_count {
                        next += 1;
                        if next >= registration.chunks.len()
                            || !delivered(app.deliver_chunk(&job_id, next).await?)
                        {
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress events lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(handle) = listener {
        handle.shutdown().await;
    }
    Ok(())
}

fn delivered(outcome: DeliveryOutcome) -> bool {
    match outcome {
        DeliveryOutcome::Delivered => true,
        DeliveryOutcome::Skipped => {
            tracing::warn!("No robot host configured; program not delivered");
            false
        }
        DeliveryOutcome::Failed { error } => {
            tracing::error!("Delivery failed: {}", error);
            false
        }
    }
}

async fn listen(app: &App) -> anyhow::Result<()> {
    let Some(handle) = app.start_listener().await? else {
        anyhow::bail!("Telemetry is disabled in the configuration");
    };
    let mut events = app.progress().subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    let entry = event.entry();
                    println!(
                        "{} {}/{} ({:.1}%)",
                        entry.job_id,
                        entry.current,
                        entry.total,
                        entry.percent()
                    );
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}
