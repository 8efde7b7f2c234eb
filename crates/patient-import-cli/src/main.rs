//! Patient import command line.
//!
//! Runs one pipeline stage for a job, or a queue worker for a stage.

use clap::{Parser, Subcommand};
use patient_import::types::validate_new_status;
use patient_import::{
    JobStatus, ParseRequest, PipelineConfig, PipelineFactory, ResultRequest, WorkerSettings,
    WorkerStage, init_logging,
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "patient-import", version, about = "Bulk patient import pipeline")]
struct Cli {
    #[command(flatten)]
    config: PipelineConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Starts the parse stage of an uploaded job.
    Parse {
        #[arg(long)]
        cx_id: String,
        #[arg(long)]
        job_id: String,
        /// Move the job to processing even if its current status forbids it.
        #[arg(long)]
        force_status_update: bool,
    },
    /// Rebuilds the result file of a job and completes it.
    Result {
        #[arg(long)]
        cx_id: String,
        #[arg(long)]
        job_id: String,
    },
    /// Completes a job stuck in processing, writing whatever records exist.
    Finish {
        #[arg(long)]
        cx_id: String,
        #[arg(long)]
        job_id: String,
    },
    /// Consumes one stage queue until interrupted.
    Worker {
        #[arg(long)]
        stage: WorkerStage,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config;
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let pipeline = PipelineFactory::from_config(&config).await?.build()?;

    info!(
        mode = %pipeline.mode,
        bucket = %config.bucket,
        chunk_size = config.chunk_size,
        chunk_delay_ms = config.chunk_delay_ms,
        "Starting patient import"
    );

    match cli.command {
        Command::Parse {
            cx_id,
            job_id,
            force_status_update,
        } => {
            let request =
                ParseRequest::new(cx_id, job_id).with_force_status_update(force_status_update);
            pipeline.parse.process_job_parse(request).await?;
        }
        Command::Result { cx_id, job_id } => {
            pipeline
                .result
                .process_job_result(ResultRequest::new(cx_id, job_id))
                .await?;
        }
        Command::Finish { cx_id, job_id } => {
            let job = pipeline.jobs.get_job(&cx_id, &job_id).await?;
            validate_new_status(job.status, JobStatus::Completed)?;
            pipeline
                .result_orchestrator
                .run(&ResultRequest::new(cx_id, job_id))
                .await?;
        }
        Command::Worker { stage } => {
            let worker = pipeline.worker(stage, WorkerSettings::default())?;
            worker
                .run(async {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "failed to listen for shutdown signal");
                    }
                })
                .await;
        }
    }

    Ok(())
}
