//! # patient-import - Bulk Patient Import Pipeline
//!
//! Turns a customer's CSV of patient demographics into patient records, one
//! independent unit of work per row, without letting a bad row abort the
//! batch or overloading the creation service.
//!
//! ## Stages
//!
//! - **Parse** ([`parse`]): validates the upload, records job totals and fans
//!   rows out to the create dispatcher in throttled chunks.
//! - **Create** ([`dispatch`]): hands each row to the patient creation
//!   collaborator, in process or through a FIFO queue.
//! - **Result** ([`result`]): reads every per-row record back, writes the
//!   result file and finalizes the job.
//!
//! Stages share no memory. They coordinate through the job record
//! ([`job`]), the per-row records in the object store ([`store`]) and,
//! in cloud mode, the stage queues ([`queue`]).
//!
//! ## Deployment modes
//!
//! [`PipelineFactory`] builds every stage for a [`DeploymentMode`]. Local mode
//! runs the whole pipeline in one process; cloud mode enqueues stage requests
//! for [`QueueWorker`]s.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use patient_import::{PipelineConfig, PipelineFactory, ParseRequest, init_logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env();
//!     init_logging(&config.log_level);
//!
//!     let pipeline = PipelineFactory::from_config(&config).await?.build()?;
//!     pipeline
//!         .parse
//!         .process_job_parse(ParseRequest::new("cx-id", "job-id"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod job;
pub mod parse;
pub mod queue;
pub mod result;
pub mod store;
pub mod types;
pub mod validation;
pub mod worker;

pub use config::PipelineConfig;
pub use error::{ImportError, ImportResult};
pub use factory::{Collaborators, DeploymentMode, Pipeline, PipelineFactory, PipelineSettings};
pub use parse::{ParseHandler, ParseOrchestrator, ParseOutcome, ThrottleSettings};
pub use result::{ResultHandler, ResultOrchestrator, ResultOutcome, ResultSettings};
pub use types::{ImportJob, JobStatus, ParseRequest, PatientCreateRequest, ResultRequest};
pub use worker::{QueueWorker, WorkerSettings, WorkerStage};

/// Initializes logging.
///
/// `RUST_LOG` takes precedence; otherwise the pipeline logs at `level`.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("patient_import={},warn", level)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
