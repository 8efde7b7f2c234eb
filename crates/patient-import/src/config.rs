//! Pipeline configuration.
//!
//! Settings come from command line arguments or environment variables, with
//! defaults suited to a local development run.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PATIENT_IMPORT_MODE` | local | Deployment mode (`local` or `cloud`) |
//! | `PATIENT_IMPORT_LOG_LEVEL` | info | Log level |
//! | `PATIENT_IMPORT_BUCKET` | patient-import | Object store bucket |
//! | `PATIENT_IMPORT_REGION` | | AWS region override |
//! | `PATIENT_IMPORT_S3_ENDPOINT` | | S3-compatible endpoint URL |
//! | `PATIENT_IMPORT_DATA_DIR` | | Local directory used instead of S3 |
//! | `PATIENT_IMPORT_JOB_API_URL` | http://localhost:8080/internal/patient/import | Job status service base URL |
//! | `PATIENT_IMPORT_JOB_API_TIMEOUT` | 30 | Job status request timeout (seconds) |
//! | `PATIENT_IMPORT_CREATE_QUEUE_URL` | | FIFO queue for create requests (cloud) |
//! | `PATIENT_IMPORT_PARSE_QUEUE_URL` | | Queue for parse requests (cloud) |
//! | `PATIENT_IMPORT_RESULT_QUEUE_URL` | | Queue for result requests (cloud) |
//! | `PATIENT_IMPORT_PATIENT_CREATE_URL` | | Patient create endpoint (local) |
//! | `PATIENT_IMPORT_CHUNK_SIZE` | 5 | Rows dispatched concurrently |
//! | `PATIENT_IMPORT_CHUNK_DELAY_MS` | 20 | Pause between chunks (milliseconds) |
//! | `PATIENT_IMPORT_READ_CONCURRENCY` | 20 | Record reads in flight during result |
//! | `PATIENT_IMPORT_MAX_ROWS` | 100000 | Maximum rows per upload |

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::factory::DeploymentMode;
use crate::parse::ThrottleSettings;
use crate::result::ResultSettings;

/// Configuration for the patient import pipeline.
#[derive(Debug, Clone, Parser)]
#[command(name = "patient-import")]
#[command(about = "Bulk patient import pipeline")]
pub struct PipelineConfig {
    /// Deployment mode (local, cloud).
    #[arg(long, env = "PATIENT_IMPORT_MODE", default_value = "local")]
    pub mode: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "PATIENT_IMPORT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Object store bucket holding uploads, records and results.
    #[arg(long, env = "PATIENT_IMPORT_BUCKET", default_value = "patient-import")]
    pub bucket: String,

    /// AWS region override (falls back to the provider chain if unset).
    #[arg(long, env = "PATIENT_IMPORT_REGION")]
    pub region: Option<String>,

    /// S3-compatible endpoint URL (for example, MinIO).
    #[arg(long, env = "PATIENT_IMPORT_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Local directory used as the object store instead of S3.
    #[arg(long, env = "PATIENT_IMPORT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the job status service.
    #[arg(
        long,
        env = "PATIENT_IMPORT_JOB_API_URL",
        default_value = "http://localhost:8080/internal/patient/import"
    )]
    pub job_api_url: String,

    /// Job status request timeout in seconds.
    #[arg(long, env = "PATIENT_IMPORT_JOB_API_TIMEOUT", default_value = "30")]
    pub job_api_timeout: u64,

    /// FIFO queue receiving patient create requests.
    #[arg(long, env = "PATIENT_IMPORT_CREATE_QUEUE_URL")]
    pub create_queue_url: Option<String>,

    /// Queue receiving parse requests.
    #[arg(long, env = "PATIENT_IMPORT_PARSE_QUEUE_URL")]
    pub parse_queue_url: Option<String>,

    /// Queue receiving result requests.
    #[arg(long, env = "PATIENT_IMPORT_RESULT_QUEUE_URL")]
    pub result_queue_url: Option<String>,

    /// Patient create endpoint called in process in local mode.
    #[arg(long, env = "PATIENT_IMPORT_PATIENT_CREATE_URL")]
    pub patient_create_url: Option<String>,

    /// Rows dispatched concurrently per chunk.
    #[arg(long, env = "PATIENT_IMPORT_CHUNK_SIZE", default_value = "5")]
    pub chunk_size: usize,

    /// Pause between chunks in milliseconds.
    #[arg(long, env = "PATIENT_IMPORT_CHUNK_DELAY_MS", default_value = "20")]
    pub chunk_delay_ms: u64,

    /// Record reads in flight while building the result file.
    #[arg(long, env = "PATIENT_IMPORT_READ_CONCURRENCY", default_value = "20")]
    pub read_concurrency: usize,

    /// Maximum number of rows accepted per upload.
    #[arg(long, env = "PATIENT_IMPORT_MAX_ROWS", default_value = "100000")]
    pub max_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            log_level: "info".to_string(),
            bucket: "patient-import".to_string(),
            region: None,
            s3_endpoint: None,
            data_dir: None,
            job_api_url: "http://localhost:8080/internal/patient/import".to_string(),
            job_api_timeout: 30,
            create_queue_url: None,
            parse_queue_url: None,
            result_queue_url: None,
            patient_create_url: None,
            chunk_size: 5,
            chunk_delay_ms: 20,
            read_concurrency: 20,
            max_rows: 100_000,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration from environment variables.
    pub fn from_env() -> Self {
        Self::try_parse().unwrap_or_default()
    }

    pub fn deployment_mode(&self) -> Result<DeploymentMode, String> {
        self.mode.parse()
    }

    pub fn throttle(&self) -> ThrottleSettings {
        ThrottleSettings {
            chunk_size: self.chunk_size,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
        }
    }

    pub fn result_settings(&self) -> ResultSettings {
        ResultSettings {
            read_concurrency: self.read_concurrency,
        }
    }

    pub fn job_api_timeout(&self) -> Duration {
        Duration::from_secs(self.job_api_timeout)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mode = match self.deployment_mode() {
            Ok(mode) => Some(mode),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        if self.bucket.trim().is_empty() {
            errors.push("Bucket cannot be empty".to_string());
        }

        if self.job_api_url.trim().is_empty() {
            errors.push("Job API URL cannot be empty".to_string());
        }

        if self.job_api_timeout == 0 {
            errors.push("Job API timeout cannot be 0".to_string());
        }

        if self.chunk_size == 0 {
            errors.push("Chunk size cannot be 0".to_string());
        }

        if self.read_concurrency == 0 {
            errors.push("Read concurrency cannot be 0".to_string());
        }

        if self.max_rows == 0 {
            errors.push("Max rows cannot be 0".to_string());
        }

        if mode == Some(DeploymentMode::Cloud) {
            for (name, value) in [
                ("Create queue URL", &self.create_queue_url),
                ("Parse queue URL", &self.parse_queue_url),
                ("Result queue URL", &self.result_queue_url),
            ] {
                if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                    errors.push(format!("{} is required in cloud mode", name));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// Throttle delays are kept but shortened so tests stay fast.
    pub fn for_testing() -> Self {
        Self {
            log_level: "debug".to_string(),
            bucket: "test-bucket".to_string(),
            job_api_url: "http://127.0.0.1:0".to_string(),
            job_api_timeout: 5,
            chunk_delay_ms: 1,
            max_rows: 1_000,
            ..Default::default()
        }
    }
}
