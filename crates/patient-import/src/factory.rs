//! Builds the pipeline stages for a deployment mode.
//!
//! In [`DeploymentMode::Local`] every stage runs in process: Parse dispatches
//! rows straight to the creation step and hands off to Result directly. In
//! [`DeploymentMode::Cloud`] each stage boundary is a queue and the stages run
//! in independently scaled [`QueueWorker`]s.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::config::PipelineConfig;
use crate::dispatch::{
    CloudCreateDispatcher, HttpPatientCreator, LocalCreateDispatcher, PatientCreateDispatcher,
    PatientCreateProcessor, PatientCreator,
};
use crate::error::{ConfigError, ImportResult};
use crate::job::{HttpJobClient, JobStatusClient};
use crate::parse::{ParseHandler, ParseHandlerCloud, ParseHandlerLocal, ParseOrchestrator, ThrottleSettings};
use crate::queue::{QueueClient, SqsQueueClient};
use crate::result::{
    ResultHandler, ResultHandlerCloud, ResultHandlerLocal, ResultOrchestrator, ResultSettings,
};
use crate::store::{
    AwsS3Client, ImportFileStore, ImportKeyspace, LocalDirClient, ObjectClient, PatientRecordStore,
};
use crate::validation::CsvValidator;
use crate::worker::{QueueWorker, WorkerSettings, WorkerStage};

/// Where the pipeline stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentMode {
    /// Single process, stages called directly.
    Local,
    /// Stages connected by queues.
    Cloud,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Self::Local),
            "cloud" | "production" | "prod" | "staging" => Ok(Self::Cloud),
            other => Err(format!(
                "Unknown deployment mode '{}', expected 'local' or 'cloud'",
                other
            )),
        }
    }
}

/// Queue URLs for the stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct QueueUrls {
    pub create: Option<String>,
    pub parse: Option<String>,
    pub result: Option<String>,
}

impl QueueUrls {
    pub fn for_stage(&self, stage: WorkerStage) -> Option<&str> {
        match stage {
            WorkerStage::Parse => self.parse.as_deref(),
            WorkerStage::Create => self.create.as_deref(),
            WorkerStage::Result => self.result.as_deref(),
        }
    }
}

/// Everything a pipeline needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStatusClient>,
    pub objects: Arc<dyn ObjectClient>,
    pub queue: Option<Arc<dyn QueueClient>>,
    pub creator: Option<Arc<dyn PatientCreator>>,
}

/// Tunables shared by the stages.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub bucket: String,
    pub keyspace: ImportKeyspace,
    pub throttle: ThrottleSettings,
    pub result: ResultSettings,
    pub max_rows: usize,
    pub queues: QueueUrls,
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            keyspace: ImportKeyspace::default(),
            throttle: config.throttle(),
            result: config.result_settings(),
            max_rows: config.max_rows,
            queues: QueueUrls {
                create: config.create_queue_url.clone(),
                parse: config.parse_queue_url.clone(),
                result: config.result_queue_url.clone(),
            },
        }
    }
}

/// The three stages built for one deployment mode.
#[derive(Clone)]
pub struct Pipeline {
    pub mode: DeploymentMode,
    pub parse: Arc<dyn ParseHandler>,
    pub create: Arc<dyn PatientCreateDispatcher>,
    pub result: Arc<dyn ResultHandler>,
    pub parse_orchestrator: Arc<ParseOrchestrator>,
    pub result_orchestrator: Arc<ResultOrchestrator>,
    /// The in-process creation step, when a patient creator is configured.
    pub create_processor: Option<PatientCreateProcessor>,
    pub jobs: Arc<dyn JobStatusClient>,
    pub files: ImportFileStore,
    pub records: PatientRecordStore,
    queue: Option<Arc<dyn QueueClient>>,
    queues: QueueUrls,
}

impl Pipeline {
    /// Builds a worker that consumes `stage` requests from its queue.
    pub fn worker(&self, stage: WorkerStage, settings: WorkerSettings) -> ImportResult<QueueWorker> {
        let queue = self.queue.clone().ok_or_else(|| ConfigError::Missing {
            name: "queue client".to_string(),
        })?;
        let queue_url = self
            .queues
            .for_stage(stage)
            .ok_or_else(|| ConfigError::Missing {
                name: format!("{} queue URL", stage),
            })?
            .to_string();

        let worker = match stage {
            WorkerStage::Parse => {
                QueueWorker::parse(queue, queue_url, self.parse_orchestrator.clone(), settings)
            }
            WorkerStage::Result => {
                QueueWorker::result(queue, queue_url, self.result_orchestrator.clone(), settings)
            }
            WorkerStage::Create => {
                let processor = self.create_processor.clone().ok_or_else(|| ConfigError::Missing {
                    name: "patient create URL".to_string(),
                })?;
                QueueWorker::create(queue, queue_url, processor, settings)
            }
        };
        Ok(worker)
    }
}

/// Chooses the Local or Cloud implementation of each stage.
pub struct PipelineFactory {
    mode: DeploymentMode,
    collaborators: Collaborators,
    settings: PipelineSettings,
}

impl PipelineFactory {
    pub fn new(mode: DeploymentMode, collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            mode,
            collaborators,
            settings,
        }
    }

    /// Builds the collaborators described by `config`: HTTP job client, S3 or
    /// local directory store, SQS in cloud mode, HTTP patient creator when a
    /// create URL is set.
    pub async fn from_config(config: &PipelineConfig) -> ImportResult<Self> {
        let mode = config.deployment_mode().map_err(|message| ConfigError::Invalid {
            name: "mode".to_string(),
            message,
        })?;

        let jobs: Arc<dyn JobStatusClient> =
            Arc::new(HttpJobClient::new(&config.job_api_url, config.job_api_timeout())?);

        let needs_aws = config.data_dir.is_none() || mode == DeploymentMode::Cloud;
        let sdk_config = if needs_aws {
            Some(AwsS3Client::load_sdk_config(config.region.as_deref()).await)
        } else {
            None
        };

        let objects: Arc<dyn ObjectClient> = match (&config.data_dir, &sdk_config) {
            (Some(dir), _) => {
                info!(data_dir = %dir.display(), "using local directory object store");
                Arc::new(LocalDirClient::new(dir))
            }
            (None, Some(sdk)) => match &config.s3_endpoint {
                Some(endpoint) => {
                    info!(endpoint = %endpoint, "using S3-compatible endpoint");
                    Arc::new(AwsS3Client::with_endpoint(sdk, endpoint))
                }
                None => Arc::new(AwsS3Client::from_sdk_config(sdk)),
            },
            (None, None) => {
                return Err(ConfigError::Missing {
                    name: "object store".to_string(),
                }
                .into());
            }
        };

        let queue: Option<Arc<dyn QueueClient>> = match (mode, &sdk_config) {
            (DeploymentMode::Cloud, Some(sdk)) => Some(Arc::new(SqsQueueClient::from_sdk_config(sdk))),
            _ => None,
        };

        let creator: Option<Arc<dyn PatientCreator>> = match &config.patient_create_url {
            Some(url) => Some(Arc::new(HttpPatientCreator::new(url, config.job_api_timeout())?)),
            None => None,
        };

        Ok(Self::new(
            mode,
            Collaborators {
                jobs,
                objects,
                queue,
                creator,
            },
            PipelineSettings::from_config(config),
        ))
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn build(&self) -> ImportResult<Pipeline> {
        let Collaborators {
            jobs,
            objects,
            queue,
            creator,
        } = self.collaborators.clone();
        let settings = &self.settings;

        let files = ImportFileStore::new(objects.clone(), &settings.bucket, settings.keyspace.clone());
        let records =
            PatientRecordStore::new(objects, &settings.bucket, settings.keyspace.clone());
        let validator = CsvValidator::new(settings.max_rows)?;

        let create_processor =
            creator.map(|creator| PatientCreateProcessor::new(creator, records.clone()));

        let result_orchestrator = Arc::new(ResultOrchestrator::new(
            jobs.clone(),
            files.clone(),
            records.clone(),
            settings.result,
        ));

        let create: Arc<dyn PatientCreateDispatcher>;
        let result: Arc<dyn ResultHandler>;
        match self.mode {
            DeploymentMode::Local => {
                let processor = create_processor.clone().ok_or_else(|| ConfigError::Missing {
                    name: "patient create URL".to_string(),
                })?;
                create = Arc::new(LocalCreateDispatcher::new(processor));
                result = Arc::new(ResultHandlerLocal::new(result_orchestrator.clone()));
            }
            DeploymentMode::Cloud => {
                let queue = require_queue(&queue)?;
                create = Arc::new(CloudCreateDispatcher::new(
                    queue.clone(),
                    require_url(&settings.queues.create, "create queue URL")?,
                ));
                result = Arc::new(ResultHandlerCloud::new(
                    queue,
                    require_url(&settings.queues.result, "result queue URL")?,
                    jobs.clone(),
                ));
            }
        }

        let parse_orchestrator = Arc::new(ParseOrchestrator::new(
            jobs.clone(),
            files.clone(),
            records.clone(),
            create.clone(),
            result.clone(),
            validator,
            settings.throttle,
        ));

        let parse: Arc<dyn ParseHandler> = match self.mode {
            DeploymentMode::Local => Arc::new(ParseHandlerLocal::new(parse_orchestrator.clone())),
            DeploymentMode::Cloud => Arc::new(ParseHandlerCloud::new(
                require_queue(&queue)?,
                require_url(&settings.queues.parse, "parse queue URL")?,
            )),
        };

        info!(mode = %self.mode, bucket = %settings.bucket, "pipeline built");

        Ok(Pipeline {
            mode: self.mode,
            parse,
            create,
            result,
            parse_orchestrator,
            result_orchestrator,
            create_processor,
            jobs,
            files,
            records,
            queue,
            queues: settings.queues.clone(),
        })
    }
}

fn require_queue(queue: &Option<Arc<dyn QueueClient>>) -> Result<Arc<dyn QueueClient>, ConfigError> {
    queue.clone().ok_or_else(|| ConfigError::Missing {
        name: "queue client".to_string(),
    })
}

fn require_url(url: &Option<String>, name: &str) -> Result<String, ConfigError> {
    url.clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_mode_parsing() {
        assert_eq!("local".parse::<DeploymentMode>(), Ok(DeploymentMode::Local));
        assert_eq!("Cloud".parse::<DeploymentMode>(), Ok(DeploymentMode::Cloud));
        assert_eq!("production".parse::<DeploymentMode>(), Ok(DeploymentMode::Cloud));
        assert!("hybrid".parse::<DeploymentMode>().is_err());
        assert_eq!(DeploymentMode::Cloud.to_string(), "cloud");
    }

    #[test]
    fn test_queue_urls_for_stage() {
        let urls = QueueUrls {
            create: Some("c".to_string()),
            parse: None,
            result: Some("r".to_string()),
        };
        assert_eq!(urls.for_stage(WorkerStage::Create), Some("c"));
        assert_eq!(urls.for_stage(WorkerStage::Parse), None);
        assert_eq!(urls.for_stage(WorkerStage::Result), Some("r"));
    }
}
