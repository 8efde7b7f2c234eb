use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::JobStatusClient;
use crate::error::{ConfigError, JobStatusError};
use crate::types::{ImportJob, JobUpdate};

const MAX_BODY_EXCERPT: usize = 500;

/// Job status client for the job API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpJobClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::Missing {
                name: "job API URL".to_string(),
            });
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "job API client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{}", self.base_url, job_id)
    }

    async fn handle_response(
        &self,
        cx_id: &str,
        job_id: &str,
        url: &str,
        response: reqwest::Response,
    ) -> Result<ImportJob, JobStatusError> {
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_BODY_EXCERPT {
                let cut = (0..=MAX_BODY_EXCERPT)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(JobStatusError::UnexpectedStatus {
                cx_id: cx_id.to_string(),
                job_id: job_id.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ImportJob>()
            .await
            .map_err(|e| JobStatusError::InvalidResponse {
                cx_id: cx_id.to_string(),
                job_id: job_id.to_string(),
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    fn request_error(cx_id: &str, job_id: &str, url: &str, err: reqwest::Error) -> JobStatusError {
        JobStatusError::Request {
            cx_id: cx_id.to_string(),
            job_id: job_id.to_string(),
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl JobStatusClient for HttpJobClient {
    async fn get_job(&self, cx_id: &str, job_id: &str) -> Result<ImportJob, JobStatusError> {
        let url = self.job_url(job_id);
        debug!(cx_id, job_id, url = %url, "fetching job");

        let response = self
            .http_client
            .get(&url)
            .query(&[("cxId", cx_id)])
            .send()
            .await
            .map_err(|e| Self::request_error(cx_id, job_id, &url, e))?;

        self.handle_response(cx_id, job_id, &url, response).await
    }

    async fn update_job(
        &self,
        cx_id: &str,
        job_id: &str,
        update: &JobUpdate,
    ) -> Result<ImportJob, JobStatusError> {
        let url = self.job_url(job_id);
        debug!(cx_id, job_id, url = %url, status = %update.status, "updating job");

        let response = self
            .http_client
            .post(&url)
            .query(&[("cxId", cx_id)])
            .json(update)
            .send()
            .await
            .map_err(|e| Self::request_error(cx_id, job_id, &url, e))?;

        self.handle_response(cx_id, job_id, &url, response).await
    }
}
