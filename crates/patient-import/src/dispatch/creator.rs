use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DispatchError};
use crate::types::{PatientCreateRequest, PatientPayload};

/// The external patient creation collaborator.
#[async_trait]
pub trait PatientCreator: Send + Sync {
    /// Creates (or matches) the patient and returns its id.
    async fn create_patient(
        &self,
        request: &PatientCreateRequest,
        patient: &PatientPayload,
    ) -> Result<String, DispatchError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    #[serde(flatten)]
    request: &'a PatientCreateRequest,
    patient: &'a PatientPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    #[serde(alias = "id")]
    patient_id: String,
}

/// Posts create requests to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpPatientCreator {
    http_client: reqwest::Client,
    url: String,
}

impl HttpPatientCreator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "patient create URL".to_string(),
            });
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "patient create client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { http_client, url })
    }
}

#[async_trait]
impl PatientCreator for HttpPatientCreator {
    async fn create_patient(
        &self,
        request: &PatientCreateRequest,
        patient: &PatientPayload,
    ) -> Result<String, DispatchError> {
        let create_error = |message: String| DispatchError::Create {
            row_number: request.row_number,
            message,
        };

        let response = self
            .http_client
            .post(&self.url)
            .json(&CreateBody { request, patient })
            .send()
            .await
            .map_err(|e| create_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(create_error(format!("{}: {}", status.as_u16(), body)));
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| create_error(format!("invalid response: {e}")))?;
        Ok(created.patient_id)
    }
}
