//! HTTP collaborators against an in-process axum server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use patient_import::dispatch::{HttpPatientCreator, PatientCreator};
use patient_import::error::{DispatchError, JobStatusError};
use patient_import::job::{HttpJobClient, JobStatusClient};
use patient_import::types::{
    Address, Gender, JobStatus, JobUpdate, PatientCreateRequest, PatientPayload,
};
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Clone, Default)]
struct JobApi {
    updates: Arc<Mutex<Vec<(String, String, Value)>>>,
}

async fn get_job(
    Path(job_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if job_id == "missing" {
        return Err((StatusCode::NOT_FOUND, "job not found".to_string()));
    }
    if job_id == "garbled" {
        return Ok(Json(json!({ "unexpected": true })));
    }
    Ok(Json(json!({
        "cxId": query.get("cxId").cloned().unwrap_or_default(),
        "id": job_id,
        "facilityId": "facility-1",
        "status": "processing",
        "total": 12,
        "paramsOps": { "dryRun": true, "disableWebhooks": true }
    })))
}

async fn update_job(
    State(api): State<JobApi>,
    Path(job_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let cx_id = query.get("cxId").cloned().unwrap_or_default();
    api.updates
        .lock()
        .unwrap()
        .push((cx_id.clone(), job_id.clone(), body.clone()));
    Json(json!({
        "cxId": cx_id,
        "jobId": job_id,
        "facilityId": "facility-1",
        "status": body["status"],
        "total": body.get("total"),
        "failed": body.get("failed")
    }))
}

async fn create_patient(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if body["rowNumber"] == 13 {
        return Err(StatusCode::BAD_GATEWAY);
    }
    Ok(Json(json!({
        "patientId": format!("p-{}-{}", body["rowNumber"], body["patient"]["lastName"].as_str().unwrap_or_default())
    })))
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn job_api() -> (JobApi, String) {
    let api = JobApi::default();
    let router = Router::new()
        .route("/jobs/{job_id}", get(get_job).post(update_job))
        .with_state(api.clone());
    let base_url = serve(router).await;
    (api, base_url)
}

fn job_client(base_url: &str) -> HttpJobClient {
    HttpJobClient::new(format!("{base_url}/"), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_get_job() {
    let (_api, base_url) = job_api().await;
    let job_id = Uuid::new_v4().to_string();

    let job = job_client(&base_url).get_job("cx-1", &job_id).await.unwrap();
    assert_eq!(job.cx_id, "cx-1");
    assert_eq!(job.job_id, job_id);
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.total, Some(12));
    assert_eq!(job.failed, None);
    assert!(job.is_dry_run());
    assert!(job.params_ops.disable_webhooks);
    assert!(!job.params_ops.trigger_consolidated);
}

#[tokio::test]
async fn test_update_job_sends_counts() {
    let (api, base_url) = job_api().await;
    let job_id = Uuid::new_v4().to_string();

    let job = job_client(&base_url)
        .update_job(
            "cx-1",
            &job_id,
            &JobUpdate::new(JobStatus::Processing).with_counts(12, 2),
        )
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.total, Some(12));
    assert_eq!(job.failed, Some(2));

    let updates = api.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    let (cx_id, sent_job_id, body) = &updates[0];
    assert_eq!(cx_id, "cx-1");
    assert_eq!(sent_job_id, &job_id);
    assert_eq!(
        body,
        &json!({ "status": "processing", "total": 12, "failed": 2 })
    );
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (_api, base_url) = job_api().await;

    let err = job_client(&base_url)
        .get_job("cx-1", "missing")
        .await
        .unwrap_err();
    match err {
        JobStatusError::UnexpectedStatus { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body, "job not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_body_is_reported() {
    let (_api, base_url) = job_api().await;

    let err = job_client(&base_url)
        .get_job("cx-1", "garbled")
        .await
        .unwrap_err();
    assert!(matches!(err, JobStatusError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_unreachable_service_is_a_request_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = job_client(&format!("http://{addr}"))
        .get_job("cx-1", "job-1")
        .await
        .unwrap_err();
    assert!(matches!(err, JobStatusError::Request { .. }));
}

fn create_request(row_number: u32) -> PatientCreateRequest {
    PatientCreateRequest {
        cx_id: "cx-1".to_string(),
        facility_id: "facility-1".to_string(),
        job_id: "job-1".to_string(),
        row_number,
        trigger_consolidated: false,
        disable_webhooks: false,
        rerun_pd_on_new_demographics: None,
    }
}

fn patient() -> PatientPayload {
    PatientPayload {
        external_id: Some("ext-1".to_string()),
        first_name: "Ann".to_string(),
        last_name: "Lee".to_string(),
        dob: "1970-05-05".to_string(),
        gender_at_birth: Gender::Female,
        address: vec![Address {
            address_line1: "1 Main St".to_string(),
            address_line2: None,
            city: "Boston".to_string(),
            state: "MA".to_string(),
            zip: "02110".to_string(),
            country: "USA".to_string(),
        }],
        contact: Vec::new(),
        personal_identifiers: Vec::new(),
    }
}

#[tokio::test]
async fn test_http_patient_creator() {
    let base_url = serve(Router::new().route("/patients", post(create_patient))).await;
    let creator =
        HttpPatientCreator::new(format!("{base_url}/patients"), Duration::from_secs(5)).unwrap();

    let id = creator
        .create_patient(&create_request(4), &patient())
        .await
        .unwrap();
    assert_eq!(id, "p-4-Lee");

    let err = creator
        .create_patient(&create_request(13), &patient())
        .await
        .unwrap_err();
    match err {
        DispatchError::Create {
            row_number,
            message,
        } => {
            assert_eq!(row_number, 13);
            assert!(message.starts_with("502"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
