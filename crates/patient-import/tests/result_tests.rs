//! Result stage integration tests.

mod common;

use common::*;
use patient_import::ResultRequest;
use patient_import::types::{JobStatus, PatientRecord, RESULT_CSV_HEADER};

fn request() -> ResultRequest {
    ResultRequest::new(CX_ID, JOB_ID)
}

async fn write(harness: &Harness, row_number: u32, record: PatientRecord) {
    harness
        .records
        .write(CX_ID, JOB_ID, row_number, &record)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_one_line_per_record_in_row_order() {
    let harness = Harness::new();
    write(&harness, 10, PatientRecord::success("j,ten", "p-10")).await;
    write(&harness, 2, PatientRecord::success("j,two", "p-2")).await;
    write(
        &harness,
        1,
        PatientRecord::failed("j,one", "Internal error", "boom"),
    )
    .await;

    let outcome = harness.result_orchestrator.run(&request()).await.unwrap();
    assert_eq!(outcome.rows, 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(
        outcome.result_key,
        harness.files.keyspace().result_key(CX_ID, JOB_ID)
    );

    let lines = harness.result_lines().await;
    let rows: Vec<&str> = lines.iter().map(|line| &line[0]).collect();
    assert_eq!(rows, vec!["1", "2", "10"]);
    assert_eq!(&lines[0][1], "j,one");
    assert_eq!(&lines[0][4], "Internal error");
    assert_eq!(&lines[0][5], "boom");
    assert_eq!(&lines[2][3], "p-10");

    assert_eq!(harness.jobs.statuses(), vec![JobStatus::Completed]);
}

#[tokio::test]
async fn test_rewritten_record_appears_once() {
    let harness = Harness::new();
    write(&harness, 3, PatientRecord::failed("a", "Internal error", "first")).await;
    write(&harness, 3, PatientRecord::success("a", "p-3")).await;

    harness.result_orchestrator.run(&request()).await.unwrap();

    let lines = harness.result_lines().await;
    assert_eq!(lines.len(), 1);
    assert_eq!(&lines[0][2], "success");
}

#[tokio::test]
async fn test_header_only_when_no_records() {
    let harness = Harness::new();

    let outcome = harness.result_orchestrator.run(&request()).await.unwrap();
    assert_eq!(outcome.rows, 0);

    let contents = harness.files.read_result_file(CX_ID, JOB_ID).await.unwrap();
    assert_eq!(contents.trim_end(), RESULT_CSV_HEADER.join(","));
    assert_eq!(harness.jobs.job().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_many_records_are_all_read() {
    let harness = Harness::new();
    for row in 1..=45 {
        write(&harness, row, PatientRecord::success(format!("row {row}"), format!("p-{row}"))).await;
    }

    let outcome = harness.result_orchestrator.run(&request()).await.unwrap();
    assert_eq!(outcome.rows, 45);
    assert_eq!(harness.result_lines().await.len(), 45);
}

#[tokio::test]
async fn test_unreadable_records_fail_job() {
    let harness = Harness::new();
    write(&harness, 1, PatientRecord::success("a", "p-1")).await;
    harness.objects.set_fail_gets(true);

    assert!(harness.result_orchestrator.run(&request()).await.is_err());
    assert_eq!(harness.jobs.statuses(), vec![JobStatus::Failed]);
}

#[tokio::test]
async fn test_corrupt_record_fails_job() {
    let harness = Harness::new();
    let key = harness.files.keyspace().record_key(CX_ID, JOB_ID, 1);
    harness.objects.insert(BUCKET, &key, b"not json".to_vec());

    assert!(harness.result_orchestrator.run(&request()).await.is_err());
    assert_eq!(harness.jobs.job().status, JobStatus::Failed);
}
