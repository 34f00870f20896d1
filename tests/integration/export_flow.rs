//! End-to-end export against a mock portal

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use minder_downloader::config::PortalConfig;
use minder_downloader::export::{
    ExportError, ExportExecutor, ExportJobRequest, ExportOptions, ExportParams, RetryPolicy,
};
use minder_downloader::fetcher::PortalHttpClient;
use minder_downloader::metadata::DatasetCatalog;
use minder_downloader::table::{Cell, SOURCE_COLUMN};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn params() -> ExportParams {
    let day = |d| NaiveDate::from_ymd_opt(2024, 2, d).unwrap().and_hms_opt(0, 0, 0).unwrap();
    ExportParams::new(day(1), day(3), ["raw_sleep_mat", "raw_activity_pir"])
}

fn catalog() -> DatasetCatalog {
    DatasetCatalog::new()
        .with_dataset("raw_sleep_mat", ["id", "start_date", "state"])
        .with_dataset("raw_activity_pir", ["id", "start_date", "location_name"])
}

fn fast_options() -> ExportOptions {
    ExportOptions {
        poll_policy: RetryPolicy::unbounded(Duration::from_millis(10)).with_max_attempts(20),
        fetch_policy: RetryPolicy::unbounded(Duration::from_millis(10)).with_max_attempts(5),
        ..ExportOptions::default()
    }
}

fn executor(server: &MockServer) -> ExportExecutor {
    let config = PortalConfig::new(TOKEN, server.uri()).unwrap();
    let transport = Arc::new(PortalHttpClient::new(&config).unwrap());
    ExportExecutor::new(transport, &config.server).with_options(fast_options())
}

async fn mount_submission(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path("/export"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(json!({
            "since": "2024-02-01T00:00:00.000Z",
            "until": "2024-02-03T00:00:00.000Z",
            "datasets": {"raw_sleep_mat": {"columns": ["id", "start_date", "state"]}}
        })))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Location", format!("{}/export/{job_id}", server.uri()).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn export_round_trip_consolidates_files() {
    let server = MockServer::start().await;
    mount_submission(&server, "job-1").await;

    Mock::given(method("GET"))
        .and(path("/export/job-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-1", "status": 202})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/export/job-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-1",
            "status": 200,
            "jobRecord": {"output": [
                {"type": "raw_sleep_mat", "url": format!("{}/files/sleep.csv", server.uri())},
                {"type": "raw_activity_pir", "url": format!("{}/files/pir.csv", server.uri())}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/sleep.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "\u{feff}id,start_date,state\n1,2024-02-01,true\nid,start_date,state\n",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/pir.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "id,start_date,location_name\n2,2024-02-01,kitchen\n3,2024-02-02,false\n",
        ))
        .mount(&server)
        .await;

    let table = executor(&server)
        .fetch_dataset_table(&catalog(), &params())
        .await
        .unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(table.cell(0, SOURCE_COLUMN), Some(&Cell::from("raw_sleep_mat")));
    assert_eq!(table.cell(0, "state"), Some(&Cell::Bool(true)));
    assert_eq!(table.cell(1, SOURCE_COLUMN), Some(&Cell::from("raw_activity_pir")));
    assert_eq!(table.cell(1, "state"), Some(&Cell::Null));
    assert_eq!(table.cell(2, "location_name"), Some(&Cell::Bool(false)));
}

#[tokio::test]
async fn flaky_file_is_retried_until_it_parses() {
    let server = MockServer::start().await;
    mount_submission(&server, "job-2").await;

    Mock::given(method("GET"))
        .and(path("/export/job-2/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "jobRecord": {"output": [
                {"type": "raw_sleep_mat", "url": format!("{}/files/late.csv", server.uri())}
            ]}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/late.csv"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/late.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id,start_date,state\n"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/late.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id,start_date,state\n9,2024-02-01,ASLEEP\n"))
        .mount(&server)
        .await;

    let request = ExportJobRequest::build(&params(), &catalog()).unwrap();
    let report = executor(&server).run(&request).await.unwrap();

    assert_eq!(report.job.job_id(), "job-2");
    assert_eq!(report.fetch_attempts, 3);
    assert_eq!(report.table.len(), 1);
    assert_eq!(report.table.cell(0, "state"), Some(&Cell::from("ASLEEP")));
}

#[tokio::test]
async fn empty_export_returns_empty_table() {
    let server = MockServer::start().await;
    mount_submission(&server, "job-3").await;

    Mock::given(method("GET"))
        .and(path("/export/job-3/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "jobRecord": {"output": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let table = executor(&server)
        .fetch_dataset_table(&catalog(), &params())
        .await
        .unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
async fn rejected_submission_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = executor(&server)
        .fetch_dataset_table(&catalog(), &params())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Transport(_)));
}

#[tokio::test]
async fn bounded_polling_gives_up() {
    let server = MockServer::start().await;
    mount_submission(&server, "job-4").await;
    Mock::given(method("GET"))
        .and(path("/export/job-4/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 202})))
        .mount(&server)
        .await;

    let options = ExportOptions {
        poll_policy: RetryPolicy::unbounded(Duration::from_millis(5)).with_max_attempts(3),
        ..fast_options()
    };
    let err = executor(&server)
        .with_options(options)
        .fetch_dataset_table(&catalog(), &params())
        .await
        .unwrap_err();

    match err {
        ExportError::RetriesExhausted { operation, attempts, .. } => {
            assert_eq!(operation, "status poll");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn load_fetches_metadata_then_exports() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/datasets"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Categories": {"raw": {
                "raw_sleep_mat": {"availableColumns": ["id", "start_date", "state"]},
                "raw_activity_pir": {"availableColumns": ["id", "start_date", "location_name"]}
            }}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_submission(&server, "job-5").await;
    Mock::given(method("GET"))
        .and(path("/export/job-5/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "output": {"jobRecord": [
                {"type": "raw_sleep_mat", "url": format!("{}/files/s.csv", server.uri())}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/s.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id,start_date,state\n1,2024-02-01,AWAKE\n"))
        .mount(&server)
        .await;

    let config = PortalConfig::new(TOKEN, server.uri()).unwrap();
    let p = params();
    let table = minder_downloader::load(&config, p.since, p.until, p.datasets, None)
        .await
        .unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.cell(0, SOURCE_COLUMN), Some(&Cell::from("raw_sleep_mat")));
}
