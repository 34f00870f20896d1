//! Binary smoke tests

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("minder-downloader").unwrap();
    cmd.env_remove("MINDER_TOKEN")
        .env_remove("MINDER_DOWNLOADER_HOME")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, server: &str) -> PathBuf {
    let path = dir.join("info.yaml");
    std::fs::write(&path, format!("token: \"cli-token\"\nserver: \"{server}\"\n")).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    let output = bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["export", "datasets", "organizations"] {
        assert!(stdout.contains(command), "missing {command} in help:\n{stdout}");
    }
}

#[test]
fn export_requires_a_dataset() {
    bin()
        .args(["export", "--since", "2024-01-01", "--until", "2024-01-02"])
        .assert()
        .failure();
}

#[test]
fn missing_config_file_exits_with_one() {
    let dir = TempDir::new().unwrap();
    bin()
        .args(["datasets", "--config"])
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .code(1);
}

#[test]
fn invalid_date_exits_with_one() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");
    bin()
        .args(["export", "--since", "yesterday", "--until", "2024-01-02", "--dataset", "raw_sleep_mat"])
        .arg("--config")
        .arg(config)
        .assert()
        .code(1);
}

#[tokio::test(flavor = "multi_thread")]
async fn datasets_json_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/datasets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Categories": {"raw": {"raw_sleep_mat": {"availableColumns": ["id", "state"]}}}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());

    let output = tokio::task::spawn_blocking(move || {
        bin()
            .args(["datasets", "--output-format", "json", "--config"])
            .arg(config)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["datasets"][0]["name"], "raw_sleep_mat");
    assert_eq!(listing["datasets"][0]["domain"], "raw");
}

#[tokio::test(flavor = "multi_thread")]
async fn export_writes_csv_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/datasets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Categories": {"raw": {"raw_sleep_mat": {"availableColumns": ["id", "state"]}}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/export"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Location", format!("{}/export/cli-job", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/export/cli-job/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "jobRecord": {"output": [
                {"type": "raw_sleep_mat", "url": format!("{}/files/one.csv", server.uri())}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/one.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id,state\n1,AWAKE\n2,ASLEEP\n"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let csv_path = dir.path().join("out").join("export.csv");

    let output = tokio::task::spawn_blocking({
        let csv_path = csv_path.clone();
        move || {
            bin()
                .args([
                    "export",
                    "--since",
                    "2024-01-01",
                    "--until",
                    "2024-01-02",
                    "--dataset",
                    "raw_sleep_mat",
                    "--output-format",
                    "json",
                ])
                .arg("--config")
                .arg(config)
                .arg("--output")
                .arg(csv_path)
                .output()
                .unwrap()
        }
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["success"], true);
    assert_eq!(summary["job_id"], "cli-job");
    assert_eq!(summary["rows"], 2);

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.contains("id") && header.contains("state") && header.contains("source"));
    assert_eq!(lines.count(), 2);
    assert!(csv.contains("AWAKE"));
}
