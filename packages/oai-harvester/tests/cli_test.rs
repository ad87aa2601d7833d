//! Command-line tests for the `oai-harvester` binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::query_param;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn harvester() -> Command {
    Command::cargo_bin("oai-harvester").unwrap()
}

#[test]
fn test_help_lists_commands() {
    harvester()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvest"))
        .stdout(predicate::str::contains("identify"))
        .stdout(predicate::str::contains("upload"));
}

#[test]
fn test_invalid_date_fails_before_request() {
    harvester()
        .args(["harvest", "http://127.0.0.1:9/oai", "--from", "2024-13-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid parameter"));
}

#[test]
fn test_invalid_url_is_rejected() {
    harvester()
        .args(["identify", "repo.example.org/oai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid parameter"));
}

#[test]
fn test_unknown_format_is_rejected_by_parser() {
    harvester()
        .args(["harvest", "http://127.0.0.1:9/oai", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_upload_missing_items_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("items.json");
    harvester()
        .args([
            "upload",
            missing.to_str().unwrap(),
            "--dspace-url",
            "http://127.0.0.1:9/server",
            "--email",
            "a@b",
            "--password",
            "pw",
            "--collection",
            "c1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Items file does not exist"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_harvest_to_csv_file() {
    let server = MockServer::start().await;
    Mock::given(query_param("verb", "ListRecords"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <ListRecords>
    <record>
      <header><identifier>oai:repo:1</identifier><datestamp>2024-01-15</datestamp></header>
      <metadata>
        <oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/" xmlns:dc="http://purl.org/dc/elements/1.1/">
          <dc:title>Sample Paper</dc:title>
          <dc:creator>Alice</dc:creator>
        </oai_dc:dc>
      </metadata>
    </record>
  </ListRecords>
</OAI-PMH>"#,
            "text/xml",
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("records.csv");
    let url = format!("{}/oai", server.uri());
    let output_arg = output.clone();

    tokio::task::spawn_blocking(move || {
        harvester()
            .args(["harvest", url.as_str(), "--format", "csv", "--output"])
            .arg(&output_arg)
            .assert()
            .success()
            .stderr(predicate::str::contains("Saved to:"));
    })
    .await
    .unwrap();

    let csv = fs::read_to_string(&output).unwrap();
    assert!(csv.starts_with("identifier,datestamp,deleted"));
    assert!(csv.contains("oai:repo:1,2024-01-15,false,,Sample Paper,Alice"));
}
