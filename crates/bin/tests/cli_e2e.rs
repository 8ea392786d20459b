//! End-to-end CLI tests for the yuho binary.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_BODY: &str = r#"{
    "metadata": {"status": "200", "message": "OK"},
    "results": [
        {"docID": "S100CUR", "edinetCode": "E02144", "docTypeCode": "120",
         "periodStart": "2023-04-01", "periodEnd": "2024-03-31",
         "submitDateTime": "2024-06-25 15:00", "withdrawalStatus": "0", "consolidatedFlag": "1",
         "filerName": "トヨタ自動車株式会社"},
        {"docID": "S100PRV", "edinetCode": "E02144", "docTypeCode": "120",
         "periodStart": "2022-04-01", "periodEnd": "2023-03-31",
         "submitDateTime": "2023-06-26 15:00", "withdrawalStatus": "0", "consolidatedFlag": "1"}
    ]
}"#;

const EMPTY_LIST: &str = r#"{"metadata": {"status": "200", "message": "OK"}, "results": []}"#;

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn yuho(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("yuho").unwrap();
    cmd.current_dir(workdir).env_remove("RUST_LOG");
    cmd
}

async fn mount_list(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/documents.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[test]
fn test_help_displays_usage() {
    let mut cmd = Command::cargo_bin("yuho").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("annual securities reports"));
}

#[test]
fn test_invalid_filer_code_fails() {
    let dir = TempDir::new().unwrap();
    yuho(dir.path())
        .args(["fetch", "7203", "--no-cache"])
        .env("APIKEY", "test-key")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid filer code"));
}

#[test]
fn test_inverted_range_fails() {
    let dir = TempDir::new().unwrap();
    yuho(dir.path())
        .args(["fetch", "E02144", "--from", "2024-06-30", "--to", "2024-06-01", "--no-cache"])
        .env("APIKEY", "test-key")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid date range"));
}

#[test]
fn test_missing_api_key_fails() {
    let dir = TempDir::new().unwrap();
    yuho(dir.path())
        .args(["fetch", "E02144", "--no-cache"])
        .env_remove("APIKEY")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("APIKEY"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_writes_index_and_artifacts() {
    let server = MockServer::start().await;
    mount_list(&server, LIST_BODY).await;
    for doc in ["S100CUR", "S100PRV"] {
        Mock::given(method("GET"))
            .and(path(format!("/documents/{doc}")))
            .and(query_param("type", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[(
                "XBRL/PublicDoc/report.htm",
                b"<html>yuho</html>".as_slice(),
            )])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/documents/{doc}")))
            .and(query_param("type", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/documents/{doc}")))
            .and(query_param("type", "3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let outdir = dir.path().join("out");
    yuho(dir.path())
        .args(["-q", "fetch", "e02144", "--from", "2024-06-24", "--to", "2024-06-25", "--no-cache"])
        .arg("--outdir")
        .arg(&outdir)
        .arg("--api-base")
        .arg(server.uri())
        .env("APIKEY", "test-key")
        .assert()
        .success()
        .stdout(predicate::str::contains("S100CUR"))
        .stdout(predicate::str::contains("Index written"));

    let root = outdir.join("E02144");
    assert!(root.join("S100CUR/type1/document.zip").exists());
    assert!(root.join("S100CUR/type1/files/XBRL/PublicDoc/report.htm").exists());
    assert!(root.join("S100CUR/document.pdf").exists());
    assert!(!root.join("S100CUR/attachments/attachments.zip").exists());

    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(root.join("index.json")).unwrap()).unwrap();
    assert_eq!(index["edinetCode"], "E02144");
    assert_eq!(index["prefer"], "consolidated");
    assert_eq!(index["documents"][0]["label"], "latest");
    assert_eq!(index["documents"][0]["docID"], "S100CUR");
    assert_eq!(index["documents"][1]["docID"], "S100PRV");

    let latest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(root.join("yuho_latest.json")).unwrap()).unwrap();
    assert_eq!(latest["meta"]["docID"], "S100CUR");

    let written = std::fs::read_to_string(root.join("index.json")).unwrap();
    assert!(!written.contains("test-key"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_without_filings_succeeds() {
    let server = MockServer::start().await;
    mount_list(&server, EMPTY_LIST).await;

    let dir = TempDir::new().unwrap();
    let outdir = dir.path().join("out");
    yuho(dir.path())
        .args(["-q", "fetch", "E02144", "--from", "2024-06-24", "--to", "2024-06-25", "--no-cache"])
        .arg("--outdir")
        .arg(&outdir)
        .arg("--api-base")
        .arg(server.uri())
        .env("APIKEY", "test-key")
        .assert()
        .success()
        .stdout(predicate::str::contains("no filings found"));

    assert!(!outdir.join("E02144").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_key_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents.json"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"StatusCode": 401, "message": "Access denied due to invalid subscription key."}"#,
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    yuho(dir.path())
        .args(["-q", "fetch", "E02144", "--from", "2024-06-24", "--to", "2024-06-24", "--no-cache"])
        .arg("--api-base")
        .arg(server.uri())
        .env("APIKEY", "bad-key")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("subscription key"))
        .stderr(predicate::str::contains("bad-key").not());
}

#[test]
fn test_cache_stats_and_clear() {
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("cache");

    yuho(dir.path())
        .args(["cache", "stats"])
        .arg("--cache-dir")
        .arg(&cache_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 entries"));

    yuho(dir.path())
        .args(["cache", "clear"])
        .arg("--cache-dir")
        .arg(&cache_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0"));
}

#[test]
fn test_clear_cache_conflicts_with_no_cache() {
    let dir = TempDir::new().unwrap();
    yuho(dir.path())
        .args(["fetch", "E02144", "--no-cache", "--clear-cache"])
        .env("APIKEY", "test-key")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_out_of_range_ttl_is_rejected() {
    let dir = TempDir::new().unwrap();
    yuho(dir.path())
        .args(["cache", "sweep", "--cache-ttl", "100000000"])
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--cache-ttl"));

    yuho(dir.path())
        .args(["cache", "sweep", "--cache-ttl", "36500"])
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .assert()
        .success();
}
