//! End-to-end replacement scenarios against a mock CMA.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relink_contentful::{Auth, CmaClient, CmaConfig, VERSION_HEADER};
use relink_core::ledger::Ledgers;
use relink_pipeline::run_replace;

fn client(server: &MockServer) -> CmaClient {
    let config = CmaConfig {
        space_id: "sp".into(),
        environment: "master".into(),
        auth: Auth {
            header_name: "Authorization".into(),
            scheme: "Bearer".into(),
            token: "tok".into(),
        },
        field_key: "downloadableFile".into(),
        locale: "en-US".into(),
        timeout: Duration::from_secs(5),
    };
    CmaClient::with_base_urls(config, &server.uri(), &server.uri())
        .unwrap()
        .with_insecure_downloads()
}

fn entry_body(version: i64, linked_asset: &str) -> serde_json::Value {
    json!({
        "sys": { "id": "E1", "version": version },
        "fields": {
            "downloadableFile": {
                "en-US": { "sys": { "type": "Link", "linkType": "Asset", "id": linked_asset } }
            }
        }
    })
}

fn old_asset_body(server: &MockServer) -> serde_json::Value {
    json!({
        "sys": { "id": "A1", "version": 3, "createdAt": "2024-01-31T15:45:02Z" },
        "fields": {
            "title": { "en-US": "Quarterly report" },
            "description": { "en-US": "Q1 figures" },
            "file": { "en-US": {
                "url": format!("{}/bin/report.pdf", server.uri()),
                "fileName": "report.pdf",
                "contentType": "application/pdf",
            }},
        }
    })
}

fn read_ledger(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

struct Run {
    dir: tempfile::TempDir,
}

impl Run {
    fn new(input: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.csv"), input).unwrap();
        Self { dir }
    }

    fn input(&self) -> std::path::PathBuf {
        self.dir.path().join("input.csv")
    }

    fn dest_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("downloaded")
    }

    fn ledgers(&self) -> Ledgers {
        Ledgers::open(
            &self.dir.path().join("success.csv"),
            &self.dir.path().join("failed.csv"),
        )
        .unwrap()
    }

    fn success_rows(&self) -> Vec<Vec<String>> {
        read_ledger(&self.dir.path().join("success.csv"))
    }

    fn failed_rows(&self) -> Vec<Vec<String>> {
        read_ledger(&self.dir.path().join("failed.csv"))
    }
}

/// Mount everything up to (and including) a successful new-asset
/// publish: old-asset fetch, binary download, upload, create, process,
/// poll, publish.
async fn mount_new_asset_flow(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/assets/A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(old_asset_body(server)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bin/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf bytes".to_vec()))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/spaces/sp/uploads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sys": { "id": "up1" } })))
        .mount(server)
        .await;
    // The re-upload must restore the original file name (collision
    // stamp stripped).
    Mock::given(method("POST"))
        .and(path("/spaces/sp/environments/master/assets"))
        .and(body_partial_json(json!({
            "fields": { "file": { "en-US": { "fileName": "report.pdf" } } }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sys": { "id": "N1" } })))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/spaces/sp/environments/master/assets/N1/files/en-US/process"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/assets/N1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys": { "version": 7 },
            "fields": { "file": { "en-US": { "url": "//assets.example/sp/report.pdf" } } }
        })))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/spaces/sp/environments/master/assets/N1/published"))
        .and(header(VERSION_HEADER, "7"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Mount the retire-old / repoint-entry tail of the happy path.
async fn mount_retire_and_repoint(server: &MockServer) {
    Mock::given(method("DELETE"))
        .and(path("/spaces/sp/environments/master/assets/A1/published"))
        .and(header(VERSION_HEADER, "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys": { "id": "A1", "version": 4 }
        })))
        .mount(server)
        .await;
    // Archive uses the post-unpublish version, not the stale one.
    Mock::given(method("PUT"))
        .and(path("/spaces/sp/environments/master/assets/A1/archived"))
        .and(query_param("version", "4"))
        .and(header(VERSION_HEADER, "4"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .and(header(VERSION_HEADER, "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys": { "id": "E1", "version": 6 }
        })))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/spaces/sp/environments/master/entries/E1/published"))
        .and(header(VERSION_HEADER, "6"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn successful_row_lands_in_the_success_ledger() {
    let server = MockServer::start().await;

    // First entry fetch sees the old link; the validation re-fetch
    // sees the new one.
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry_body(5, "A1")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_new_asset_flow(&server).await;
    mount_retire_and_repoint(&server).await;
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry_body(7, "N1")))
        .mount(&server)
        .await;

    let run = Run::new("entry_id,asset_id\nE1,A1\n");
    let mut ledgers = run.ledgers();
    let summary = run_replace(&client(&server), &run.input(), &run.dest_dir(), &mut ledgers)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 1); // the header line

    let success = run.success_rows();
    assert_eq!(success.len(), 2);
    assert_eq!(success[1], ["E1", "A1", "N1"]);
    assert_eq!(run.failed_rows().len(), 1); // header only

    // The downloaded copy carries the collision stamp.
    assert!(run.dest_dir().join("report_20240131_154502.pdf").exists());
}

#[tokio::test]
async fn archive_failure_keeps_the_new_asset_id_in_the_ledger() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry_body(5, "A1")))
        .mount(&server)
        .await;
    mount_new_asset_flow(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/spaces/sp/environments/master/assets/A1/published"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys": { "id": "A1", "version": 4 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/spaces/sp/environments/master/assets/A1/archived"))
        .respond_with(ResponseTemplate::new(409).set_body_string("version mismatch"))
        .mount(&server)
        .await;
    // The entry must stay untouched once retiring the old asset fails.
    Mock::given(method("PATCH"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let run = Run::new("E1,A1\n");
    let mut ledgers = run.ledgers();
    let summary = run_replace(&client(&server), &run.input(), &run.dest_dir(), &mut ledgers)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(run.success_rows().len(), 1); // header only

    let failed = run.failed_rows();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[1][0], "E1");
    assert_eq!(failed[1][1], "A1");
    // Failures after asset creation always carry the new id so the
    // orphaned asset can be reconciled by hand.
    assert_eq!(failed[1][2], "N1");
    assert!(failed[1][3].starts_with("archive old asset:"), "{}", failed[1][3]);
}

#[tokio::test]
async fn processing_timeout_fails_the_row_before_the_old_asset_is_touched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry_body(5, "A1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/assets/A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(old_asset_body(&server)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bin/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf bytes".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/spaces/sp/uploads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sys": { "id": "up1" } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/spaces/sp/environments/master/assets"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sys": { "id": "N1" } })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/spaces/sp/environments/master/assets/N1/files/en-US/process"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    // Processing never yields a file URL.
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/assets/N1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys": { "version": 2 },
            "fields": {}
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/spaces/sp/environments/master/assets/A1/published"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let run = Run::new("E1,A1\n");
    let mut ledgers = run.ledgers();
    let cma = client(&server).with_processing_poll(Duration::from_millis(1), 2);
    let summary = run_replace(&cma, &run.input(), &run.dest_dir(), &mut ledgers)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    let failed = run.failed_rows();
    assert_eq!(failed.len(), 2);
    // The new asset never finished, so no id is recorded for it.
    assert_eq!(failed[1][2], "");
    assert!(failed[1][3].starts_with("create new asset:"), "{}", failed[1][3]);
    assert!(failed[1][3].contains("processing did not complete"));
}

#[tokio::test]
async fn validation_mismatch_is_its_own_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry_body(5, "A1")))
        .mount(&server)
        .await;
    mount_new_asset_flow(&server).await;
    mount_retire_and_repoint(&server).await;
    // Every call succeeded, yet the re-fetched entry still links the
    // old asset (the single entry mock above serves the validation
    // fetch too).

    let run = Run::new("E1,A1\n");
    let mut ledgers = run.ledgers();
    let summary = run_replace(&client(&server), &run.input(), &run.dest_dir(), &mut ledgers)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    let failed = run.failed_rows();
    assert_eq!(failed[1][2], "N1");
    assert_eq!(failed[1][3], "validation: expected asset N1 but found A1");
}

#[tokio::test]
async fn rows_continue_after_a_failure() {
    let server = MockServer::start().await;

    // E1 fails at the entry fetch; E2 fails at the asset fetch.  Both
    // land in the failure ledger and the run completes.
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/entries/E1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such entry"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/entries/E2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys": { "id": "E2", "version": 1 },
            "fields": {}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/spaces/sp/environments/master/assets/A2"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such asset"))
        .mount(&server)
        .await;

    let run = Run::new("E1,A1\nE2,A2\n");
    let mut ledgers = run.ledgers();
    let summary = run_replace(&client(&server), &run.input(), &run.dest_dir(), &mut ledgers)
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 2);

    let failed = run.failed_rows();
    assert_eq!(failed.len(), 3);
    assert!(failed[1][3].starts_with("fetch entry:"));
    assert!(failed[2][3].starts_with("fetch asset:"));
}

#[tokio::test]
async fn header_and_malformed_rows_produce_no_ledger_entries() {
    let server = MockServer::start().await;

    let run = Run::new("entry_id,asset_id\n,missing-entry\nonly-one-column\n");
    let mut ledgers = run.ledgers();
    let summary = run_replace(&client(&server), &run.input(), &run.dest_dir(), &mut ledgers)
        .await
        .unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(run.success_rows().len(), 1); // header only
    assert_eq!(run.failed_rows().len(), 1); // header only
}
