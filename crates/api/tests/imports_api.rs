//! Integration tests for the `/imports` API.
//!
//! Jobs run for real against an in-memory catalog and a temp-dir object
//! store; tests poll the status endpoint until the job is terminal.

mod common;

use std::path::Path;
use std::sync::Arc;

use axum::http::StatusCode;
use common::{body_json, get, get_auth, manager_token, submit, wait_for_terminal, Part};
use sqlx::PgPool;
use swatch_core::import_job::ImportOptions;
use swatch_db::models::NewImportJob;
use swatch_db::repositories::{CreateOutcome, ImportJobRepo, SubmitLimits};

const THREE_ROWS: &str = "\
title,min_increment,min_cut,variant_sku
Belgian Linen,0.25,1,BL-1
Canvas,0.3,1,CV-1
,0.5,1,XX-1
";

async fn insert_created_job(pool: &PgPool, owner_id: i64, key: &str) {
    let outcome = ImportJobRepo::create_idempotent(
        pool,
        &NewImportJob {
            id: uuid::Uuid::new_v4(),
            owner_id,
            trace_id: "trace".into(),
            idempotency_key: key.into(),
            options: ImportOptions::default(),
            prune_enabled: false,
            source_filename: "seed.csv".into(),
            source_file_key: format!("imports/{key}/source/seed.csv"),
            source_file_url: format!("http://localhost:3000/files/imports/{key}/source/seed.csv"),
            submitted_role: "catalog_manager".into(),
        },
        SubmitLimits {
            window_hours: 24,
            max_active: 100,
        },
    )
    .await
    .unwrap();
    assert!(matches!(outcome, CreateOutcome::Created(_)));
}

/// Source files currently held by the object store.
fn stored_sources(storage_dir: &Path) -> usize {
    let Ok(jobs) = std::fs::read_dir(storage_dir.join("imports")) else {
        return 0;
    };
    jobs.filter_map(Result::ok)
        .filter_map(|job| std::fs::read_dir(job.path().join("source")).ok())
        .map(|files| files.count())
        .sum()
}

fn bolts_workbook() -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in ["title", "min_increment", "min_cut", "variant_sku"]
        .iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    let rows = [("Belgian Linen", 0.25, "BL-1"), ("Canvas", 0.3, "CV-1")];
    for (i, (title, increment, sku)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, *title).unwrap();
        sheet.write_number(row, 1, *increment).unwrap();
        sheet.write_number(row, 2, 1.0).unwrap();
        sheet.write_string(row, 3, *sku).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

fn job_id_of(json: &serde_json::Value) -> String {
    json["data"]["job_id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn submission_without_idempotency_key_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let token = manager_token(1);

    let response = submit(&app, &token, &[], &[Part::File("a.csv", THREE_ROWS)]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "IDEMPOTENCY_KEY_REQUIRED");
    assert_eq!(ImportJobRepo::count_active(&pool, 1).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn malformed_option_names_the_field(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-mode")],
        &[Part::Text("mode", "sometimes"), Part::File("a.csv", THREE_ROWS)],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_OPTIONS");
    assert_eq!(json["details"]["field"], "mode");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn submission_needs_a_file_or_source_job(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = manager_token(1);

    let response = submit(&app, &token, &[("idempotency-key", "k-empty")], &[]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_OPTIONS");
    assert_eq!(json["details"]["field"], "file");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn legacy_workbook_upload_is_unsupported(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-xls")],
        &[Part::Binary("sheet.xls", &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])],
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNSUPPORTED_FORMAT");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn corrupt_workbook_upload_is_invalid(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-corrupt")],
        &[Part::Binary("sheet.xlsx", b"PK\x03\x04 truncated")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_FILE");
    assert_eq!(ImportJobRepo::count_active(&pool, 1).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_mapping_profile_is_not_found(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-profile")],
        &[
            Part::Text("mapping_profile_id", "0190d3c4-missing"),
            Part::File("a.csv", THREE_ROWS),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrency_ceiling_is_retryable(pool: PgPool) {
    for key in ["busy-1", "busy-2", "busy-3"] {
        insert_created_job(&pool, 5, key).await;
    }
    let app = common::build_test_app(pool.clone());
    let token = manager_token(5);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-fourth")],
        &[Part::File("a.csv", THREE_ROWS)],
    )
    .await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "5");
    let json = body_json(response).await;
    assert_eq!(json["code"], "CONCURRENCY_LIMIT");
    assert_eq!(json["details"]["limit"], 3);
    assert_eq!(ImportJobRepo::count_active(&pool, 5).await.unwrap(), 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_submissions_with_distinct_keys_respect_the_ceiling(pool: PgPool) {
    insert_created_job(&pool, 6, "busy-1").await;
    insert_created_job(&pool, 6, "busy-2").await;
    let mut config = common::test_config();
    // One write per second keeps the accepted job active while the others race.
    config.import.rows_per_second = 1;
    config.import.write_batch_size = 1;
    let storage_dir = config.import.storage_dir.clone();
    let app = common::build_test_app_with(
        pool.clone(),
        config,
        Arc::new(common::RecordingCatalog::default()),
    );
    let token = manager_token(6);

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let app = app.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let key = format!("k-race-{i}");
                let response = submit(
                    &app,
                    &token,
                    &[("idempotency-key", key.as_str())],
                    &[Part::Text("mode", "execute"), Part::File("bolts.csv", THREE_ROWS)],
                )
                .await;
                let status = response.status();
                (status, body_json(response).await)
            })
        })
        .collect();

    let mut accepted = Vec::new();
    let mut refused = 0;
    for handle in handles {
        let (status, json) = handle.await.unwrap();
        match status {
            StatusCode::ACCEPTED => accepted.push(job_id_of(&json)),
            StatusCode::TOO_MANY_REQUESTS => {
                assert_eq!(json["code"], "CONCURRENCY_LIMIT");
                refused += 1;
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!((accepted.len(), refused), (1, 4));
    assert_eq!(ImportJobRepo::count_active(&pool, 6).await.unwrap(), 3);
    assert_eq!(stored_sources(&storage_dir), 1);

    let response = common::post_json_auth(
        &app,
        &format!("/api/v1/imports/{}/cancel", accepted[0]),
        serde_json::json!({}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    wait_for_terminal(&app, &accepted[0], &token).await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn prune_without_confirmations_restates_both(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-prune")],
        &[
            Part::Text("force_prune_missing_variants", "true"),
            Part::File("a.csv", THREE_ROWS),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PRUNE_CONFIRMATION_REQUIRED");
    assert_eq!(json["details"]["missing"].as_array().unwrap().len(), 2);
    assert_eq!(json["details"]["required"]["header"], "X-Confirm-Prune: yes");
    assert_eq!(json["details"]["required"]["prune_confirm_token"], "PRUNE_VARIANTS");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn prune_is_refused_when_policy_disables_it(pool: PgPool) {
    let mut config = common::test_config();
    config.import.allow_prune = false;
    let app = common::build_test_app_with(
        pool,
        config,
        Arc::new(common::RecordingCatalog::default()),
    );
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-prune-off"), ("x-confirm-prune", "yes")],
        &[
            Part::Text("force_prune_missing_variants", "true"),
            Part::Text("prune_confirm_token", "PRUNE_VARIANTS"),
            Part::File("a.csv", THREE_ROWS),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PRUNE_DISABLED");
}

// ---------------------------------------------------------------------------
// Running jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn dry_run_completes_with_reports_and_no_writes(pool: PgPool) {
    let catalog = Arc::new(common::RecordingCatalog::default());
    let app = common::build_test_app_with(pool, common::test_config(), Arc::clone(&catalog));
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-dry")],
        &[Part::File("bolts.csv", THREE_ROWS)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let data = &json["data"];
    assert_eq!(data["mode"], "dry_run");
    assert_eq!(data["idempotency_key"], "k-dry");
    let job_id = data["job_id"].as_str().unwrap().to_string();
    assert_eq!(data["links"]["status"], format!("/api/v1/imports/{job_id}"));

    let job = wait_for_terminal(&app, &job_id, &token).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"]["rows_total"], 3);
    assert_eq!(job["progress"]["rows_valid"], 1);
    assert_eq!(job["progress"]["rows_invalid"], 2);
    assert!(job["completed_at"].is_string());
    assert!(job["stats"]["elapsed_seconds"].is_number());
    assert!(job["error"].is_null());

    let report_url = job["artifacts"]["validation_report"].as_str().unwrap();
    assert!(report_url.starts_with("http://localhost:3000/files/imports/"));
    assert!(job["artifacts"]["error_rows"].is_string());
    assert!(catalog.calls().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn execute_writes_only_valid_rows(pool: PgPool) {
    let catalog = Arc::new(common::RecordingCatalog::default());
    let app = common::build_test_app_with(pool, common::test_config(), Arc::clone(&catalog));
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-exec")],
        &[Part::Text("mode", "execute"), Part::File("bolts.csv", THREE_ROWS)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let job = wait_for_terminal(&app, &job_id, &token).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"]["created"], 1);
    assert_eq!(catalog.calls(), vec!["create Belgian Linen".to_string()]);

    let response = get_auth(&app, &format!("/api/v1/imports/{job_id}/artifacts"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let kinds: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"error_rows"));
    assert!(kinds.contains(&"result_rows"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn owner_default_profile_maps_unnamed_submissions(pool: PgPool) {
    let app = common::build_test_app(pool);
    let owner = manager_token(1);
    let response = common::post_json_auth(
        &app,
        "/api/v1/mapping-profiles",
        serde_json::json!({
            "name": "House sheet",
            "mapping": { "Fabric": "title", "Cost/yd": "retail_price" },
            "is_default": true,
        }),
        &owner,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let csv = "Fabric,Cost/yd\nBelgian Linen,12.50\n";
    let mut results = Vec::new();
    for (user, token) in [(1, owner), (2, manager_token(2))] {
        let key = format!("k-default-{user}");
        let response = submit(
            &app,
            &token,
            &[("idempotency-key", key.as_str())],
            &[Part::File("bolts.csv", csv)],
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job_id = job_id_of(&body_json(response).await);
        results.push(wait_for_terminal(&app, &job_id, &token).await);
    }

    let with_default = &results[0];
    assert_eq!(with_default["column_mapping"]["Fabric"], "title");
    assert_eq!(with_default["progress"]["rows_valid"], 1);

    // No default of their own: headers are taken as field names.
    let without = &results[1];
    assert_eq!(without["column_mapping"]["Fabric"], "Fabric");
    assert_eq!(without["progress"]["rows_invalid"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn same_idempotency_key_returns_the_same_job(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let token = manager_token(1);
    let parts = [Part::File("bolts.csv", THREE_ROWS)];

    let first = submit(&app, &token, &[("idempotency-key", "k-same")], &parts).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let first = body_json(first).await;

    let second = submit(&app, &token, &[("idempotency-key", "k-same")], &parts).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;

    assert_eq!(first["data"]["job_id"], second["data"]["job_id"]);
    assert_eq!(second["data"]["created"], false);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM import_jobs WHERE idempotency_key = 'k-same'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn racing_replays_leave_one_stored_upload(pool: PgPool) {
    let config = common::test_config();
    let storage_dir = config.import.storage_dir.clone();
    let app = common::build_test_app_with(
        pool.clone(),
        config,
        Arc::new(common::RecordingCatalog::default()),
    );
    let token = manager_token(1);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let app = app.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let response = submit(
                    &app,
                    &token,
                    &[("idempotency-key", "k-replay")],
                    &[Part::File("bolts.csv", THREE_ROWS)],
                )
                .await;
                let status = response.status();
                (status, job_id_of(&body_json(response).await))
            })
        })
        .collect();

    let mut job_ids = Vec::new();
    let mut accepted = 0;
    for handle in handles {
        let (status, job_id) = handle.await.unwrap();
        if status == StatusCode::ACCEPTED {
            accepted += 1;
        } else {
            assert_eq!(status, StatusCode::OK);
        }
        job_ids.push(job_id);
    }
    assert_eq!(accepted, 1);
    job_ids.sort();
    job_ids.dedup();
    assert_eq!(job_ids.len(), 1);

    wait_for_terminal(&app, &job_ids[0], &token).await;
    assert_eq!(stored_sources(&storage_dir), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn workbook_upload_runs_like_csv(pool: PgPool) {
    let catalog = Arc::new(common::RecordingCatalog::default());
    let app = common::build_test_app_with(pool, common::test_config(), Arc::clone(&catalog));
    let token = manager_token(1);
    let workbook = bolts_workbook();

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-xlsx")],
        &[Part::Text("mode", "execute"), Part::Binary("bolts.xlsx", &workbook)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = job_id_of(&body_json(response).await);

    let job = wait_for_terminal(&app, &job_id, &token).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["source_filename"], "bolts.xlsx");
    assert_eq!(job["progress"]["rows_total"], 2);
    assert_eq!(job["progress"]["created"], 1);
    assert_eq!(catalog.calls(), vec!["create Belgian Linen".to_string()]);

    let annotated = job["artifacts"]["annotated_xlsx"].as_str().unwrap();
    assert!(annotated.ends_with("annotated_source.xlsx"));
    let path = annotated.trim_start_matches("http://localhost:3000");
    let response = get_auth(&app, path, &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    assert!(bytes.starts_with(b"PK"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stored_files_are_private_to_their_submitter(pool: PgPool) {
    let app = common::build_test_app(pool);
    let owner = manager_token(1);

    let response = submit(
        &app,
        &owner,
        &[("idempotency-key", "k-files")],
        &[Part::File("bolts.csv", THREE_ROWS)],
    )
    .await;
    let job_id = job_id_of(&body_json(response).await);
    let job = wait_for_terminal(&app, &job_id, &owner).await;

    let report = job["artifacts"]["validation_report"].as_str().unwrap();
    let report = report.trim_start_matches("http://localhost:3000");
    let source = job["source_file_url"].as_str().unwrap();
    let source = source.trim_start_matches("http://localhost:3000");

    for path in [report, source] {
        assert_eq!(get(&app, path).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            get_auth(&app, path, &manager_token(2)).await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(get_auth(&app, path, &owner).await.status(), StatusCode::OK);
    }
    assert_eq!(
        get_auth(&app, "/files/elsewhere/a.csv", &owner).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_reuses_an_earlier_upload(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-original")],
        &[Part::File("bolts.csv", THREE_ROWS)],
    )
    .await;
    let original = body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_terminal(&app, &original, &token).await;

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-retry")],
        &[Part::Text("source_job_id", &original)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let retry = body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(retry, original);

    let job = wait_for_terminal(&app, &retry, &token).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["source_filename"], "bolts.csv");
    assert_eq!(job["progress"]["rows_total"], 3);
}

// ---------------------------------------------------------------------------
// Reading and canceling
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn jobs_are_private_to_their_submitter(pool: PgPool) {
    let app = common::build_test_app(pool);
    let owner = manager_token(1);
    let other = manager_token(2);

    let response = submit(
        &app,
        &owner,
        &[("idempotency-key", "k-private")],
        &[Part::File("bolts.csv", THREE_ROWS)],
    )
    .await;
    let job_id = body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = get_auth(&app, &format!("/api/v1/imports/{job_id}"), &other).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get_auth(&app, "/api/v1/imports", &other).await;
    let json = body_json(response).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn canceling_a_finished_job_conflicts(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = manager_token(1);

    let response = submit(
        &app,
        &token,
        &[("idempotency-key", "k-done")],
        &[Part::File("bolts.csv", THREE_ROWS)],
    )
    .await;
    let job_id = body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_terminal(&app, &job_id, &token).await;

    let response = common::post_json_auth(
        &app,
        &format!("/api/v1/imports/{job_id}/cancel"),
        serde_json::json!({}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn canceling_a_queued_job_marks_it_canceled(pool: PgPool) {
    insert_created_job(&pool, 3, "k-queued").await;
    let job = ImportJobRepo::find_by_idempotency_key(&pool, 3, "k-queued", 24)
        .await
        .unwrap()
        .unwrap();
    let app = common::build_test_app(pool);
    let token = manager_token(3);

    let response = common::post_json_auth(
        &app,
        &format!("/api/v1/imports/{}/cancel", job.id),
        serde_json::json!({}),
        &token,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "canceled");
    assert!(json["data"]["completed_at"].is_string());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn listing_filters_by_status(pool: PgPool) {
    insert_created_job(&pool, 4, "k-a").await;
    insert_created_job(&pool, 4, "k-b").await;
    let app = common::build_test_app(pool);
    let token = manager_token(4);

    let response = get_auth(&app, "/api/v1/imports?status=created", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let response = get_auth(&app, "/api/v1/imports?status=completed", &token).await;
    let json = body_json(response).await;
    assert!(json["data"].as_array().unwrap().is_empty());

    let response = get_auth(&app, "/api/v1/imports?status=bogus", &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
