#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use swatch_api::auth::jwt::{generate_access_token, JwtConfig};
use swatch_api::config::{CatalogConfig, ImportConfig, ServerConfig};
use swatch_api::engine::ImportEngine;
use swatch_api::router::build_app_router;
use swatch_api::state::AppState;
use swatch_api::storage::LocalObjectStorage;
use swatch_core::pipeline::ImportPipeline;
use swatch_core::ports::{
    CatalogError, CatalogRef, CatalogVariant, CatalogWriter, LookupKey, ObjectStorage,
    WriteOptions,
};
use swatch_core::product_row::ProductRow;
use swatch_core::types::DbId;
use swatch_db::repositories::PgProfileSource;

pub const MULTIPART_BOUNDARY: &str = "swatch-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
///
/// Storage goes to a fresh directory under the system temp dir, writes are
/// unthrottled and pruning is allowed by policy.
pub fn test_config() -> ServerConfig {
    let storage_dir = std::env::temp_dir()
        .join("swatch-api-tests")
        .join(uuid::Uuid::new_v4().to_string());
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            access_token_expiry_mins: 15,
        },
        import: ImportConfig {
            max_concurrent_per_user: 3,
            retry_after_secs: 5,
            max_upload_bytes: 1024 * 1024,
            max_rows: 1_000,
            rows_per_second: 0,
            write_batch_size: 25,
            allow_prune: true,
            idempotency_window_hours: 24,
            default_currency: "usd".to_string(),
            storage_dir,
            public_base_url: "http://localhost:3000/files".to_string(),
        },
        catalog: CatalogConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_token: None,
        },
    }
}

/// In-memory catalog that creates every product and records the calls.
#[derive(Default)]
pub struct RecordingCatalog {
    calls: Mutex<Vec<String>>,
}

impl RecordingCatalog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CatalogWriter for RecordingCatalog {
    async fn find_product(&self, _key: &LookupKey) -> Result<Option<CatalogRef>, CatalogError> {
        Ok(None)
    }

    async fn create_product(
        &self,
        row: &ProductRow,
        _options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError> {
        self.log(format!("create {}", row.title));
        Ok(CatalogRef {
            product_id: format!("prod_{}", row.line),
            variant_id: Some(format!("var_{}", row.line)),
        })
    }

    async fn update_product(
        &self,
        existing: &CatalogRef,
        row: &ProductRow,
        _options: &WriteOptions,
    ) -> Result<CatalogRef, CatalogError> {
        self.log(format!("update {}", row.title));
        Ok(existing.clone())
    }

    async fn list_variants(&self, _product_id: &str) -> Result<Vec<CatalogVariant>, CatalogError> {
        Ok(Vec::new())
    }

    async fn delete_variants(
        &self,
        product_id: &str,
        _variant_ids: &[String],
    ) -> Result<(), CatalogError> {
        self.log(format!("delete {product_id}"));
        Ok(())
    }
}

/// Build the full application router, with all middleware layers, on top
/// of the given pool and an in-memory catalog.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_config(), Arc::new(RecordingCatalog::default()))
}

/// Like [`build_test_app`] with an explicit config and catalog.
pub fn build_test_app_with(
    pool: PgPool,
    config: ServerConfig,
    catalog: Arc<RecordingCatalog>,
) -> Router {
    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStorage::new(
        config.import.storage_dir.clone(),
        config.import.public_base_url.clone(),
    ));
    let pipeline = ImportPipeline::new(
        catalog,
        Arc::clone(&storage),
        Arc::new(PgProfileSource::new(pool.clone())),
        config.import.pipeline_config(),
    );
    let engine = Arc::new(ImportEngine::new(pool.clone(), pipeline, Arc::clone(&storage)));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine,
        storage,
    };
    build_app_router(state, &config)
}

/// Mint a bearer token signed with the test config's secret.
pub fn token_for(user_id: DbId, role: &str) -> String {
    generate_access_token(user_id, role, &test_config().jwt).unwrap()
}

pub fn manager_token(user_id: DbId) -> String {
    token_for(user_id, "catalog_manager")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn json_auth(
    app: &Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    json_auth(app, "POST", uri, body, token).await
}

pub async fn put_json_auth(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    json_auth(app, "PUT", uri, body, token).await
}

/// One part of a multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str),
    /// A file part with arbitrary bytes, e.g. a workbook.
    Binary(&'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(filename, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                         Content-Type: text/csv\r\n\r\n{content}\r\n"
                    )
                    .as_bytes(),
                );
            }
            Part::Binary(filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a multipart submission to `/api/v1/imports`.
pub async fn submit(
    app: &Router,
    token: &str,
    headers: &[(&str, &str)],
    parts: &[Part<'_>],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/imports")
        .header("authorization", format!("Bearer {token}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        );
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::from(multipart_body(parts))).unwrap()).await
}

/// Poll a job until it reaches a terminal status and return its view.
pub async fn wait_for_terminal(app: &Router, job_id: &str, token: &str) -> serde_json::Value {
    for _ in 0..100 {
        let response = get_auth(app, &format!("/api/v1/imports/{job_id}"), token).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
        if matches!(status.as_str(), "completed" | "failed" | "canceled") {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {job_id} did not finish in time");
}
