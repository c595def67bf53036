#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use geoharvest_core::config::Config;

/// In-memory double of the storage REST API the client speaks: list, upsert
/// upload, delete, plus toggles for injecting faults.
#[derive(Default)]
pub struct StorageState {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub fail_list: AtomicBool,
    pub fail_uploads: AtomicBool,
    pub fail_deletes: Mutex<HashSet<String>>,
    pub list_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub last_upload_headers: Mutex<Option<HeaderMap>>,
}

pub struct MockStorage {
    pub endpoint: String,
    pub state: Arc<StorageState>,
}

impl MockStorage {
    pub fn config(&self) -> Config {
        self.config_with_limit(3)
    }

    pub fn config_with_limit(&self, max_bucket_files: usize) -> Config {
        Config {
            supabase_url: self.endpoint.clone(),
            supabase_key: "test-key".to_string(),
            supabase_bucket: "country-snapshots".to_string(),
            max_bucket_files,
            source_url: "http://page.invalid/".to_string(),
            render_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_millis(0),
            http_timeout: Duration::from_secs(5),
            interval: Duration::from_secs(60),
            snapshot_dir: PathBuf::from("."),
        }
    }

    pub fn seed_object(&self, name: &str) {
        self.state
            .objects
            .lock()
            .unwrap()
            .insert(name.to_string(), b"seeded".to_vec());
    }

    pub fn object_names(&self) -> Vec<String> {
        self.state.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn upload_calls(&self) -> usize {
        self.state.upload_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.state.delete_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }
}

pub async fn spawn() -> MockStorage {
    let state = Arc::new(StorageState::default());
    let app = Router::new()
        .route("/storage/v1/object/list/{bucket}", get(list_objects))
        .route(
            "/storage/v1/object/{bucket}/{name}",
            post(upload_object).delete(delete_object),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock storage listener");
    let addr = listener.local_addr().expect("mock storage local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock storage");
    });

    MockStorage {
        endpoint: format!("http://{addr}"),
        state,
    }
}

async fn list_objects(
    State(state): State<Arc<StorageState>>,
    Path(_bucket): Path<String>,
) -> Response {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_list.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "listing unavailable").into_response();
    }

    let objects = state.objects.lock().unwrap();
    let entries: Vec<serde_json::Value> = objects
        .keys()
        .map(|name| {
            serde_json::json!({
                "name": name,
                "id": "00000000-0000-0000-0000-000000000000",
                "updated_at": "2024-01-01T00:00:00.000Z",
            })
        })
        .collect();
    Json(entries).into_response()
}

async fn upload_object(
    State(state): State<Arc<StorageState>>,
    Path((_bucket, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.upload_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_upload_headers.lock().unwrap() = Some(headers);
    if state.fail_uploads.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upload rejected").into_response();
    }

    state.objects.lock().unwrap().insert(name, body.to_vec());
    (StatusCode::OK, "{\"Key\":\"ok\"}").into_response()
}

async fn delete_object(
    State(state): State<Arc<StorageState>>,
    Path((_bucket, name)): Path<(String, String)>,
) -> Response {
    state.delete_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_deletes.lock().unwrap().contains(&name) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "delete rejected").into_response();
    }

    if state.objects.lock().unwrap().remove(&name).is_none() {
        return (StatusCode::NOT_FOUND, "no such object").into_response();
    }
    (StatusCode::OK, "{}").into_response()
}
