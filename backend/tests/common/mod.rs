#![allow(dead_code)]

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use async_trait::async_trait;
use geoportal_backend::config::{AppConfig, GeoServerConfig, UploadConfig};
use geoportal_backend::geoserver::retry::RetryConfig;
use geoportal_backend::pipeline::dataset::LayerName;
use geoportal_backend::store::{FeatureTable, SpatialStore, StoreError};
use serde_json::{json, Value};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::Point;
use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const WORKSPACE: &str = "sembrando";
pub const DATASTORE: &str = "postgis_store";

// ---------------------------------------------------------------------------
// Spatial store
// ---------------------------------------------------------------------------

/// In-memory spatial store keyed by layer identifier.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, FeatureTable>>,
    pub fail_drop: AtomicBool,
}

impl MemoryStore {
    pub fn table(&self, layer: &str) -> Option<FeatureTable> {
        self.tables.lock().unwrap().get(layer).cloned()
    }

    pub fn insert(&self, layer: &str, table: FeatureTable) {
        self.tables.lock().unwrap().insert(layer.to_string(), table);
    }

    pub fn fail_drops(&self) {
        self.fail_drop.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpatialStore for MemoryStore {
    async fn replace_table(
        &self,
        layer: &LayerName,
        table: &FeatureTable,
    ) -> Result<u64, StoreError> {
        self.insert(layer.as_str(), table.clone());
        Ok(table.len() as u64)
    }

    async fn drop_table(&self, layer: &LayerName) -> Result<bool, StoreError> {
        if self.fail_drop.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.tables.lock().unwrap().remove(layer.as_str()).is_some())
    }
}

// ---------------------------------------------------------------------------
// Fake map server
// ---------------------------------------------------------------------------

/// State of the fake GeoServer REST API.
#[derive(Debug, Default)]
pub struct GeoServerState {
    pub datastores: BTreeSet<String>,
    pub feature_types: BTreeSet<String>,
    /// `"METHOD path"` of every request, path relative to `/geoserver/rest/`.
    pub requests: Vec<String>,
    /// The next `n` requests answer `503`.
    pub fail_next: u32,
    /// Every request answers `503`.
    pub unavailable: bool,
    /// DELETE requests answer `500`.
    pub fail_deletes: bool,
    /// Feature type creation answers `400`.
    pub reject_feature_types: bool,
}

pub struct FakeGeoServer {
    pub url: String,
    pub state: Arc<Mutex<GeoServerState>>,
    handle: ServerHandle,
}

impl FakeGeoServer {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(GeoServerState::default()));
        let data = web::Data::from(state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::to(handle_rest))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            url: format!("http://{addr}/geoserver"),
            state,
            handle,
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut GeoServerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn requests(&self) -> Vec<String> {
        self.with_state(|s| s.requests.clone())
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == request).count()
    }

    pub fn has_feature_type(&self, layer: &str) -> bool {
        self.with_state(|s| s.feature_types.contains(layer))
    }

    pub fn publish_existing(&self, layer: &str) {
        self.with_state(|s| {
            s.datastores.insert(DATASTORE.to_string());
            s.feature_types.insert(layer.to_string());
        });
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

async fn handle_rest(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<Mutex<GeoServerState>>,
) -> HttpResponse {
    let mut state = state.lock().unwrap();
    let method = req.method().as_str().to_string();
    let path = req
        .path()
        .trim_start_matches("/geoserver/rest/")
        .to_string();
    state.requests.push(format!("{method} {path}"));

    if req.headers().get("authorization").is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    if state.unavailable {
        return HttpResponse::ServiceUnavailable().body("maintenance");
    }
    if state.fail_next > 0 {
        state.fail_next -= 1;
        return HttpResponse::ServiceUnavailable().body("try again");
    }
    if method == "DELETE" && state.fail_deletes {
        return HttpResponse::InternalServerError().body("delete failed");
    }

    let segments: Vec<&str> = path.split('/').collect();
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    match (method.as_str(), segments.as_slice()) {
        ("GET", ["workspaces", _, "datastores", store]) => found(state.datastores.contains(*store)),
        ("POST", ["workspaces", _, "datastores"]) => {
            let Some(name) = payload["dataStore"]["name"].as_str() else {
                return HttpResponse::BadRequest().body("missing dataStore.name");
            };
            if !state.datastores.insert(name.to_string()) {
                return HttpResponse::InternalServerError().body("Store already exists");
            }
            HttpResponse::Created().body(name.to_string())
        }
        ("GET", ["workspaces", _, "datastores", _, "featuretypes", layer]) => {
            found(state.feature_types.contains(*layer))
        }
        ("POST", ["workspaces", _, "datastores", store, "featuretypes"]) => {
            if !state.datastores.contains(*store) {
                return HttpResponse::NotFound().body("No such data store");
            }
            if state.reject_feature_types {
                return HttpResponse::BadRequest()
                    .body("Trying to create new feature type with invalid srs");
            }
            let Some(name) = payload["featureType"]["name"].as_str() else {
                return HttpResponse::BadRequest().body("missing featureType.name");
            };
            if !state.feature_types.insert(name.to_string()) {
                return HttpResponse::InternalServerError().body("Resource named already exists");
            }
            HttpResponse::Created().body(name.to_string())
        }
        ("DELETE", ["workspaces", _, "datastores", _, "featuretypes", layer]) => {
            found(state.feature_types.remove(*layer))
        }
        ("DELETE", ["layers", qualified]) => {
            let layer = qualified.rsplit(':').next().unwrap_or_default();
            found(state.feature_types.contains(layer))
        }
        ("GET", ["workspaces", ws, "layers.json"]) => {
            if state.feature_types.is_empty() {
                return HttpResponse::Ok().json(json!({"layers": ""}));
            }
            let layers: Vec<Value> = state
                .feature_types
                .iter()
                .map(|name| {
                    let href = format!("http://fake/rest/workspaces/{ws}/layers/{name}.json");
                    json!({"name": name, "href": href})
                })
                .collect();
            HttpResponse::Ok().json(json!({"layers": {"layer": layers}}))
        }
        _ => HttpResponse::NotFound().finish(),
    }
}

fn found(exists: bool) -> HttpResponse {
    if exists {
        HttpResponse::Ok().json(json!({}))
    } else {
        HttpResponse::NotFound().body("No such resource")
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter: false,
    }
}

pub fn geoserver_config(url: &str) -> GeoServerConfig {
    GeoServerConfig {
        url: url.to_string(),
        workspace: WORKSPACE.to_string(),
        datastore: DATASTORE.to_string(),
        connect_timeout_secs: 2,
        request_timeout_secs: 5,
        retry: fast_retry(),
        ..GeoServerConfig::default()
    }
}

pub fn app_config(geoserver_url: &str, work_dir: &Path) -> AppConfig {
    AppConfig {
        geoserver: geoserver_config(geoserver_url),
        upload: UploadConfig {
            work_dir: Some(work_dir.to_path_buf()),
            max_upload_mb: 5,
            max_extracted_mb: 1,
        },
        ..AppConfig::default()
    }
}

/// A map server URL nothing listens on.
pub const UNREACHABLE_GEOSERVER: &str = "http://127.0.0.1:9/geoserver";

pub fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

// ---------------------------------------------------------------------------
// Archives
// ---------------------------------------------------------------------------

/// Zips the given `(name, contents)` entries.
pub fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Zipped point shapefile `<stem>.shp/.shx/.dbf` with `count` features.
pub fn shapefile_zip(stem: &str, count: usize) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let shp_path = dir.path().join(format!("{stem}.shp"));
    let table = TableWriterBuilder::new()
        .add_character_field(FieldName::try_from("NAME").unwrap(), 50)
        .add_numeric_field(FieldName::try_from("AREA").unwrap(), 10, 2);
    let mut writer = shapefile::Writer::from_path(&shp_path, table).unwrap();
    for i in 0..count {
        let mut record = Record::default();
        record.insert(
            "NAME".to_string(),
            FieldValue::Character(Some(format!("feature {i}"))),
        );
        record.insert("AREA".to_string(), FieldValue::Numeric(Some(i as f64)));
        writer
            .write_shape_and_record(&Point::new(-74.0 + i as f64 * 0.01, 4.6), &record)
            .unwrap();
    }
    drop(writer);

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        entries.push((name, std::fs::read(&path).unwrap()));
    }
    entries.sort();
    let refs: Vec<(&str, Vec<u8>)> = entries
        .iter()
        .map(|(name, bytes)| (name.as_str(), bytes.clone()))
        .collect();
    zip_of(&refs)
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

pub const BOUNDARY: &str = "geoportal-test-boundary";

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Form body with one file field.
pub fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    write!(
        body,
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/zip\r\n\r\n"
    )
    .unwrap();
    body.extend_from_slice(bytes);
    write!(body, "\r\n--{BOUNDARY}--\r\n").unwrap();
    body
}
