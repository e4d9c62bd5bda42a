//! Static configuration loaded once at startup.
//!
//! Values come from an optional `geoportal.toml` in the working directory,
//! overridden by environment variables prefixed with `GEOPORTAL` (nested keys
//! separated by `__`, e.g. `GEOPORTAL__DATABASE__HOST`). A `.env` file is read
//! first when present. The resulting [`AppConfig`] is immutable and handed to
//! each component at construction.

use crate::geoserver::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub geoserver: GeoServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env file is the normal case outside development.
        let _ = dotenvy::dotenv();

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::with_name("geoportal").required(false))
            .add_source(config::Environment::with_prefix("GEOPORTAL").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Connection parameters of the PostGIS database.
///
/// The same parameters are registered in the map server data store, unless
/// `GeoServerConfig::datastore_db_host` overrides the host the map server
/// should use to reach the database.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub dbname: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "default_db_password")]
    pub password: String,
    #[serde(default = "default_db_schema")]
    pub schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            dbname: default_db_name(),
            user: default_db_user(),
            password: default_db_password(),
            schema: default_db_schema(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            statement_timeout_secs: default_statement_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// Map server (GeoServer) REST settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeoServerConfig {
    /// Base URL including the context path, e.g. `http://localhost:8080/geoserver`.
    #[serde(default = "default_geoserver_url")]
    pub url: String,
    #[serde(default = "default_geoserver_user")]
    pub user: String,
    #[serde(default = "default_geoserver_password")]
    pub password: String,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_datastore")]
    pub datastore: String,
    /// Database host as seen from the map server, when it differs from ours.
    #[serde(default)]
    pub datastore_db_host: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for GeoServerConfig {
    fn default() -> Self {
        Self {
            url: default_geoserver_url(),
            user: default_geoserver_user(),
            password: default_geoserver_password(),
            workspace: default_workspace(),
            datastore: default_datastore(),
            datastore_db_host: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl GeoServerConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Upload handling limits and scratch space.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Parent directory for per-request working directories.
    /// Defaults to the system temporary directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    /// Cap on the total uncompressed size of an archive's entries.
    #[serde(default = "default_max_extracted_mb")]
    pub max_extracted_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            max_upload_mb: default_max_upload_mb(),
            max_extracted_mb: default_max_extracted_mb(),
        }
    }
}

impl UploadConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn max_extracted_bytes(&self) -> u64 {
        self.max_extracted_mb * 1024 * 1024
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "geoportal".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_password() -> String {
    "postgres".to_string()
}

fn default_db_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

fn default_statement_timeout_secs() -> u64 {
    120
}

fn default_geoserver_url() -> String {
    "http://localhost:8080/geoserver".to_string()
}

fn default_geoserver_user() -> String {
    "admin".to_string()
}

fn default_geoserver_password() -> String {
    "geoserver".to_string()
}

fn default_workspace() -> String {
    "geoportal".to_string()
}

fn default_datastore() -> String {
    "postgis_store".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_upload_mb() -> usize {
    200
}

fn default_max_extracted_mb() -> u64 {
    2048
}
