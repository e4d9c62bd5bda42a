use crate::config::{DatabaseConfig, GeoServerConfig};
use crate::geoserver::retry::execute_with_retry_async;
use crate::geoserver::GeoServerError;
use crate::pipeline::dataset::LayerName;
use crate::store::SRID;
use log::debug;
use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

/// Status and body of a map server REST call that did not fail in transport.
#[derive(Debug)]
struct RestResponse {
    status: StatusCode,
    body: String,
}

impl RestResponse {
    fn into_error(self) -> GeoServerError {
        GeoServerError::Status {
            status: self.status,
            body: self.body,
        }
    }
}

/// Thin client over the GeoServer administrative REST API.
///
/// Every call has connect and request timeouts. Idempotent calls (GET,
/// DELETE) are retried on transport errors and 5xx responses; POSTs are only
/// retried when the connection could not be established, so a request the
/// server may have applied is never sent twice.
#[derive(Clone)]
pub struct GeoServerClient {
    http: reqwest::Client,
    config: Arc<GeoServerConfig>,
}

impl GeoServerClient {
    pub fn new(config: Arc<GeoServerConfig>) -> Result<Self, GeoServerError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeoServerConfig {
        &self.config
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/{}", self.config.base_url(), path)
    }

    fn datastore_path(&self) -> String {
        format!(
            "workspaces/{}/datastores/{}",
            self.config.workspace, self.config.datastore
        )
    }

    fn feature_type_path(&self, layer: &LayerName) -> String {
        format!("{}/featuretypes/{}", self.datastore_path(), layer)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse, GeoServerError> {
        let url = self.rest_url(path);
        let idempotent = method != Method::POST;

        let is_transient = |error: &GeoServerError| match error {
            GeoServerError::Transport(e) if idempotent => e.is_connect() || e.is_timeout(),
            GeoServerError::Transport(e) => e.is_connect(),
            GeoServerError::Status { status, .. } => idempotent && status.is_server_error(),
            GeoServerError::Decode(_) => false,
        };

        execute_with_retry_async(&self.config.retry, is_transient, |attempt| {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .basic_auth(&self.config.user, Some(&self.config.password))
                .header(header::ACCEPT, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }
            let method = method.clone();
            let url = url.clone();
            async move {
                debug!("{} {} (attempt {})", method, url, attempt + 1);
                let response = request.send().await?;
                let status = response.status();
                let body = response.text().await?;
                debug!("{} {} -> {}", method, url, status);
                if status.is_server_error() {
                    return Err(GeoServerError::Status { status, body });
                }
                Ok(RestResponse { status, body })
            }
        })
        .await
    }

    async fn exists(&self, path: &str) -> Result<bool, GeoServerError> {
        let response = self.send(Method::GET, path, None).await?;
        match response.status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(response.into_error()),
        }
    }

    async fn create(&self, path: &str, payload: &Value) -> Result<(), GeoServerError> {
        let response = self.send(Method::POST, path, Some(payload)).await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(response.into_error())
        }
    }

    /// DELETE that tolerates a missing resource. `false` when there was
    /// nothing to remove.
    async fn remove(&self, path: &str) -> Result<bool, GeoServerError> {
        let response = self.send(Method::DELETE, path, None).await?;
        match response.status {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(response.into_error()),
        }
    }

    pub async fn datastore_exists(&self) -> Result<bool, GeoServerError> {
        self.exists(&self.datastore_path()).await
    }

    /// Registers the PostGIS data store the published layers read from.
    pub async fn create_datastore(&self, database: &DatabaseConfig) -> Result<(), GeoServerError> {
        let host = self
            .config
            .datastore_db_host
            .as_deref()
            .unwrap_or(&database.host);
        let entries = [
            ("host", host.to_string()),
            ("port", database.port.to_string()),
            ("database", database.dbname.clone()),
            ("schema", database.schema.clone()),
            ("user", database.user.clone()),
            ("passwd", database.password.clone()),
            ("dbtype", "postgis".to_string()),
            ("Expose primary keys", "true".to_string()),
        ];
        let payload = json!({
            "dataStore": {
                "name": self.config.datastore,
                "enabled": true,
                "connectionParameters": {
                    "entry": entries
                        .iter()
                        .map(|(key, value)| json!({"@key": key, "$": value}))
                        .collect::<Vec<_>>()
                }
            }
        });
        let path = format!("workspaces/{}/datastores", self.config.workspace);
        self.create(&path, &payload).await
    }

    pub async fn feature_type_exists(&self, layer: &LayerName) -> Result<bool, GeoServerError> {
        self.exists(&self.feature_type_path(layer)).await
    }

    /// Publishes the table `layer` as a feature type (and its default layer).
    pub async fn create_feature_type(&self, layer: &LayerName) -> Result<(), GeoServerError> {
        let payload = json!({
            "featureType": {
                "name": layer.as_str(),
                "nativeName": layer.as_str(),
                "title": layer.title(),
                "srs": format!("EPSG:{SRID}"),
                "projectionPolicy": "FORCE_DECLARED",
                "enabled": true
            }
        });
        let path = format!("{}/featuretypes", self.datastore_path());
        self.create(&path, &payload).await
    }

    pub async fn delete_layer(&self, layer: &LayerName) -> Result<bool, GeoServerError> {
        self.remove(&format!("layers/{}:{}", self.config.workspace, layer))
            .await
    }

    pub async fn delete_feature_type(&self, layer: &LayerName) -> Result<bool, GeoServerError> {
        self.remove(&self.feature_type_path(layer)).await
    }

    /// Names of the layers published in the workspace.
    pub async fn list_layers(&self) -> Result<Vec<String>, GeoServerError> {
        let path = format!("workspaces/{}/layers.json", self.config.workspace);
        let response = self.send(Method::GET, &path, None).await?;
        if !response.status.is_success() {
            return Err(response.into_error());
        }
        parse_layer_names(&response.body, &self.config.workspace)
    }
}

/// GeoServer answers `{"layers": ""}` for an empty workspace and
/// `{"layers": {"layer": [{"name": ..}, ..]}}` otherwise.
fn parse_layer_names(body: &str, workspace: &str) -> Result<Vec<String>, GeoServerError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| GeoServerError::Decode(e.to_string()))?;
    let prefix = format!("{workspace}:");
    let mut names: Vec<String> = value
        .get("layers")
        .and_then(|layers| layers.get("layer"))
        .and_then(Value::as_array)
        .map(|layers| {
            layers
                .iter()
                .filter_map(|layer| layer.get("name").and_then(Value::as_str))
                .map(|name| name.strip_prefix(&prefix).unwrap_or(name).to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    Ok(names)
}
