//! HTTP control surface over the reconciliation engine.
//!
//! All responses are JSON. Routes:
//! - `GET    /health`
//! - `GET    /clusters`                  list clusters
//! - `POST   /clusters`                  create (`{"name", "description"?, "active"?}`)
//! - `GET    /clusters/{name}`           cluster with its devices
//! - `DELETE /clusters/{name}`           tear down its devices, then drop all records
//! - `POST   /clusters/{name}/activate`
//! - `POST   /clusters/{name}/deactivate`
//! - `POST   /clusters/{name}/devices`   add a device (`{"name"}`)
//! - `GET    /devices`                   list all device records
//! - `GET    /devices/{container}`
//! - `DELETE /devices/{container}`       drop the record (the next sync removes the container)
//! - `GET    /preview[?cluster=name]`
//! - `POST   /sync[?cluster=name]`
//! - `POST   /purge`
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

use netbed_core::Reconciler;
use netbed_model::Config;
use netbed_runtime::ContainerRuntime;
use netbed_store::{ClusterStore, DeviceStore, StoreError, StoreLayout};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::debug;

/// An HTTP-level failure: status code plus a message for the error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    fn new(status: u16, message: &str) -> Self {
        Self {
            status,
            message: message.to_owned(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::ClusterNotFound(_) | StoreError::DeviceNotFound(_) => 404,
            StoreError::ClusterExists(_) | StoreError::DeviceExists { .. } => 409,
            StoreError::Model(_) => 400,
            _ => 500,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<netbed_core::CoreError> for ApiError {
    fn from(e: netbed_core::CoreError) -> Self {
        match e {
            netbed_core::CoreError::Store(inner) => inner.into(),
            other => Self {
                status: 500,
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateClusterBody {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct AddDeviceBody {
    name: String,
}

/// The API state: one reconciliation engine over one store and runtime.
pub struct Api {
    engine: Reconciler,
    prefix: String,
}

impl Api {
    pub fn new(layout: StoreLayout, runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        Self {
            prefix: config.runtime.name_prefix.clone(),
            engine: Reconciler::new(layout, runtime, config),
        }
    }

    fn clusters(&self) -> ClusterStore {
        ClusterStore::new(self.engine.layout().clone())
    }

    fn devices(&self) -> DeviceStore {
        DeviceStore::new(self.engine.layout().clone())
    }

    fn list_clusters(&self) -> Result<Value, ApiError> {
        to_json(&self.clusters().list()?)
    }

    fn create_cluster(&self, body: &CreateClusterBody) -> Result<Value, ApiError> {
        let cluster = self
            .clusters()
            .create(&body.name, &body.description, body.active)?;
        to_json(&cluster)
    }

    fn get_cluster(&self, name: &str) -> Result<Value, ApiError> {
        let cluster = self.clusters().get(name)?;
        let devices = self.devices().list_cluster(name)?;
        Ok(json!({
            "cluster": serde_json::to_value(&cluster).map_err(internal)?,
            "devices": serde_json::to_value(&devices).map_err(internal)?,
        }))
    }

    /// Deactivate, sync the cluster down, then drop every record.
    ///
    /// The teardown sync runs before records are removed so the devices are
    /// destroyed through their records rather than as orphans.
    fn delete_cluster(&self, name: &str) -> Result<Value, ApiError> {
        let clusters = self.clusters();
        clusters.get(name)?;
        clusters.set_active(name, false)?;

        let result = self.engine.sync(Some(name))?;
        if !result.errors.is_empty() {
            return Err(ApiError::new(
                500,
                &format!("cluster teardown incomplete: {}", result.errors.join("; ")),
            ));
        }

        let removed = self.devices().delete_cluster_devices(name)?;
        clusters.delete(name)?;
        Ok(json!({
            "deleted": name,
            "destroyed": result.destroyed,
            "records_removed": removed,
        }))
    }

    fn set_cluster_active(&self, name: &str, active: bool) -> Result<Value, ApiError> {
        self.clusters().set_active(name, active)?;
        to_json(&self.clusters().get(name)?)
    }

    fn add_device(&self, cluster: &str, body: &AddDeviceBody) -> Result<Value, ApiError> {
        self.clusters().get(cluster)?;
        let device = self.devices().create(&self.prefix, cluster, &body.name)?;
        to_json(&device)
    }

    fn list_devices(&self) -> Result<Value, ApiError> {
        to_json(&self.devices().list()?)
    }

    fn get_device(&self, container: &str) -> Result<Value, ApiError> {
        to_json(&self.devices().get(container)?)
    }

    fn delete_device(&self, container: &str) -> Result<Value, ApiError> {
        self.devices().get(container)?;
        self.devices().delete(container)?;
        Ok(json!({ "deleted": container }))
    }

    fn preview(&self, cluster: Option<&str>) -> Result<Value, ApiError> {
        to_json(&self.engine.preview(cluster)?)
    }

    fn sync(&self, cluster: Option<&str>) -> Result<Value, ApiError> {
        to_json(&self.engine.sync(cluster)?)
    }

    fn purge(&self) -> Result<Value, ApiError> {
        let (purged, errors) = self.engine.purge_managed()?;
        Ok(json!({ "purged": purged, "errors": errors }))
    }
}

fn internal(e: serde_json::Error) -> ApiError {
    ApiError::new(500, &format!("serialization failed: {e}"))
}

fn to_json(value: &impl serde::Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(internal)
}

/// Split a request URL into its path and raw query string.
pub fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

/// Look up one key in a raw query string.
pub fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key && !v.is_empty()).then_some(v)
    })
}

fn read_json_body<T: serde::de::DeserializeOwned>(
    req: &mut tiny_http::Request,
) -> Result<T, ApiError> {
    let mut body = Vec::new();
    req.as_reader()
        .read_to_end(&mut body)
        .map_err(|e| ApiError::new(500, &format!("read error: {e}")))?;
    serde_json::from_slice(&body).map_err(|e| ApiError::new(400, &format!("invalid body: {e}")))
}

fn route(
    api: &Api,
    method: &Method,
    path: &str,
    query: Option<&str>,
    req: &mut tiny_http::Request,
) -> Result<Value, ApiError> {
    let cluster = query_param(query, "cluster");

    match (method, path) {
        (Method::Get, "/health") => return Ok(json!({ "status": "ok" })),
        (Method::Get, "/clusters") => return api.list_clusters(),
        (Method::Post, "/clusters") => return api.create_cluster(&read_json_body(req)?),
        (Method::Get, "/devices") => return api.list_devices(),
        (Method::Get, "/preview") => return api.preview(cluster),
        (Method::Post, "/sync") => return api.sync(cluster),
        (Method::Post, "/purge") => return api.purge(),
        (_, "/health" | "/clusters" | "/devices" | "/preview" | "/sync" | "/purge") => {
            return Err(ApiError::new(405, "method not allowed"));
        }
        _ => {}
    }

    if let Some(rest) = path.strip_prefix("/clusters/") {
        return match rest.split_once('/') {
            None if !rest.is_empty() => match method {
                Method::Get => api.get_cluster(rest),
                Method::Delete => api.delete_cluster(rest),
                _ => Err(ApiError::new(405, "method not allowed")),
            },
            Some((name, sub)) => match (method, sub) {
                (Method::Post, "activate") => api.set_cluster_active(name, true),
                (Method::Post, "deactivate") => api.set_cluster_active(name, false),
                (Method::Post, "devices") => api.add_device(name, &read_json_body(req)?),
                (_, "activate" | "deactivate" | "devices") => {
                    Err(ApiError::new(405, "method not allowed"))
                }
                _ => Err(ApiError::new(404, "not found")),
            },
            None => Err(ApiError::new(404, "not found")),
        };
    }

    if let Some(rest) = path.strip_prefix("/devices/") {
        if rest.is_empty() || rest.contains('/') {
            return Err(ApiError::new(404, "not found"));
        }
        return match method {
            Method::Get => api.get_device(rest),
            Method::Delete => api.delete_device(rest),
            _ => Err(ApiError::new(405, "method not allowed")),
        };
    }

    Err(ApiError::new(404, "not found"))
}

fn respond_json(req: tiny_http::Request, status: u16, body: &Value) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_string(body.to_string())
            .with_header(header)
            .with_status_code(StatusCode(status)),
    );
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(api: &Api, mut req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let (path, query) = split_query(&url);
    match route(api, &method, path, query, &mut req) {
        Ok(value) => respond_json(req, 200, &value),
        Err(e) => {
            debug!("{method} {url}: {} {}", e.status, e.message);
            respond_json(req, e.status, &json!({ "error": e.message }));
        }
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(api: &Arc<Api>, addr: &str) {
    let server = Server::http(addr).expect("failed to bind HTTP server");
    for request in server.incoming_requests() {
        handle_request(api, request);
    }
}

/// A test helper that starts a netbed-server on a random port in a background
/// thread. Drop the `TestServer` to stop it.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    _server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server on `127.0.0.1:0` (random port) over the given API.
    pub fn start(api: Api) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&api, request);
            }
        });

        Self {
            url,
            port,
            _server: server,
            _handle: handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_query_separates_path() {
        assert_eq!(split_query("/sync"), ("/sync", None));
        assert_eq!(
            split_query("/sync?cluster=lab"),
            ("/sync", Some("cluster=lab"))
        );
    }

    #[test]
    fn query_param_finds_key() {
        assert_eq!(query_param(Some("cluster=lab"), "cluster"), Some("lab"));
        assert_eq!(
            query_param(Some("a=1&cluster=lab&b=2"), "cluster"),
            Some("lab")
        );
        assert_eq!(query_param(Some("cluster="), "cluster"), None);
        assert_eq!(query_param(Some("other=x"), "cluster"), None);
        assert_eq!(query_param(None, "cluster"), None);
    }

    #[test]
    fn store_errors_map_to_http_statuses() {
        let e: ApiError = StoreError::ClusterNotFound("lab".to_owned()).into();
        assert_eq!(e.status, 404);
        let e: ApiError = StoreError::ClusterExists("lab".to_owned()).into();
        assert_eq!(e.status, 409);
        let e: ApiError = StoreError::DeviceExists {
            cluster: "lab".to_owned(),
            device: "pc1".to_owned(),
        }
        .into();
        assert_eq!(e.status, 409);
    }
}
