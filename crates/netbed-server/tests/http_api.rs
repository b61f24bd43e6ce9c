//! HTTP API integration tests.
//!
//! These start a real `netbed-server` in-process on a random port and drive
//! it with raw HTTP requests against a mock container runtime.

use netbed_model::Config;
use netbed_runtime::MockRuntime;
use netbed_server::{Api, TestServer};
use netbed_store::StoreLayout;
use serde_json::{json, Value};
use std::io::Read;
use std::sync::Arc;

struct Fixture {
    server: TestServer,
    mock: Arc<MockRuntime>,
    _dir: tempfile::TempDir,
}

fn start() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(dir.path());
    layout.initialize().unwrap();

    let mut config = Config::default();
    config.sync.discovery_delay_ms = 0;

    let mock = Arc::new(MockRuntime::new());
    let api = Api::new(layout, mock.clone(), &config);
    Fixture {
        server: TestServer::start(api),
        mock,
        _dir: dir,
    }
}

fn read_body(resp: ureq::http::Response<ureq::Body>) -> Value {
    let mut text = String::new();
    resp.into_body()
        .into_reader()
        .read_to_string(&mut text)
        .unwrap();
    serde_json::from_str(&text).unwrap()
}

fn get(url: &str) -> Value {
    read_body(ureq::get(url).call().unwrap())
}

fn post(url: &str, body: &Value) -> Value {
    let payload = body.to_string();
    read_body(
        ureq::post(url)
            .header("Content-Type", "application/json")
            .send(payload.as_bytes() as &[u8])
            .unwrap(),
    )
}

fn post_empty(url: &str) -> Value {
    read_body(ureq::post(url).send(&[] as &[u8]).unwrap())
}

fn delete(url: &str) -> Value {
    read_body(ureq::delete(url).call().unwrap())
}

fn status_of(result: Result<ureq::http::Response<ureq::Body>, ureq::Error>) -> u16 {
    match result {
        Ok(resp) => resp.status().as_u16(),
        Err(ureq::Error::StatusCode(code)) => code,
        Err(e) => panic!("transport error: {e}"),
    }
}

#[test]
fn health_reports_ok() {
    let f = start();
    let body = get(&format!("{}/health", f.server.url));
    assert_eq!(body["status"], "ok");
}

#[test]
fn cluster_crud_over_http() {
    let f = start();
    let base = &f.server.url;

    let created = post(
        &format!("{base}/clusters"),
        &json!({"name": "lab", "description": "test bench"}),
    );
    assert_eq!(created["name"], "lab");
    assert_eq!(created["active"], true);

    let listed = get(&format!("{base}/clusters"));
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let detail = get(&format!("{base}/clusters/lab"));
    assert_eq!(detail["cluster"]["description"], "test bench");
    assert_eq!(detail["devices"].as_array().unwrap().len(), 0);

    // duplicate name conflicts
    let dup = ureq::post(&format!("{base}/clusters"))
        .header("Content-Type", "application/json")
        .send(json!({"name": "lab"}).to_string().as_bytes() as &[u8]);
    assert_eq!(status_of(dup), 409);

    // unknown cluster is a 404
    assert_eq!(status_of(ureq::get(&format!("{base}/clusters/ghost")).call()), 404);
}

#[test]
fn invalid_cluster_name_is_rejected() {
    let f = start();
    let bad = ureq::post(&format!("{}/clusters", f.server.url))
        .header("Content-Type", "application/json")
        .send(json!({"name": "no spaces allowed"}).to_string().as_bytes() as &[u8]);
    assert_eq!(status_of(bad), 400);
}

#[test]
fn device_add_allocates_identity() {
    let f = start();
    let base = &f.server.url;
    post(&format!("{base}/clusters"), &json!({"name": "lab"}));

    let device = post(&format!("{base}/clusters/lab/devices"), &json!({"name": "pc1"}));
    assert_eq!(device["container_name"], "nb_lab_pc1");
    assert_eq!(device["subnet"], "10.1.0.0/24");
    assert_eq!(device["address"], "10.1.0.10");
    assert_eq!(device["router_address"], "10.1.0.254");
    assert_eq!(device["status"], "stopped");

    let fetched = get(&format!("{base}/devices/nb_lab_pc1"));
    assert_eq!(fetched["cluster"], "lab");

    // adding to an unknown cluster fails before any record is written
    let missing = ureq::post(&format!("{base}/clusters/ghost/devices"))
        .header("Content-Type", "application/json")
        .send(json!({"name": "pc1"}).to_string().as_bytes() as &[u8]);
    assert_eq!(status_of(missing), 404);
}

#[test]
fn sync_brings_devices_up() {
    let f = start();
    let base = &f.server.url;
    post(&format!("{base}/clusters"), &json!({"name": "lab"}));
    post(&format!("{base}/clusters/lab/devices"), &json!({"name": "pc1"}));

    let preview = get(&format!("{base}/preview"));
    assert_eq!(preview["to_create"][0], "nb_lab_pc1");

    let result = post_empty(&format!("{base}/sync"));
    assert_eq!(result["created"][0], "nb_lab_pc1");
    assert_eq!(result["errors"].as_array().unwrap().len(), 0);
    assert!(f.mock.container_running("nb_lab_pc1"));

    let device = get(&format!("{base}/devices/nb_lab_pc1"));
    assert_eq!(device["status"], "running");
    assert_eq!(device["interface"], "eth1");
    assert_eq!(device["ifb_device"], "ifb1");
}

#[test]
fn deactivate_then_sync_tears_down() {
    let f = start();
    let base = &f.server.url;
    post(&format!("{base}/clusters"), &json!({"name": "lab"}));
    post(&format!("{base}/clusters/lab/devices"), &json!({"name": "pc1"}));
    post_empty(&format!("{base}/sync"));
    assert!(f.mock.container_running("nb_lab_pc1"));

    let cluster = post_empty(&format!("{base}/clusters/lab/deactivate"));
    assert_eq!(cluster["active"], false);

    let result = post_empty(&format!("{base}/sync"));
    assert_eq!(result["destroyed"][0], "nb_lab_pc1");
    assert!(!f.mock.container_exists("nb_lab_pc1"));

    let device = get(&format!("{base}/devices/nb_lab_pc1"));
    assert_eq!(device["status"], "stopped");
}

#[test]
fn scoped_sync_via_query_parameter() {
    let f = start();
    let base = &f.server.url;
    post(&format!("{base}/clusters"), &json!({"name": "red"}));
    post(&format!("{base}/clusters"), &json!({"name": "blue"}));
    post(&format!("{base}/clusters/red/devices"), &json!({"name": "pc1"}));
    post(&format!("{base}/clusters/blue/devices"), &json!({"name": "pc1"}));

    let result = post_empty(&format!("{base}/sync?cluster=red"));
    assert_eq!(result["created"][0], "nb_red_pc1");
    assert!(f.mock.container_running("nb_red_pc1"));
    assert!(!f.mock.container_exists("nb_blue_pc1"));

    // unknown scope is a 404, not an empty sync
    assert_eq!(status_of(ureq::post(&format!("{base}/sync?cluster=ghost")).send(&[] as &[u8])), 404);
}

#[test]
fn delete_cluster_destroys_and_forgets() {
    let f = start();
    let base = &f.server.url;
    post(&format!("{base}/clusters"), &json!({"name": "lab"}));
    post(&format!("{base}/clusters/lab/devices"), &json!({"name": "pc1"}));
    post_empty(&format!("{base}/sync"));
    assert!(f.mock.container_running("nb_lab_pc1"));

    let outcome = delete(&format!("{base}/clusters/lab"));
    assert_eq!(outcome["deleted"], "lab");
    assert_eq!(outcome["destroyed"][0], "nb_lab_pc1");

    assert!(!f.mock.container_exists("nb_lab_pc1"));
    assert_eq!(status_of(ureq::get(&format!("{base}/clusters/lab")).call()), 404);
    assert_eq!(get(&format!("{base}/devices")).as_array().unwrap().len(), 0);
}

#[test]
fn delete_device_record_leaves_teardown_to_sync() {
    let f = start();
    let base = &f.server.url;
    post(&format!("{base}/clusters"), &json!({"name": "lab"}));
    post(&format!("{base}/clusters/lab/devices"), &json!({"name": "pc1"}));
    post_empty(&format!("{base}/sync"));

    delete(&format!("{base}/devices/nb_lab_pc1"));
    assert!(f.mock.container_running("nb_lab_pc1"));

    let result = post_empty(&format!("{base}/sync"));
    assert_eq!(result["destroyed"][0], "nb_lab_pc1");
    assert!(!f.mock.container_exists("nb_lab_pc1"));
}

#[test]
fn purge_removes_all_managed_containers() {
    let f = start();
    let base = &f.server.url;
    post(&format!("{base}/clusters"), &json!({"name": "lab"}));
    post(&format!("{base}/clusters/lab/devices"), &json!({"name": "pc1"}));
    post(&format!("{base}/clusters/lab/devices"), &json!({"name": "pc2"}));
    post_empty(&format!("{base}/sync"));

    let outcome = post_empty(&format!("{base}/purge"));
    assert_eq!(outcome["purged"], 2);
    assert!(!f.mock.container_exists("nb_lab_pc1"));
    assert!(!f.mock.container_exists("nb_lab_pc2"));
}

#[test]
fn unknown_routes_and_methods() {
    let f = start();
    let base = &f.server.url;

    assert_eq!(status_of(ureq::get(&format!("{base}/nonsense")).call()), 404);
    assert_eq!(status_of(ureq::delete(&format!("{base}/clusters")).call()), 405);
    assert_eq!(status_of(ureq::get(&format!("{base}/purge")).call()), 405);

    // malformed body
    let bad = ureq::post(&format!("{base}/clusters"))
        .header("Content-Type", "application/json")
        .send("not json".as_bytes() as &[u8]);
    assert_eq!(status_of(bad), 400);
}
