pub mod cluster;
pub mod device;
pub mod preview;
pub mod purge;
pub mod status;
pub mod sync;

use netbed_core::Reconciler;
use netbed_model::Config;
use netbed_runtime::ContainerRuntime;
use netbed_store::{ClusterStore, DeviceStore, StoreLayout};
use std::sync::Arc;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

/// Shared command state: the engine plus store handles over one layout.
pub struct App {
    pub engine: Reconciler,
    pub prefix: String,
}

impl App {
    pub fn new(layout: StoreLayout, runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        Self {
            prefix: config.runtime.name_prefix.clone(),
            engine: Reconciler::new(layout, runtime, config),
        }
    }

    pub fn clusters(&self) -> ClusterStore {
        ClusterStore::new(self.engine.layout().clone())
    }

    pub fn devices(&self) -> DeviceStore {
        DeviceStore::new(self.engine.layout().clone())
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "running" => Style::new().green().apply_to(status).to_string(),
        "starting" | "stopping" => Style::new().cyan().apply_to(status).to_string(),
        "stopped" => Style::new().dim().apply_to(status).to_string(),
        "error" => Style::new().red().bold().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbed_runtime::MockRuntime;

    fn test_app(dir: &std::path::Path) -> App {
        let layout = StoreLayout::new(dir);
        layout.initialize().unwrap();
        let mut config = Config::default();
        config.sync.discovery_delay_ms = 0;
        App::new(layout, Arc::new(MockRuntime::new()), &config)
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_CONFIG_ERROR);
        assert_ne!(EXIT_CONFIG_ERROR, EXIT_STORE_ERROR);
    }

    #[test]
    fn json_pretty_serializes() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
    }

    #[test]
    fn colorize_status_passes_text_through() {
        for status in ["running", "starting", "stopping", "stopped", "error"] {
            assert!(colorize_status(status).contains(status));
        }
        assert_eq!(colorize_status("odd"), "odd");
    }

    #[test]
    fn cluster_and_device_commands_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        assert_eq!(
            cluster::create(&app, "lab", "bench", true, false).unwrap(),
            EXIT_SUCCESS
        );
        assert_eq!(
            device::add(&app, "lab", "pc1", false).unwrap(),
            EXIT_SUCCESS
        );
        assert_eq!(cluster::list(&app, true).unwrap(), EXIT_SUCCESS);
        assert_eq!(cluster::show(&app, "lab", true).unwrap(), EXIT_SUCCESS);
        assert_eq!(status::run(&app, true).unwrap(), EXIT_SUCCESS);

        assert!(cluster::create(&app, "lab", "", true, false).is_err());
        assert!(device::add(&app, "ghost", "pc1", false).is_err());
    }

    #[test]
    fn sync_and_preview_commands_run() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        cluster::create(&app, "lab", "", true, false).unwrap();
        device::add(&app, "lab", "pc1", false).unwrap();

        assert_eq!(preview::run(&app, None, true).unwrap(), EXIT_SUCCESS);
        assert_eq!(sync::run(&app, None, true).unwrap(), EXIT_SUCCESS);
        assert_eq!(
            app.devices().get("nb_lab_pc1").unwrap().status.to_string(),
            "running"
        );
    }

    #[test]
    fn purge_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        assert!(purge::run(&app, false, false).is_err());
        assert_eq!(purge::run(&app, true, false).unwrap(), EXIT_SUCCESS);
    }

    #[test]
    fn cluster_delete_tears_down_devices() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        cluster::create(&app, "lab", "", true, false).unwrap();
        device::add(&app, "lab", "pc1", false).unwrap();
        sync::run(&app, None, true).unwrap();

        assert_eq!(cluster::delete(&app, "lab", true).unwrap(), EXIT_SUCCESS);
        assert!(!app.clusters().exists("lab"));
        assert!(app.devices().list().unwrap().is_empty());
    }
}
