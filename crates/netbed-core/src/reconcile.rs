//! Desired/actual reconciliation.
//!
//! The desired set is the container names of devices in active clusters (or
//! one named cluster); the actual set is the running containers carrying the
//! managed name prefix. The sync executes the diff: destroys first (known
//! devices through the topology driver, orphans directly), then creates,
//! then a keep phase that backfills records for containers that were already
//! in place.

use crate::concurrency::SyncLock;
use crate::discovery::{discover_interface, DiscoveryPolicy};
use crate::lifecycle::validate_transition;
use crate::topology::TopologyDriver;
use crate::CoreError;
use netbed_model::{ifb_for_interface, ClusterName, Config, Device, DeviceStatus};
use netbed_runtime::{ContainerRuntime, RuntimeError};
use netbed_store::{ClusterStore, DeviceStore, StoreLayout};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Read-only diff of desired against actual container names, sorted.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SyncPreview {
    pub to_create: Vec<String>,
    pub to_destroy: Vec<String>,
    pub to_keep: Vec<String>,
}

impl SyncPreview {
    pub fn total_changes(&self) -> usize {
        self.to_create.len() + self.to_destroy.len()
    }
}

/// Outcome of one sync, per container name.
#[derive(Debug, Default, Serialize)]
pub struct SyncResult {
    pub created: Vec<String>,
    pub destroyed: Vec<String>,
    pub kept: Vec<String>,
    pub updated: Vec<String>,
    pub errors: Vec<String>,
}

impl SyncResult {
    pub fn total_operations(&self) -> usize {
        self.created.len() + self.destroyed.len()
    }
}

/// The reconciliation engine: preview and execute syncs, purge managed
/// containers, all over one store layout and one runtime handle.
pub struct Reconciler {
    layout: StoreLayout,
    runtime: Arc<dyn ContainerRuntime>,
    router: String,
    image: String,
    prefix: String,
    workers: usize,
    policy: DiscoveryPolicy,
}

impl Reconciler {
    pub fn new(layout: StoreLayout, runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        Self {
            layout,
            runtime,
            router: config.runtime.router_container.clone(),
            image: config.runtime.client_image.clone(),
            prefix: config.runtime.name_prefix.clone(),
            workers: config.sync.workers.max(1),
            policy: DiscoveryPolicy {
                attempts: config.sync.discovery_attempts,
                delay: Duration::from_millis(config.sync.discovery_delay_ms),
            },
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn driver(&self) -> TopologyDriver<'_> {
        TopologyDriver::new(self.runtime.as_ref(), &self.router, &self.image, self.policy)
    }

    /// Devices in the target scope: one cluster, or all active clusters.
    /// An inactive named cluster has an empty desired set, so a scoped sync
    /// after deactivation tears its containers down.
    fn desired_devices(&self, cluster: Option<&str>) -> Result<Vec<Device>, CoreError> {
        let clusters = ClusterStore::new(self.layout.clone());
        let devices = DeviceStore::new(self.layout.clone());
        match cluster {
            Some(name) => {
                if !clusters.get(name)?.active {
                    return Ok(Vec::new());
                }
                Ok(devices.list_cluster(name)?)
            }
            None => {
                let active: Vec<ClusterName> = clusters
                    .list_active()?
                    .into_iter()
                    .map(|c| c.name)
                    .collect();
                Ok(devices.list_in_clusters(&active)?)
            }
        }
    }

    /// Running managed containers in the target scope. A named cluster scopes
    /// the listing to its own container prefix so syncing one cluster never
    /// touches another cluster's containers.
    fn actual_names(&self, cluster: Option<&str>) -> Result<BTreeSet<String>, CoreError> {
        let scope = match cluster {
            Some(name) => format!("{}{}_", self.prefix, name),
            None => self.prefix.clone(),
        };
        Ok(self
            .runtime
            .list_containers(&scope)?
            .into_iter()
            .filter(|c| c.running)
            .map(|c| c.name)
            .collect())
    }

    pub fn preview(&self, cluster: Option<&str>) -> Result<SyncPreview, CoreError> {
        let desired: BTreeSet<String> = self
            .desired_devices(cluster)?
            .into_iter()
            .map(|d| d.container_name.into_inner())
            .collect();
        let actual = self.actual_names(cluster)?;

        Ok(SyncPreview {
            to_create: desired.difference(&actual).cloned().collect(),
            to_destroy: actual.difference(&desired).cloned().collect(),
            to_keep: desired.intersection(&actual).cloned().collect(),
        })
    }

    /// Execute the diff. Holds the sync lock for the whole invocation.
    pub fn sync(&self, cluster: Option<&str>) -> Result<SyncResult, CoreError> {
        let _lock = SyncLock::acquire(&self.layout.sync_lock_file())?;

        let desired: BTreeMap<String, Device> = self
            .desired_devices(cluster)?
            .into_iter()
            .map(|d| (d.container_name.to_string(), d))
            .collect();
        let desired_names: BTreeSet<String> = desired.keys().cloned().collect();
        let actual = self.actual_names(cluster)?;

        let to_create: Vec<&String> = desired_names.difference(&actual).collect();
        let to_destroy: Vec<&String> = actual.difference(&desired_names).collect();
        let to_keep: Vec<&String> = desired_names.intersection(&actual).collect();

        tracing::info!(
            creates = to_create.len(),
            destroys = to_destroy.len(),
            keeps = to_keep.len(),
            "sync plan"
        );

        let mut result = SyncResult::default();
        self.destroy_phase(&to_destroy, &mut result);
        self.create_phase(&to_create, &desired, &mut result);
        self.keep_phase(&to_keep, &desired, &mut result);

        tracing::info!(
            created = result.created.len(),
            destroyed = result.destroyed.len(),
            kept = result.kept.len(),
            updated = result.updated.len(),
            errors = result.errors.len(),
            "sync complete"
        );
        Ok(result)
    }

    /// Stop and remove every managed container, records or not.
    pub fn purge_managed(&self) -> Result<(usize, Vec<String>), CoreError> {
        let containers = self.runtime.list_containers(&self.prefix)?;
        let mut purged = 0;
        let mut errors = Vec::new();
        for container in containers {
            match self.remove_container_direct(&container.name) {
                Ok(()) => purged += 1,
                Err(e) => errors.push(format!("{}: {e}", container.name)),
            }
        }
        Ok((purged, errors))
    }

    fn destroy_phase(&self, to_destroy: &[&String], result: &mut SyncResult) {
        if to_destroy.is_empty() {
            return;
        }
        let store = DeviceStore::new(self.layout.clone());
        let mut known = Vec::new();
        let mut orphans = Vec::new();
        for name in to_destroy {
            match store.get(name) {
                Ok(device) => known.push(device),
                Err(_) => {
                    tracing::warn!("{name} has no device record (orphaned)");
                    orphans.push((*name).clone());
                }
            }
        }

        for (name, outcome) in self.run_pool(known, |store, device| self.destroy_one(store, device))
        {
            match outcome {
                Ok(()) => result.destroyed.push(name),
                Err(msg) => result.errors.push(format!("Destroy {name}: {msg}")),
            }
        }

        for name in orphans {
            match self.remove_container_direct(&name) {
                Ok(()) => result.destroyed.push(name),
                Err(e) => result.errors.push(format!("Orphaned {name}: {e}")),
            }
        }
    }

    fn create_phase(
        &self,
        to_create: &[&String],
        desired: &BTreeMap<String, Device>,
        result: &mut SyncResult,
    ) {
        if to_create.is_empty() {
            return;
        }
        let devices: Vec<Device> = to_create
            .iter()
            .filter_map(|name| desired.get(*name).cloned())
            .collect();

        for (name, outcome) in self.run_pool(devices, |store, device| self.create_one(store, device))
        {
            match outcome {
                Ok(()) => result.created.push(name),
                Err(msg) => result.errors.push(format!("Create {name}: {msg}")),
            }
        }
    }

    fn keep_phase(
        &self,
        to_keep: &[&String],
        desired: &BTreeMap<String, Device>,
        result: &mut SyncResult,
    ) {
        let store = DeviceStore::new(self.layout.clone());
        for name in to_keep {
            let Some(device) = desired.get(*name) else {
                continue;
            };

            if !device.has_interface() {
                match discover_interface(
                    self.runtime.as_ref(),
                    &self.router,
                    &device.router_address,
                    self.policy,
                ) {
                    Ok(interface) => match ifb_for_interface(&interface) {
                        Some(ifb) => match store.mark_running(name, &interface, &ifb) {
                            Ok(_) => result.updated.push((*name).clone()),
                            Err(e) => result.errors.push(format!("Keep {name}: {e}")),
                        },
                        None => result.errors.push(format!(
                            "Keep {name}: cannot derive redirect device from '{interface}'"
                        )),
                    },
                    Err(e) => {
                        // leave the record as it was; the next sync retries
                        tracing::warn!("backfill discovery for {name} failed: {e}");
                    }
                }
            } else if device.status != DeviceStatus::Running {
                if let (Some(interface), Some(ifb)) = (&device.interface, &device.ifb_device) {
                    match store.mark_running(name, interface, ifb) {
                        Ok(_) => result.updated.push((*name).clone()),
                        Err(e) => result.errors.push(format!("Keep {name}: {e}")),
                    }
                }
            }

            result.kept.push((*name).clone());
        }
    }

    /// Run `op` over the devices on a bounded pool. Each worker takes its
    /// own store handle; outcomes come back only through the channel.
    fn run_pool<F>(&self, devices: Vec<Device>, op: F) -> Vec<(String, Result<(), String>)>
    where
        F: Fn(&DeviceStore, &Device) -> Result<(), String> + Sync,
    {
        let queue = Mutex::new(VecDeque::from(devices));
        let (tx, rx) = mpsc::channel();
        let workers = self.workers;
        let op = &op;
        let queue = &queue;

        std::thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let layout = self.layout.clone();
                s.spawn(move || {
                    let store = DeviceStore::new(layout);
                    loop {
                        let next = queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pop_front();
                        let Some(device) = next else { break };
                        let name = device.container_name.to_string();
                        let outcome = op(&store, &device);
                        if tx.send((name, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);
        });

        rx.into_iter().collect()
    }

    fn create_one(&self, store: &DeviceStore, device: &Device) -> Result<(), String> {
        let name = device.container_name.as_str();

        // A record stuck mid-flight (crash) or claiming to run while its
        // container does not is reset to error before the retry path.
        if validate_transition(device.status, DeviceStatus::Starting).is_err() {
            store
                .mark_error(name, "record out of sync with runtime")
                .map_err(|e| e.to_string())?;
        }
        store.mark_starting(name).map_err(|e| e.to_string())?;

        match self.driver().create(device) {
            Ok((interface, ifb)) => {
                store
                    .mark_running(name, &interface, &ifb)
                    .map_err(|e| e.to_string())?;
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                if let Err(mark_err) = store.mark_error(name, &msg) {
                    tracing::error!("failed to record error for {name}: {mark_err}");
                }
                Err(msg)
            }
        }
    }

    fn destroy_one(&self, store: &DeviceStore, device: &Device) -> Result<(), String> {
        let name = device.container_name.as_str();

        if validate_transition(device.status, DeviceStatus::Stopping).is_err() {
            store
                .mark_error(name, "record out of sync with runtime")
                .map_err(|e| e.to_string())?;
        }
        store.mark_stopping(name).map_err(|e| e.to_string())?;

        match self.driver().destroy(device) {
            Ok(()) => {
                store.mark_stopped(name).map_err(|e| e.to_string())?;
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                if let Err(mark_err) = store.mark_error(name, &msg) {
                    tracing::error!("failed to record error for {name}: {mark_err}");
                }
                Err(msg)
            }
        }
    }

    /// Stop and remove a container without touching any record.
    fn remove_container_direct(&self, name: &str) -> Result<(), CoreError> {
        match self.runtime.stop_container(name) {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        match self.runtime.remove_container(name) {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
