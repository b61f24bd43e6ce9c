use super::{colorize_status, json_pretty, App, EXIT_SUCCESS};

pub fn add(app: &App, cluster: &str, name: &str, json: bool) -> Result<u8, String> {
    app.clusters().get(cluster).map_err(|e| e.to_string())?;
    let device = app
        .devices()
        .create(&app.prefix, cluster, name)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&device)?);
    } else {
        println!(
            "added device '{}' to cluster '{cluster}' ({}, container {})",
            name,
            device.subnet,
            device.container_name.as_str()
        );
        println!("run 'netbed sync' to create its infrastructure");
    }
    Ok(EXIT_SUCCESS)
}

/// Drop the device record. The container itself is removed as an orphan by
/// the next global sync.
pub fn remove(app: &App, container: &str, json: bool) -> Result<u8, String> {
    let devices = app.devices();
    devices.get(container).map_err(|e| e.to_string())?;
    devices.delete(container).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&serde_json::json!({ "deleted": container }))?);
    } else {
        println!("removed device record '{container}'");
        println!("run 'netbed sync' to remove its container");
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(app: &App, cluster: Option<&str>, json: bool) -> Result<u8, String> {
    let devices = match cluster {
        Some(name) => {
            app.clusters().get(name).map_err(|e| e.to_string())?;
            app.devices().list_cluster(name).map_err(|e| e.to_string())?
        }
        None => app.devices().list().map_err(|e| e.to_string())?,
    };

    if json {
        println!("{}", json_pretty(&devices)?);
    } else if devices.is_empty() {
        println!("no devices defined");
    } else {
        println!(
            "{:<24} {:<14} {:<18} {:<10} INTERFACE",
            "CONTAINER", "CLUSTER", "SUBNET", "STATUS"
        );
        for device in &devices {
            println!(
                "{:<24} {:<14} {:<18} {:<10} {}",
                device.container_name.as_str(),
                device.cluster.as_str(),
                device.subnet,
                colorize_status(&device.status.to_string()),
                device.interface.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
