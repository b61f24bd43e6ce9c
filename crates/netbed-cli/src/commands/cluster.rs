use super::{json_pretty, App, EXIT_SUCCESS};

pub fn create(
    app: &App,
    name: &str,
    description: &str,
    active: bool,
    json: bool,
) -> Result<u8, String> {
    let cluster = app
        .clusters()
        .create(name, description, active)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&cluster)?);
    } else {
        let state = if cluster.active { "active" } else { "inactive" };
        println!("created cluster '{name}' ({state})");
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(app: &App, json: bool) -> Result<u8, String> {
    let clusters = app.clusters().list().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&clusters)?);
    } else if clusters.is_empty() {
        println!("no clusters defined");
    } else {
        let devices = app.devices();
        println!("{:<20} {:<10} {:<8} DESCRIPTION", "NAME", "ACTIVE", "DEVICES");
        for cluster in &clusters {
            let count = devices
                .list_cluster(&cluster.name)
                .map_or(0, |d| d.len());
            println!(
                "{:<20} {:<10} {:<8} {}",
                cluster.name.as_str(),
                cluster.active,
                count,
                cluster.description
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn show(app: &App, name: &str, json: bool) -> Result<u8, String> {
    let cluster = app.clusters().get(name).map_err(|e| e.to_string())?;
    let devices = app.devices().list_cluster(name).map_err(|e| e.to_string())?;
    if json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({ "cluster": cluster, "devices": devices }))?
        );
    } else {
        let state = if cluster.active { "active" } else { "inactive" };
        println!("cluster '{name}' ({state}): {}", cluster.description);
        for device in &devices {
            println!(
                "  {:<24} {:<18} {:<10} {}",
                device.container_name.as_str(),
                device.subnet,
                device.status,
                device.error_message.as_deref().unwrap_or("")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn set_active(app: &App, name: &str, active: bool, json: bool) -> Result<u8, String> {
    let clusters = app.clusters();
    clusters.set_active(name, active).map_err(|e| e.to_string())?;
    if json {
        println!(
            "{}",
            json_pretty(&clusters.get(name).map_err(|e| e.to_string())?)?
        );
    } else {
        let verb = if active { "activated" } else { "deactivated" };
        println!("{verb} cluster '{name}'");
    }
    Ok(EXIT_SUCCESS)
}

/// Deactivate the cluster, sync its devices down, then drop every record.
pub fn delete(app: &App, name: &str, json: bool) -> Result<u8, String> {
    let clusters = app.clusters();
    clusters.get(name).map_err(|e| e.to_string())?;
    clusters.set_active(name, false).map_err(|e| e.to_string())?;

    let result = app.engine.sync(Some(name)).map_err(|e| e.to_string())?;
    if !result.errors.is_empty() {
        return Err(format!(
            "cluster teardown incomplete: {}",
            result.errors.join("; ")
        ));
    }

    let removed = app
        .devices()
        .delete_cluster_devices(name)
        .map_err(|e| e.to_string())?;
    clusters.delete(name).map_err(|e| e.to_string())?;

    if json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({
                "deleted": name,
                "destroyed": result.destroyed,
                "records_removed": removed,
            }))?
        );
    } else {
        println!(
            "deleted cluster '{name}' ({} containers destroyed, {} records removed)",
            result.destroyed.len(),
            removed.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
