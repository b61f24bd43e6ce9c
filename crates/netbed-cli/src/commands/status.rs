use super::{colorize_status, json_pretty, App, EXIT_SUCCESS};

pub fn run(app: &App, json: bool) -> Result<u8, String> {
    let clusters = app.clusters().list().map_err(|e| e.to_string())?;
    let devices = app.devices();

    if json {
        let mut entries = Vec::new();
        for cluster in &clusters {
            let devs = devices
                .list_cluster(&cluster.name)
                .map_err(|e| e.to_string())?;
            entries.push(serde_json::json!({ "cluster": cluster, "devices": devs }));
        }
        println!("{}", json_pretty(&entries)?);
        return Ok(EXIT_SUCCESS);
    }

    if clusters.is_empty() {
        println!("no clusters defined");
        return Ok(EXIT_SUCCESS);
    }

    for cluster in &clusters {
        let state = if cluster.active { "active" } else { "inactive" };
        println!("{} ({state})", cluster.name.as_str());
        let devs = devices
            .list_cluster(&cluster.name)
            .map_err(|e| e.to_string())?;
        if devs.is_empty() {
            println!("  (no devices)");
            continue;
        }
        for device in &devs {
            let note = device
                .error_message
                .as_deref()
                .map_or_else(String::new, |m| format!("  {m}"));
            println!(
                "  {:<24} {:<10} {}{note}",
                device.name.as_str(),
                colorize_status(&device.status.to_string()),
                device.interface.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
