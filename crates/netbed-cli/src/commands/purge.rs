use super::{json_pretty, App, EXIT_FAILURE, EXIT_SUCCESS};

/// Stop and remove every managed container, records or not.
pub fn run(app: &App, yes: bool, json: bool) -> Result<u8, String> {
    if !yes {
        return Err("purge removes every managed container; re-run with --yes".to_owned());
    }

    let (purged, errors) = app.engine.purge_managed().map_err(|e| e.to_string())?;
    if json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({ "purged": purged, "errors": errors }))?
        );
    } else {
        println!("purged {purged} containers");
        for error in &errors {
            eprintln!("error: {error}");
        }
    }

    if errors.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}
