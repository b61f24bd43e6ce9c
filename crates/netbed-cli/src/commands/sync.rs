use super::{json_pretty, App, EXIT_FAILURE, EXIT_SUCCESS};

pub fn run(app: &App, cluster: Option<&str>, json: bool) -> Result<u8, String> {
    let result = app.engine.sync(cluster).map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&result)?);
    } else {
        for name in &result.created {
            println!("created   {name}");
        }
        for name in &result.destroyed {
            println!("destroyed {name}");
        }
        for name in &result.updated {
            println!("updated   {name}");
        }
        for error in &result.errors {
            eprintln!("error: {error}");
        }
        println!(
            "sync complete: {} created, {} destroyed, {} kept, {} updated, {} errors",
            result.created.len(),
            result.destroyed.len(),
            result.kept.len(),
            result.updated.len(),
            result.errors.len()
        );
    }

    if result.errors.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}
