use super::{json_pretty, App, EXIT_SUCCESS};

pub fn run(app: &App, cluster: Option<&str>, json: bool) -> Result<u8, String> {
    let preview = app.engine.preview(cluster).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&preview)?);
    } else if preview.total_changes() == 0 {
        println!("in sync: nothing to create or destroy ({} kept)", preview.to_keep.len());
    } else {
        for name in &preview.to_create {
            println!("+ {name}");
        }
        for name in &preview.to_destroy {
            println!("- {name}");
        }
        for name in &preview.to_keep {
            println!("= {name}");
        }
        println!(
            "{} to create, {} to destroy, {} kept",
            preview.to_create.len(),
            preview.to_destroy.len(),
            preview.to_keep.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
