use crate::cli::{InputArgs, OutputFormat};
use crate::error::CliResult;
use crate::input::{load_store, LoadedLayer};
use crate::output::{print_json, table};
use serde_json::json;

pub fn run(input: &InputArgs) -> CliResult<()> {
    let (_store, loaded) = load_store(&input.layers)?;

    match input.format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = loaded.iter().map(to_json).collect();
            print_json(&rows)
        }
        OutputFormat::Table => {
            if loaded.is_empty() {
                println!("No layers found.");
                return Ok(());
            }
            let mut t = table(["Id", "Title", "Kind", "Features", "Skipped", "Color", "Source"]);
            for layer in &loaded {
                t.add_row(vec![
                    layer.info.id.0.to_string(),
                    layer.info.title.to_string(),
                    layer.info.kind.to_string(),
                    layer.info.feature_count.to_string(),
                    layer.stats.records_skipped.to_string(),
                    format!("{:?}", layer.info.color).to_lowercase(),
                    layer.source.display().to_string(),
                ]);
            }
            println!("{t}");
            Ok(())
        }
    }
}

fn to_json(layer: &LoadedLayer) -> serde_json::Value {
    json!({
        "id": layer.info.id,
        "title": &*layer.info.title,
        "kind": layer.info.kind,
        "feature_count": layer.info.feature_count,
        "color": layer.info.color,
        "skipped": layer.stats.records_skipped,
        "source": layer.source.display().to_string(),
    })
}
