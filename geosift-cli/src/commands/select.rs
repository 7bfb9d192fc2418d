//! `select`: replay pointer gestures against one layer's selection.

use crate::cli::{InputArgs, OutputFormat};
use crate::error::{CliError, CliResult};
use crate::input::load_store;
use crate::output::{print_json, table};
use geosift_spatial::{AnalysisConfig, FeatureStore, PointerGesture, SelectionRegistry};
use serde_json::json;

pub async fn run(
    input: &InputArgs,
    config: &AnalysisConfig,
    pattern: &str,
    gestures: &[PointerGesture],
) -> CliResult<()> {
    let (store, _) = load_store(&input.layers)?;
    let layer = store
        .find_layer_by_name(pattern)
        .ok_or_else(|| CliError::NotFound(format!("no layer title contains '{pattern}'")))?;

    let registry = SelectionRegistry::new(config.selection.click_tolerance);
    for gesture in gestures {
        registry
            .apply_gesture(store.as_ref(), layer.id, gesture)
            .await?;
    }

    let selection = registry.for_layer(layer.id);
    let selected = selection.selected_features(store.as_ref()).await?;
    let extent = registry.zoom_extent(store.as_ref(), &[layer.id]).await?;

    match input.format {
        OutputFormat::Json => {
            let ids: Vec<&str> = selected.iter().map(|f| f.id.as_str()).collect();
            print_json(&json!({
                "layer": &*layer.title,
                "selected": ids,
                "extent": extent,
            }))
        }
        OutputFormat::Table => {
            if selected.is_empty() {
                println!("Nothing selected in {}.", layer.title);
                return Ok(());
            }
            let mut t = table(["Id", "Attributes"]);
            for feature in selected.iter() {
                let attrs = feature
                    .attributes
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                t.add_row(vec![feature.id.to_string(), attrs]);
            }
            println!("{t}");
            if let Some(e) = extent {
                println!(
                    "Extent: {:.2},{:.2} .. {:.2},{:.2}",
                    e.min_x, e.min_y, e.max_x, e.max_y
                );
            }
            Ok(())
        }
    }
}
