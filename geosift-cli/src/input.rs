//! Layer bundle loading.
//!
//! A bundle is a JSON document listing layers with WKT geometries:
//!
//! ```json
//! { "layers": [
//!     { "title": "keliai#KEL_L", "kind": "line",
//!       "features": [ { "id": "k1", "wkt": "LINESTRING(0 0, 10 0)",
//!                       "attributes": { "PLOTIS": 4.5 } } ] } ] }
//! ```
//!
//! Unparsable geometries are skipped and counted; a duplicate feature id
//! within a layer fails the load.

use crate::error::{CliError, CliResult};
use geosift_spatial::{
    AttrValue, BuildStats, EmbeddedFeatureStore, FeatureId, LayerBuilder, LayerInfo, LayerKind,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Bundle {
    layers: Vec<LayerSpec>,
}

#[derive(Debug, Deserialize)]
struct LayerSpec {
    title: String,
    #[serde(default)]
    kind: Option<LayerKind>,
    #[serde(default)]
    features: Vec<FeatureSpec>,
}

#[derive(Debug, Deserialize)]
struct FeatureSpec {
    id: RawId,
    wkt: String,
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for FeatureId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => FeatureId::from(s),
            RawId::Number(n) => FeatureId::new(n.to_string()),
        }
    }
}

/// A registered layer with its build statistics and origin.
#[derive(Debug, Clone)]
pub struct LoadedLayer {
    pub info: LayerInfo,
    pub stats: BuildStats,
    pub source: PathBuf,
}

/// Load every bundle into one embedded store, layers in input order.
pub fn load_store(paths: &[PathBuf]) -> CliResult<(Arc<EmbeddedFeatureStore>, Vec<LoadedLayer>)> {
    let store = Arc::new(EmbeddedFeatureStore::new());
    let mut loaded = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::input_file(path, e))?;
        let bundle: Bundle =
            serde_json::from_str(&text).map_err(|e| CliError::input_file(path, e))?;
        for spec in bundle.layers {
            let (layer, stats) = build_layer(path, spec)?;
            let info = store.add_layer(layer);
            tracing::info!(
                layer = %info.title,
                kind = %info.kind,
                features = stats.features_added,
                skipped = stats.records_skipped,
                "loaded layer"
            );
            if stats.records_skipped > 0 {
                tracing::warn!(
                    layer = %info.title,
                    skipped = stats.records_skipped,
                    "records skipped while loading"
                );
            }
            loaded.push(LoadedLayer {
                info,
                stats,
                source: path.clone(),
            });
        }
    }
    Ok((store, loaded))
}

fn build_layer(path: &Path, spec: LayerSpec) -> CliResult<(geosift_spatial::Layer, BuildStats)> {
    let mut builder = LayerBuilder::new(spec.title);
    if let Some(kind) = spec.kind {
        builder = builder.with_kind(kind);
    }
    for feature in spec.features {
        builder
            .add_wkt(feature.id, &feature.wkt, feature.attributes)
            .map_err(|e| CliError::input_file(path, e))?;
    }
    let result = builder.build();
    Ok((result.layer, result.stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosift_spatial::FeatureStore;
    use std::io::Write;

    fn write_bundle(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_loads_layers_from_several_bundles() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = write_bundle(
            &dir,
            "a.json",
            r#"{"layers": [{"title": "keliai#KEL_L", "features": [
                {"id": "k1", "wkt": "LINESTRING(0 0, 10 0)"},
                {"id": 2, "wkt": "not wkt"}
            ]}]}"#,
        );
        let b = write_bundle(
            &dir,
            "b.json",
            r#"{"layers": [{"title": "plotai#PLO_P", "kind": "polygon", "features": [
                {"id": "p1", "wkt": "POLYGON((0 0, 1 0, 1 1, 0 0))",
                 "attributes": {"GKODAS": "ms0", "PLOTIS": 2.5, "n": 3, "x": null}}
            ]}]}"#,
        );

        let (store, loaded) = load_store(&[a, b]).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].info.kind, LayerKind::Line);
        assert_eq!(loaded[0].stats.features_added, 1);
        assert_eq!(loaded[0].stats.records_skipped, 1);
        assert_eq!(loaded[1].info.kind, LayerKind::Polygon);
        assert!(store.find_layer_by_name("plo_p").is_some());
    }

    #[test]
    fn test_duplicate_id_fails_with_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_bundle(
            &dir,
            "dup.json",
            r#"{"layers": [{"title": "L", "features": [
                {"id": "a", "wkt": "POINT(0 0)"},
                {"id": "a", "wkt": "POINT(1 1)"}
            ]}]}"#,
        );
        let Err(CliError::Input(msg)) = load_store(&[path]) else {
            panic!("expected input error");
        };
        assert!(msg.contains("dup.json"));
    }
}
