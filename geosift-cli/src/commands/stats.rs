//! `areas`, `roads` and `buildings`: regional statistics reports.

use crate::cli::{InputArgs, OutputFormat};
use crate::error::CliResult;
use crate::input::load_store;
use crate::output::{number, optional, print_json, table};
use geosift_spatial::{
    run_statistics, AggregationKind, AggregationResult, AnalysisConfig, CancelFlag, Category,
    RegionMeasures,
};
use serde_json::{json, Map, Value};

pub async fn run(
    input: &InputArgs,
    config: &AnalysisConfig,
    kind: AggregationKind,
) -> CliResult<()> {
    let (store, _) = load_store(&input.layers)?;
    let results = run_statistics(store, config, kind, CancelFlag::new()).await?;

    let degraded = results
        .iter()
        .filter(|r| r.degraded || r.degraded_units > 0)
        .count();
    if degraded > 0 {
        tracing::warn!(regions = degraded, "some regions are incomplete");
    }

    match input.format {
        OutputFormat::Json => {
            let rows: Vec<Value> = results.iter().map(to_json).collect();
            print_json(&rows)
        }
        OutputFormat::Table => {
            if results.is_empty() {
                println!("No regions found.");
                return Ok(());
            }
            let t = match kind {
                AggregationKind::LandCover | AggregationKind::Buildings => {
                    category_table(&results, kind)
                }
                AggregationKind::Roads => road_table(&results),
            };
            println!("{t}");
            Ok(())
        }
    }
}

fn status(result: &AggregationResult) -> String {
    if result.degraded {
        "failed".to_string()
    } else if result.degraded_units > 0 {
        format!("{} cells failed", result.degraded_units)
    } else {
        String::new()
    }
}

fn category_table(results: &[AggregationResult], kind: AggregationKind) -> comfy_table::Table {
    let base = match kind {
        AggregationKind::Buildings => "Footprint",
        _ => "Area",
    };
    let mut header = vec!["Region".to_string(), base.to_string()];
    header.extend(Category::REPORTED.iter().map(|c| format!("{c} %")));
    header.push("Status".to_string());

    let mut t = table(header);
    for r in results {
        let mut row = vec![r.region_name.clone(), number(r.percentage_base())];
        row.extend(Category::REPORTED.iter().map(|c| optional(r.percentage(*c))));
        row.push(status(r));
        t.add_row(row);
    }
    t
}

fn road_table(results: &[AggregationResult]) -> comfy_table::Table {
    let mut t = table(["Region", "Area", "Length", "Density (m/km²)", "Status"]);
    for r in results {
        let length = match r.measures {
            RegionMeasures::Roads { length } => Some(length),
            _ => None,
        };
        t.add_row(vec![
            r.region_name.clone(),
            number(r.region_area),
            optional(length),
            optional(r.density_per_km2()),
            status(r),
        ]);
    }
    t
}

fn percentages(result: &AggregationResult) -> Value {
    let map: Map<String, Value> = Category::REPORTED
        .iter()
        .filter_map(|c| result.percentage(*c).map(|p| (c.as_str().to_string(), json!(p))))
        .collect();
    Value::Object(map)
}

fn to_json(result: &AggregationResult) -> Value {
    let mut obj = Map::new();
    obj.insert("region".into(), json!(result.region_name));
    obj.insert("region_area".into(), json!(result.region_area));
    obj.insert("kind".into(), json!(result.kind().as_str()));
    obj.insert("degraded".into(), json!(result.degraded));
    obj.insert("degraded_units".into(), json!(result.degraded_units));
    match &result.measures {
        RegionMeasures::LandCover { areas } => {
            obj.insert("areas".into(), json!(areas));
            obj.insert("percentages".into(), percentages(result));
        }
        RegionMeasures::Roads { length } => {
            obj.insert("length".into(), json!(length));
            obj.insert("density".into(), json!(result.density()));
            obj.insert("density_per_km2".into(), json!(result.density_per_km2()));
        }
        RegionMeasures::Buildings {
            footprint_area,
            areas,
        } => {
            obj.insert("footprint_area".into(), json!(footprint_area));
            obj.insert("areas".into(), json!(areas));
            obj.insert("percentages".into(), percentages(result));
        }
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosift_spatial::CategoryTotals;

    #[test]
    fn test_zero_footprint_percentages_are_null() {
        let result = AggregationResult {
            region_name: "Empty".into(),
            region_area: 100.0,
            measures: RegionMeasures::Buildings {
                footprint_area: 0.0,
                areas: CategoryTotals::default(),
            },
            degraded_units: 0,
            degraded: false,
        };
        let value = to_json(&result);
        assert_eq!(value["kind"], "buildings");
        assert!(value["percentages"]["forest"].is_null());
        assert_eq!(value["footprint_area"], 0.0);
    }

    #[test]
    fn test_road_row_carries_density() {
        let result = AggregationResult {
            region_name: "R".into(),
            region_area: 2_000_000.0,
            measures: RegionMeasures::Roads { length: 1000.0 },
            degraded_units: 1,
            degraded: false,
        };
        let value = to_json(&result);
        let density = value["density_per_km2"].as_f64().unwrap();
        assert!((density - 500.0).abs() < 1e-9);
        assert_eq!(status(&result), "1 cells failed");
    }
}
