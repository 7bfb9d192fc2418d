//! `search`: the site-suitability pipeline.

use crate::cli::{InputArgs, OutputFormat};
use crate::error::CliResult;
use crate::input::load_store;
use crate::output::{number, print_json, table};
use geosift_spatial::geometry::area_of;
use geosift_spatial::{
    AnalysisConfig, Envelope, RankedSite, SearchOutcome, SearchParams, SearchPipeline,
};
use serde_json::{json, Value};

/// The four user-entered values, unparsed.
pub struct RawParams<'a> {
    pub min_area: &'a str,
    pub max_road_distance: &'a str,
    pub min_river_width: &'a str,
    pub min_height_diff: &'a str,
}

pub async fn run(
    input: &InputArgs,
    config: &AnalysisConfig,
    raw: RawParams<'_>,
    area: Option<Envelope>,
) -> CliResult<()> {
    // Bad numbers are reported before any input is read.
    let params = SearchParams::parse(
        raw.min_area,
        raw.max_road_distance,
        raw.min_river_width,
        raw.min_height_diff,
    )?;
    let (store, _) = load_store(&input.layers)?;
    let outcome = SearchPipeline::new(store, config).run(&params, area).await?;

    match input.format {
        OutputFormat::Json => print_json(&to_json(&params, area, &outcome)),
        OutputFormat::Table => {
            let c = &outcome.counts;
            let mut stages = table(["Stage", "Candidates"]);
            stages.add_row(vec!["clearings".to_string(), c.clearings.to_string()]);
            stages.add_row(vec!["with river".to_string(), c.with_river.to_string()]);
            stages.add_row(vec![
                "with height difference".to_string(),
                c.with_height_diff.to_string(),
            ]);
            stages.add_row(vec![
                "no height data".to_string(),
                c.no_height_data.to_string(),
            ]);
            stages.add_row(vec!["peaks".to_string(), c.peaks.to_string()]);
            stages.add_row(vec!["ranked".to_string(), c.ranked.to_string()]);
            println!("{stages}");

            if outcome.sites.is_empty() {
                println!("No suitable sites found.");
                return Ok(());
            }
            let mut sites = table(["Rank", "Site", "Area", "Height diff", "Peaks"]);
            for (i, site) in outcome.sites.iter().enumerate() {
                sites.add_row(vec![
                    (i + 1).to_string(),
                    site.id.to_string(),
                    number(area_of(&site.geometry)),
                    number(site.height_diff),
                    site.peaks_qty.to_string(),
                ]);
            }
            println!("{sites}");
            Ok(())
        }
    }
}

fn site_json(site: &RankedSite) -> Value {
    json!({
        "id": site.id,
        "area": area_of(&site.geometry),
        "bounds": Envelope::from_geometry(&site.geometry),
        "height_diff": site.height_diff,
        "peaks_qty": site.peaks_qty,
    })
}

fn to_json(params: &SearchParams, area: Option<Envelope>, outcome: &SearchOutcome) -> Value {
    let artifacts: Vec<Value> = outcome
        .artifacts
        .iter()
        .map(|a| {
            let ids: Vec<&str> = a.features.iter().map(|f| f.id.as_str()).collect();
            json!({ "name": a.name, "count": a.features.len(), "ids": ids })
        })
        .collect();
    json!({
        "params": params,
        "area": area,
        "counts": outcome.counts,
        "artifacts": artifacts,
        "sites": outcome.sites.iter().map(site_json).collect::<Vec<_>>(),
    })
}
