use crate::config::AppConfig;
use crate::types::{Dataset, Region};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::{Feature, GeoJson};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{info, warn};

const NAME_KEY: &str = "NAME_1";
const ALT_NAME_KEY: &str = "VARNAME_1";

pub fn load_dataset(config: &AppConfig) -> Result<Dataset> {
    info!("Loading GeoJSON from {:?}...", config.input.geojson);
    let file = File::open(&config.input.geojson)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", config.input.geojson))?;
    let dataset = read_dataset(BufReader::new(file), &config.input.year)?;
    info!("Loaded {} regions", dataset.len());
    Ok(dataset)
}

/// Parse a FeatureCollection of regions, requiring a population entry for
/// `year` on every feature that has polygon geometry.
pub fn read_dataset<R: Read>(reader: R, year: &str) -> Result<Dataset> {
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();

    for (index, feature) in collection.features.into_iter().enumerate() {
        if let Some(region) = region_from_feature(feature, index)? {
            if region.population_in(year).is_none() {
                return Err(anyhow!(
                    "Region '{}' has no population entry for year {}",
                    region.name,
                    year
                ));
            }
            regions.push(region);
        }
    }

    let dataset = Dataset::new(regions);
    if dataset.is_empty() {
        return Err(anyhow!("GeoJSON contains no polygon features"));
    }

    Ok(dataset)
}

fn region_from_feature(feature: Feature, index: usize) -> Result<Option<Region>> {
    let props = feature.properties.as_ref();

    let name = match props.and_then(|p| p.get(NAME_KEY)) {
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => return Err(anyhow!("Feature {} has no string property '{}'", index, NAME_KEY)),
    };

    let alt_name = match props.and_then(|p| p.get(ALT_NAME_KEY)) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };

    let geometry = match feature.geometry {
        Some(geo) => {
            let valid_geo: geo::Geometry<f64> = geo.value.try_into()
                .map_err(|e| anyhow!("Failed to convert geometry of '{}': {:?}", name, e))?;

            match valid_geo {
                geo::Geometry::MultiPolygon(mp) => mp,
                geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                _ => {
                    warn!("Skipping '{}': geometry is not a polygon", name);
                    return Ok(None);
                }
            }
        }
        None => {
            warn!("Skipping '{}': feature has no geometry", name);
            return Ok(None);
        }
    };

    // Population sits in a `data` member next to `properties`.
    let population_value = feature
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("data"))
        .and_then(|d| d.get("population"))
        .ok_or_else(|| anyhow!("Region '{}' has no data.population", name))?;

    let population: BTreeMap<String, u64> = serde_json::from_value(population_value.clone())
        .with_context(|| format!("Region '{}' has malformed data.population", name))?;

    Ok(Some(Region { name, alt_name, geometry, population }))
}
