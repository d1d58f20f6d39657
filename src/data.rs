use crate::config::RegionsConfig;
use crate::regions::RegionSet;
use crate::types::Region;
use anyhow::{anyhow, bail, Context, Result};
use geo::MultiPolygon;
use geojson::GeoJson;
use reqwest::Client;
use shapefile::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Loads the province dataset once and hands out the same copy for the rest
/// of the process. A failed load leaves the cell empty.
pub struct RegionCache {
    config: RegionsConfig,
    client: Client,
    cell: OnceCell<Arc<RegionSet>>,
}

impl RegionCache {
    pub fn new(config: RegionsConfig, client: Client) -> Self {
        Self {
            config,
            client,
            cell: OnceCell::new(),
        }
    }

    pub async fn get_or_load(&self) -> Result<Arc<RegionSet>> {
        self.cell
            .get_or_try_init(|| async {
                load_regions(&self.client, &self.config).await.map(Arc::new)
            })
            .await
            .cloned()
    }
}

pub async fn load_regions(client: &Client, config: &RegionsConfig) -> Result<RegionSet> {
    info!("Loading regions from {}", config.source);

    let regions = if is_remote(&config.source) {
        let bytes = fetch_bytes(client, &config.source).await?;
        parse_geojson(&bytes, &config.name_property)?
    } else {
        let path = PathBuf::from(&config.source);
        let name_property = config.name_property.clone();
        tokio::task::spawn_blocking(move || load_local(&path, &name_property))
            .await
            .context("Region loader task failed")??
    };

    info!("Loaded {} regions", regions.len());
    RegionSet::new(regions)
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;
    let status = resp.status();
    if !status.is_success() {
        bail!("HTTP {} fetching {}", status, url);
    }
    let bytes = resp.bytes().await.with_context(|| format!("Failed to read body of {}", url))?;
    Ok(bytes.to_vec())
}

fn load_local(path: &Path, name_property: &str) -> Result<Vec<Region>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Region file has no extension: {:?}", path))?;

    match extension.as_str() {
        "shp" => load_shapefile(path, name_property),
        "json" | "geojson" => {
            let file = File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
            parse_geojson_reader(BufReader::new(file), name_property)
        }
        _ => Err(anyhow!("Unsupported geometry format: {}", extension)),
    }
}

pub fn parse_geojson(data: &[u8], name_property: &str) -> Result<Vec<Region>> {
    parse_geojson_reader(data, name_property)
}

fn parse_geojson_reader<R: std::io::Read>(reader: R, name_property: &str) -> Result<Vec<Region>> {
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();

    for feature in collection.features {
        let name = match feature.properties.as_ref().and_then(|props| props.get(name_property)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue,
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of {}: {:?}", name, e))?;
                match geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        regions.push(Region { name, geometry });
    }

    Ok(regions)
}

fn load_shapefile(path: &Path, name_property: &str) -> Result<Vec<Region>> {
    let mut reader = Reader::from_path(path).with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut regions = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name = match record.get(name_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(shapefile::dbase::FieldValue::Character(None)) => continue,
            Some(_) => bail!("Shapefile name field '{}' must be a string", name_property),
            None => bail!("Name field '{}' not found in Shapefile", name_property),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue,
        };

        regions.push(Region { name, geometry });
    }

    Ok(regions)
}
