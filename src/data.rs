use crate::config::{AppConfig, InputConfig};
use crate::matching;
use crate::types::{Dataset, PeriodRecord, PeriodValue, Region};
use anyhow::{Context, Result, anyhow, bail};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Where an input comes from: fetched over HTTP(S) or read from disk.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Source::Remote(trimmed.to_string())
        } else {
            Source::Local(PathBuf::from(trimmed))
        }
    }

    fn is_shapefile(&self) -> bool {
        match self {
            Source::Local(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("shp"))
                .unwrap_or(false),
            Source::Remote(_) => false,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Remote(url) => write!(f, "{}", url),
            Source::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Failure of the initial load. Either input failing sinks the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("loading inputs timed out after {0:?}")]
    Timeout(Duration),
    #[error("geometry input {origin} failed: {cause:#}")]
    Geometry { origin: String, cause: anyhow::Error },
    #[error("metrics input {origin} failed: {cause:#}")]
    Metrics { origin: String, cause: anyhow::Error },
}

pub async fn load_dataset(config: &AppConfig) -> Result<Dataset, LoadError> {
    let (regions, rows) = load_inputs(&config.input).await?;
    info!("Loaded {} regions and {} metric rows", regions.len(), rows.len());

    let records = matching::join(&regions, rows);
    let unmatched: Vec<&str> = records
        .iter()
        .filter(|r| !r.is_positioned())
        .map(|r| r.name.as_str())
        .collect();
    if !unmatched.is_empty() {
        warn!("{} rows matched no region and are table-only: {:?}", unmatched.len(), unmatched);
    }

    Ok(Dataset { regions, records, periods: config.period_labels() })
}

/// Fetches both inputs concurrently under the configured timeout.
pub async fn load_inputs(config: &InputConfig) -> Result<(Vec<Region>, Vec<PeriodRecord>), LoadError> {
    let client = reqwest::Client::new();
    let geometry_source = Source::parse(&config.geometry);
    let metrics_source = Source::parse(&config.metrics);

    let geometry = async {
        load_regions(&client, &geometry_source, &config.name_property)
            .await
            .map_err(|cause| LoadError::Geometry { origin: geometry_source.to_string(), cause })
    };
    let metrics = async {
        let bytes = fetch_bytes(&client, &metrics_source)
            .await
            .map_err(|cause| LoadError::Metrics { origin: metrics_source.to_string(), cause })?;
        parse_metrics(&bytes, config)
            .map_err(|cause| LoadError::Metrics { origin: metrics_source.to_string(), cause })
    };

    let limit = Duration::from_secs(config.timeout_secs);
    tokio::time::timeout(limit, async { tokio::try_join!(geometry, metrics) })
        .await
        .map_err(|_| LoadError::Timeout(limit))?
}

async fn fetch_bytes(client: &reqwest::Client, source: &Source) -> Result<Vec<u8>> {
    match source {
        Source::Remote(url) => {
            let response = client
                .get(url)
                .send()
                .await
                .with_context(|| format!("Request to {} failed", url))?
                .error_for_status()
                .with_context(|| format!("{} answered with an error status", url))?;
            let body = response.bytes().await.context("Failed to read response body")?;
            Ok(body.to_vec())
        }
        Source::Local(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path)),
    }
}

async fn load_regions(client: &reqwest::Client, source: &Source, name_property: &str) -> Result<Vec<Region>> {
    if let (true, Source::Local(path)) = (source.is_shapefile(), source) {
        return read_shapefile(path, name_property);
    }
    let bytes = fetch_bytes(client, source).await?;
    parse_geojson(&bytes, name_property)
}

pub fn parse_geojson(bytes: &[u8], name_property: &str) -> Result<Vec<Region>> {
    let geojson = GeoJson::from_reader(bytes).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();

    for (i, feature) in collection.features.into_iter().enumerate() {
        let name_val = feature.properties.as_ref()
            .and_then(|props| props.get(name_property));

        let id = match name_val {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                warn!("Feature #{} has no '{}' property; skipping", i, name_property);
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of '{}': {:?}", id, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        warn!("Feature '{}' is not polygonal; skipping", id);
                        continue;
                    }
                }
            }
            None => {
                warn!("Feature '{}' has no geometry; skipping", id);
                continue;
            }
        };

        regions.push(Region { id, geometry });
    }

    Ok(regions)
}

/// Regions from a local shapefile, named by the `.dbf` text field `name_field`.
pub fn read_shapefile(path: &Path, name_field: &str) -> Result<Vec<Region>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile {:?}", path))?;

    let mut regions = Vec::new();
    for (i, entry) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = entry.with_context(|| format!("Unreadable shapefile record #{}", i))?;

        let id = match record.get(name_field) {
            Some(FieldValue::Character(Some(name))) if !name.trim().is_empty() => name.trim().to_string(),
            Some(FieldValue::Character(_)) | None => {
                warn!("Record #{} has no '{}' field; skipping", i, name_field);
                continue;
            }
            Some(other) => bail!("Field '{}' of record #{} is not text: {:?}", name_field, i, other),
        };

        match outline(shape) {
            Some(geometry) => regions.push(Region { id, geometry }),
            None => warn!("Shape '{}' is not polygonal; skipping", id),
        }
    }

    Ok(regions)
}

fn outline(shape: Shape) -> Option<MultiPolygon<f64>> {
    match shape {
        Shape::Polygon(p) => Some(p.into()),
        Shape::PolygonM(p) => Some(p.into()),
        Shape::PolygonZ(p) => Some(p.into()),
        _ => None,
    }
}

/// Parses the metric table. Every data row yields exactly one record.
pub fn parse_metrics(bytes: &[u8], config: &InputConfig) -> Result<Vec<PeriodRecord>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = rdr.headers().context("Failed to read CSV header")?.clone();

    let name_idx = headers.iter().position(|h| h.trim() == config.region_column)
        .ok_or_else(|| anyhow!("Region column '{}' not found in CSV", config.region_column))?;

    let period_idx: Vec<Option<usize>> = config.periods.iter()
        .map(|p| {
            let idx = headers.iter().position(|h| h.trim() == p.column);
            if idx.is_none() {
                warn!("Period column '{}' not found; its values will be NaN", p.column);
            }
            idx
        })
        .collect();

    let mut records = Vec::new();

    for result in rdr.records() {
        let record = result.context("Malformed CSV row")?;
        let raw_name = record.get(name_idx).unwrap_or("").trim().to_string();

        let values = config.periods.iter().zip(&period_idx)
            .map(|(period, idx)| PeriodValue {
                label: period.label.clone(),
                value: idx.and_then(|i| record.get(i)).map_or(f64::NAN, parse_cell),
            })
            .collect();

        records.push(PeriodRecord { raw_name, values });
    }

    Ok(records)
}

/// Numeric cell coercion: blank is zero, anything unparseable or non-finite is NaN.
pub fn parse_cell(cell: &str) -> f64 {
    let cell = cell.trim();
    if cell.is_empty() {
        return 0.0;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CSV, GEOJSON};
    use geo::{BoundingRect, LineString};
    use shapefile::dbase::{Record, TableWriterBuilder};
    use std::fs;
    use tempfile::TempDir;

    fn write_inputs(dir: &TempDir) -> AppConfig {
        let geometry = dir.path().join("regions.geojson");
        let metrics = dir.path().join("metrics.csv");
        fs::write(&geometry, GEOJSON).unwrap();
        fs::write(&metrics, CSV).unwrap();
        let mut config = AppConfig::default();
        config.input.geometry = geometry.display().to_string();
        config.input.metrics = metrics.display().to_string();
        config
    }

    #[test]
    fn source_detects_urls() {
        assert_eq!(Source::parse("https://x.test/a.csv"), Source::Remote("https://x.test/a.csv".into()));
        assert_eq!(Source::parse(" data/a.csv"), Source::Local(PathBuf::from("data/a.csv")));
        assert!(Source::parse("cantons.SHP").is_shapefile());
    }

    #[test]
    fn cells_coerce_like_numbers() {
        assert_eq!(parse_cell(" 12 "), 12.0);
        assert_eq!(parse_cell(""), 0.0);
        assert_eq!(parse_cell("1.5e3"), 1500.0);
        assert!(parse_cell("1,234").is_nan());
        assert!(parse_cell("n/a").is_nan());
    }

    #[test]
    fn infinity_and_nan_spellings_are_not_numbers() {
        for cell in ["inf", "-inf", "Infinity", "NaN", "nan", "1e400"] {
            assert!(parse_cell(cell).is_nan(), "{:?} should not parse", cell);
        }
    }

    #[test]
    fn geojson_keeps_named_polygons_only() {
        let regions = parse_geojson(GEOJSON.as_bytes(), "name").unwrap();
        let names: Vec<&str> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(names, vec!["Geneve", "Zurich", "Bern"]);
    }

    #[test]
    fn geojson_must_be_a_collection() {
        let err = parse_geojson(br#"{"type": "Point", "coordinates": [1.0, 2.0]}"#, "name").unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));
    }

    #[test]
    fn metrics_keep_every_row() {
        let records = parse_metrics(CSV.as_bytes(), &InputConfig::default()).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].raw_name, "Genève");
        assert_eq!(records[0].total(), 300.0);
        assert!(records[2].values[1].value.is_nan());
        assert!(records[2].total().is_nan());
        assert_eq!(records[3].values[1].value, 0.0);
    }

    #[test]
    fn missing_region_column_fails() {
        let err = parse_metrics(b"Name,2021\nBern,1\n", &InputConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Canton"));
    }

    #[test]
    fn missing_period_column_yields_nan() {
        let records = parse_metrics(
            b"Canton,2021_Market_Milk_Tons\nBern,5\n",
            &InputConfig::default(),
        )
        .unwrap();
        assert_eq!(records[0].values[0].value, 5.0);
        assert!(records[0].values[2].value.is_nan());
    }

    #[tokio::test]
    async fn local_inputs_join_into_dataset() {
        let dir = TempDir::new().unwrap();
        let config = write_inputs(&dir);
        let dataset = load_dataset(&config).await.unwrap();
        assert_eq!(dataset.regions.len(), 3);
        assert_eq!(dataset.records.len(), 4);
        assert_eq!(dataset.records[0].name, "Geneve");
        assert_eq!(dataset.records[0].region, Some(0));
        assert_eq!(dataset.records[1].name, "Zurich");
        assert_eq!(dataset.records[3].name, "Atlantis");
        assert_eq!(dataset.records[3].region, None);
        assert_eq!(dataset.periods, vec!["2021", "2022", "2023"]);
    }

    fn square(x: f64, y: f64) -> geo::Polygon<f64> {
        geo::Polygon::new(
            LineString::from(vec![(x, y), (x + 1.0, y), (x + 1.0, y + 1.0), (x, y + 1.0), (x, y)]),
            vec![],
        )
    }

    fn write_shapefile(path: &Path, rows: &[(Option<&str>, MultiPolygon<f64>)]) {
        let table = TableWriterBuilder::new().add_character_field("name".try_into().unwrap(), 40);
        let mut writer = shapefile::Writer::from_path(path, table).unwrap();
        for (name, geometry) in rows {
            let mut record = Record::default();
            record.insert("name".to_string(), FieldValue::Character(name.map(str::to_string)));
            let polygon = shapefile::Polygon::from(geometry.clone());
            writer.write_shape_and_record(&polygon, &record).unwrap();
        }
    }

    #[tokio::test]
    async fn shapefile_regions_load_by_name_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cantons.shp");
        write_shapefile(
            &path,
            &[
                (Some("Geneve"), MultiPolygon::new(vec![square(6.0, 46.0)])),
                (None, MultiPolygon::new(vec![square(7.0, 46.0)])),
                (Some("Zurich"), MultiPolygon::new(vec![square(8.0, 47.0), square(8.5, 47.5)])),
            ],
        );

        let source = Source::parse(&path.display().to_string());
        let regions = load_regions(&reqwest::Client::new(), &source, "name").await.unwrap();
        let names: Vec<_> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(names, vec!["Geneve", "Zurich"]);
        assert_eq!(regions[1].geometry.0.len(), 2);
        let bounds = regions[0].geometry.bounding_rect().unwrap();
        assert_eq!((bounds.min().x, bounds.min().y), (6.0, 46.0));
        assert_eq!((bounds.max().x, bounds.max().y), (7.0, 47.0));

        // No record carries the field, so nothing is named.
        assert!(read_shapefile(&path, "canton").unwrap().is_empty());
    }

    #[tokio::test]
    async fn either_input_failing_fails_the_load() {
        let dir = TempDir::new().unwrap();
        let mut config = write_inputs(&dir);
        config.input.metrics = dir.path().join("missing.csv").display().to_string();
        let err = load_dataset(&config).await.unwrap_err();
        assert!(matches!(err, LoadError::Metrics { .. }));

        let mut config = write_inputs(&dir);
        fs::write(dir.path().join("broken.geojson"), "{ not json").unwrap();
        config.input.geometry = dir.path().join("broken.geojson").display().to_string();
        let err = load_dataset(&config).await.unwrap_err();
        assert!(matches!(err, LoadError::Geometry { .. }));
    }
}
