//! Shared fixtures for unit tests.

use crate::config::InputConfig;
use crate::data::{parse_geojson, parse_metrics};
use crate::matching::join;
use crate::types::Dataset;

pub const GEOJSON: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"name": "Geneve"},
         "geometry": {"type": "Polygon", "coordinates": [[[6.0,46.1],[6.3,46.1],[6.3,46.3],[6.0,46.3],[6.0,46.1]]]}},
        {"type": "Feature", "properties": {"name": "Zurich"},
         "geometry": {"type": "Polygon", "coordinates": [[[8.4,47.2],[8.9,47.2],[8.9,47.6],[8.4,47.6],[8.4,47.2]]]}},
        {"type": "Feature", "properties": {"name": "Bern"},
         "geometry": {"type": "MultiPolygon", "coordinates": [[[[7.0,46.5],[7.8,46.5],[7.8,47.1],[7.0,47.1],[7.0,46.5]]]]}},
        {"type": "Feature", "properties": {"name": "Lake"},
         "geometry": {"type": "Point", "coordinates": [6.5, 46.4]}},
        {"type": "Feature", "properties": {},
         "geometry": {"type": "Polygon", "coordinates": [[[1.0,1.0],[2.0,1.0],[2.0,2.0],[1.0,1.0]]]}}
    ]
}"#;

pub const CSV: &str = "Canton,2021_Market_Milk_Tons,2022_Market_Milk_Tons,2023_Market_Milk_Tons\n\
Genève ,100,150,50\n\
Zürich,3000,3100,2900\n\
Bern,1000,n/a,900\n\
Atlantis,1,,3\n";

/// Records in order: Geneve (0), Zurich (1), Bern with a NaN cell (2), unmatched Atlantis (3).
pub fn fixture_dataset() -> Dataset {
    let input = InputConfig::default();
    let regions = parse_geojson(GEOJSON.as_bytes(), &input.name_property).unwrap();
    let rows = parse_metrics(CSV.as_bytes(), &input).unwrap();
    let records = join(&regions, rows);
    Dataset {
        regions,
        records,
        periods: input.periods.iter().map(|p| p.label.clone()).collect(),
    }
}
