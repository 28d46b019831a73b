use crate::config::ProjectionConfig;
use crate::types::Region;
use geo::{Centroid, Coord, LineString, MapCoords, MultiPolygon};
use std::f64::consts::FRAC_PI_4;
use std::fmt::Write;

/// Spherical Mercator scaled and translated onto the canvas, y pointing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mercator {
    scale: f64,
    translate: (f64, f64),
    center_raw: (f64, f64),
}

fn mercator_raw(lon: f64, lat: f64) -> (f64, f64) {
    let lambda = lon.to_radians();
    let phi = lat.to_radians();
    (lambda, (FRAC_PI_4 + phi / 2.0).tan().ln())
}

impl Mercator {
    pub fn new(center: [f64; 2], scale: f64, translate: (f64, f64)) -> Self {
        Self { scale, translate, center_raw: mercator_raw(center[0], center[1]) }
    }

    pub fn from_config(config: &ProjectionConfig) -> Self {
        Self::new(config.center, config.scale, (config.width / 2.0, config.height / 2.0))
    }

    pub fn project(&self, lon: f64, lat: f64) -> Coord<f64> {
        let (x, y) = mercator_raw(lon, lat);
        Coord {
            x: self.translate.0 + self.scale * (x - self.center_raw.0),
            y: self.translate.1 - self.scale * (y - self.center_raw.1),
        }
    }

    pub fn project_geometry(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| self.project(c.x, c.y))
    }

    /// Area-weighted centroid of the projected boundary. `None` for empty or
    /// degenerate geometry.
    pub fn centroid(&self, region: &Region) -> Option<Coord<f64>> {
        self.project_geometry(&region.geometry)
            .centroid()
            .map(|p| p.0)
            .filter(|c| c.x.is_finite() && c.y.is_finite())
    }
}

/// SVG path data for an already projected boundary, one closed subpath per ring.
pub fn path_data(projected: &MultiPolygon<f64>) -> String {
    let mut d = String::new();
    for polygon in projected {
        push_ring(&mut d, polygon.exterior());
        for hole in polygon.interiors() {
            push_ring(&mut d, hole);
        }
    }
    d
}

fn push_ring(d: &mut String, ring: &LineString<f64>) {
    // The closing coordinate repeats the first one; `Z` covers it.
    let coords = ring.0.as_slice();
    let open = match coords {
        [first, .., last] if first == last => &coords[..coords.len() - 1],
        _ => coords,
    };
    for (i, c) in open.iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(d, "{}{:.2},{:.2}", cmd, c.x, c.y);
    }
    if !open.is_empty() {
        d.push('Z');
    }
}
