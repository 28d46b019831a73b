use crate::config::AppConfig;
use crate::layout::area_radius;
use crate::projection::{path_data, Mercator};
use crate::types::Dataset;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{Coord, MultiPolygon, Point};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{info, warn};

// Wrapper for RTree indexing
struct ShapeIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for ShapeIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

#[derive(Debug, Clone)]
pub struct RegionShape {
    pub id: String,
    pub path: String,
    /// Boundary in canvas coordinates.
    pub outline: MultiPolygon<f64>,
    pub centroid: Option<Coord<f64>>,
}

/// Overview bubble for one positioned record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopBubble {
    /// Index into `Dataset::records`.
    pub record: usize,
    pub center: Coord<f64>,
    pub radius: f64,
}

/// Canvas-space geometry of the overview: region shapes and top-level bubbles.
pub struct Scene {
    pub width: f64,
    pub height: f64,
    pub regions: Vec<RegionShape>,
    pub bubbles: Vec<TopBubble>,
    region_tree: RTree<ShapeIndex>,
    bubble_tree: RTree<ShapeIndex>,
}

impl Scene {
    pub fn build(dataset: &Dataset, config: &AppConfig) -> Self {
        let projection = Mercator::from_config(&config.projection);

        let regions: Vec<RegionShape> = dataset.regions.par_iter().map(|region| {
            let outline = projection.project_geometry(&region.geometry);
            RegionShape {
                id: region.id.clone(),
                path: path_data(&outline),
                centroid: projection.centroid(region),
                outline,
            }
        }).collect();

        let max_total = dataset.max_total().unwrap_or(0.0);
        let mut bubbles = Vec::new();
        for (i, record) in dataset.records.iter().enumerate() {
            let Some(region_idx) = record.region else { continue };
            let Some(center) = regions[region_idx].centroid else {
                warn!("Region '{}' has no usable centroid; no bubble drawn", record.name);
                continue;
            };
            let radius = area_radius(record.total(), max_total, config.bubbles.max_radius);
            if !radius.is_finite() {
                warn!("Total for '{}' gives no finite radius; no bubble drawn", record.name);
                continue;
            }
            bubbles.push(TopBubble { record: i, center, radius });
        }
        info!("Scene has {} regions and {} bubbles", regions.len(), bubbles.len());

        let region_tree = RTree::bulk_load(regions.iter().enumerate().filter_map(|(i, shape)| {
            let rect = shape.outline.bounding_rect()?;
            Some(ShapeIndex {
                index: i,
                aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            })
        }).collect());

        let bubble_tree = RTree::bulk_load(bubbles.iter().enumerate().map(|(i, b)| ShapeIndex {
            index: i,
            aabb: AABB::from_corners(
                [b.center.x - b.radius, b.center.y - b.radius],
                [b.center.x + b.radius, b.center.y + b.radius],
            ),
        }).collect());

        Self {
            width: config.projection.width,
            height: config.projection.height,
            regions,
            bubbles,
            region_tree,
            bubble_tree,
        }
    }

    pub fn bubble_for_record(&self, record: usize) -> Option<&TopBubble> {
        self.bubbles.iter().find(|b| b.record == record)
    }

    /// Topmost bubble under a canvas point; later bubbles are drawn above earlier ones.
    pub fn bubble_at(&self, point: Coord<f64>) -> Option<&TopBubble> {
        let envelope = AABB::from_point([point.x, point.y]);
        self.bubble_tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|candidate| {
                let b = &self.bubbles[candidate.index];
                let (dx, dy) = (point.x - b.center.x, point.y - b.center.y);
                b.radius > 0.0 && dx * dx + dy * dy <= b.radius * b.radius
            })
            .map(|candidate| candidate.index)
            .max()
            .map(|i| &self.bubbles[i])
    }

    pub fn region_at(&self, point: Coord<f64>) -> Option<&RegionShape> {
        let envelope = AABB::from_point([point.x, point.y]);
        let target = Point::from(point);
        self.region_tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| &self.regions[candidate.index])
            .find(|shape| shape.outline.contains(&target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_dataset;

    #[test]
    fn only_positioned_finite_records_get_bubbles() {
        let dataset = fixture_dataset();
        let scene = Scene::build(&dataset, &AppConfig::default());
        // Geneve and Zurich; Bern has a NaN period, Atlantis matched nothing.
        let records: Vec<usize> = scene.bubbles.iter().map(|b| b.record).collect();
        assert_eq!(records, vec![0, 1]);
        assert_eq!(scene.regions.len(), 3);
    }

    #[test]
    fn bubble_radius_is_sqrt_scaled_to_largest_total() {
        let dataset = fixture_dataset();
        let scene = Scene::build(&dataset, &AppConfig::default());
        let zurich = scene.bubble_for_record(1).unwrap();
        let geneve = scene.bubble_for_record(0).unwrap();
        assert!((zurich.radius - 30.0).abs() < 1e-9);
        assert!((geneve.radius - (300.0_f64 / 9000.0).sqrt() * 30.0).abs() < 1e-9);
    }

    #[test]
    fn bubbles_sit_on_region_centroids() {
        let dataset = fixture_dataset();
        let scene = Scene::build(&dataset, &AppConfig::default());
        let geneve = scene.bubble_for_record(0).unwrap();
        assert_eq!(Some(geneve.center), scene.regions[0].centroid);
        assert_eq!(scene.region_at(geneve.center).map(|r| r.id.as_str()), Some("Geneve"));
    }

    #[test]
    fn picking_hits_inside_radius_only() {
        let dataset = fixture_dataset();
        let scene = Scene::build(&dataset, &AppConfig::default());
        let geneve = *scene.bubble_for_record(0).unwrap();
        assert_eq!(scene.bubble_at(geneve.center).map(|b| b.record), Some(0));
        let edge = Coord { x: geneve.center.x + geneve.radius * 0.99, y: geneve.center.y };
        assert_eq!(scene.bubble_at(edge).map(|b| b.record), Some(0));
        let outside = Coord { x: geneve.center.x + geneve.radius * 1.01, y: geneve.center.y };
        assert!(scene.bubble_at(outside).is_none());
        assert!(scene.region_at(Coord { x: -50.0, y: -50.0 }).is_none());
    }
}
