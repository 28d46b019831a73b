//! Area-proportional circle layout.
//!
//! Circle *area* is linear in the underlying value, so radii are derived from
//! the square root of each value's share. Children of a bubble are packed
//! greedily: largest first, each new circle tangent to one or two already
//! placed circles, at the valid spot closest to the cluster's centre of mass.

use std::cmp::Ordering;
use thiserror::Error;

const EPSILON: f64 = 1e-9;

/// Candidate angles tried around a single neighbour when no pair tangency fits.
const FALLBACK_ANGLES: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    /// Centre relative to the container centre.
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("container radius {0} is not a usable size")]
    InvalidRadius(f64),
    #[error("child '{label}' has invalid value {value}")]
    InvalidValue { label: String, value: f64 },
    #[error("children total {0} cannot be used to size bubbles")]
    DegenerateTotal(f64),
}

/// Radius for `value` on a square-root scale mapping `[0, max_value]` onto
/// `[0, max_radius]`. Returns NaN when the inputs cannot produce a radius.
pub fn area_radius(value: f64, max_value: f64, max_radius: f64) -> f64 {
    if !(max_value > 0.0) || !max_value.is_finite() || value < 0.0 {
        return f64::NAN;
    }
    (value / max_value).sqrt() * max_radius
}

#[derive(Debug, Clone, Copy)]
struct Placed {
    x: f64,
    y: f64,
    /// Radius grown by half the padding so tangent circles keep the full gap.
    pr: f64,
}

impl Placed {
    fn clears(&self, x: f64, y: f64, pr: f64) -> bool {
        let dist = ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt();
        dist + EPSILON >= self.pr + pr
    }
}

/// Lays out `children` inside a container of `container_radius`. Each child
/// gets radius `sqrt(value / total) * container_radius` and every pair of
/// children keeps at least `padding` between their edges.
pub fn pack(
    children: &[(String, f64)],
    container_radius: f64,
    padding: f64,
) -> Result<Vec<LayoutNode>, LayoutError> {
    if !container_radius.is_finite() || container_radius < 0.0 {
        return Err(LayoutError::InvalidRadius(container_radius));
    }
    if children.is_empty() {
        return Ok(Vec::new());
    }
    for (label, value) in children {
        if !value.is_finite() || *value < 0.0 {
            return Err(LayoutError::InvalidValue { label: label.clone(), value: *value });
        }
    }
    let total: f64 = children.iter().map(|(_, v)| v).sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(LayoutError::DegenerateTotal(total));
    }

    let radii: Vec<f64> = children
        .iter()
        .map(|(_, v)| (v / total).sqrt() * container_radius)
        .collect();
    let half_pad = padding.max(0.0) / 2.0;

    let mut order: Vec<usize> = (0..children.len()).collect();
    order.sort_by(|&a, &b| radii[b].partial_cmp(&radii[a]).unwrap_or(Ordering::Equal));

    let mut centres = vec![(0.0, 0.0); children.len()];
    let mut placed: Vec<Placed> = Vec::with_capacity(children.len());
    for &i in &order {
        let pr = radii[i] + half_pad;
        let (x, y) = place(&placed, pr);
        placed.push(Placed { x, y, pr });
        centres[i] = (x, y);
    }

    // Centre the cluster's bounding box on the container origin.
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for (i, &(x, y)) in centres.iter().enumerate() {
        min_x = min_x.min(x - radii[i]);
        min_y = min_y.min(y - radii[i]);
        max_x = max_x.max(x + radii[i]);
        max_y = max_y.max(y + radii[i]);
    }
    let (shift_x, shift_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    Ok(children
        .iter()
        .enumerate()
        .map(|(i, (label, value))| LayoutNode {
            x: centres[i].0 - shift_x,
            y: centres[i].1 - shift_y,
            r: radii[i],
            value: *value,
            label: label.clone(),
        })
        .collect())
}

fn place(placed: &[Placed], pr: f64) -> (f64, f64) {
    match placed {
        [] => (0.0, 0.0),
        [first] => (first.x + first.pr + pr, first.y),
        _ => {
            let mass: f64 = placed.iter().map(|p| p.pr * p.pr).sum();
            let target = if mass > 0.0 {
                (
                    placed.iter().map(|p| p.x * p.pr * p.pr).sum::<f64>() / mass,
                    placed.iter().map(|p| p.y * p.pr * p.pr).sum::<f64>() / mass,
                )
            } else {
                (placed[0].x, placed[0].y)
            };

            let mut candidates = Vec::new();
            for (ai, a) in placed.iter().enumerate() {
                for b in &placed[ai + 1..] {
                    candidates.extend(tangent_to_both(a, b, pr));
                }
                for k in 0..FALLBACK_ANGLES {
                    let angle = k as f64 * std::f64::consts::TAU / FALLBACK_ANGLES as f64;
                    let d = a.pr + pr;
                    candidates.push((a.x + d * angle.cos(), a.y + d * angle.sin()));
                }
            }
            // Always valid: right of everything placed so far.
            let right = placed.iter().map(|p| p.x + p.pr).fold(f64::MIN, f64::max);
            candidates.push((right + pr, target.1));

            candidates
                .into_iter()
                .filter(|&(x, y)| x.is_finite() && y.is_finite())
                .filter(|&(x, y)| placed.iter().all(|p| p.clears(x, y, pr)))
                .min_by(|a, b| {
                    let da = (a.0 - target.0).powi(2) + (a.1 - target.1).powi(2);
                    let db = (b.0 - target.0).powi(2) + (b.1 - target.1).powi(2);
                    da.partial_cmp(&db).unwrap_or(Ordering::Equal)
                })
                .unwrap_or((right + pr, target.1))
        }
    }
}

/// Centres at which a circle of radius `pr` touches both `a` and `b` externally.
fn tangent_to_both(a: &Placed, b: &Placed, pr: f64) -> Vec<(f64, f64)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let d = (dx * dx + dy * dy).sqrt();
    let (ra, rb) = (a.pr + pr, b.pr + pr);
    if d < EPSILON || d > ra + rb || d < (ra - rb).abs() {
        return Vec::new();
    }
    let along = (ra * ra - rb * rb + d * d) / (2.0 * d);
    let h_sq = ra * ra - along * along;
    if h_sq < 0.0 {
        return Vec::new();
    }
    let h = h_sq.sqrt();
    let (ux, uy) = (dx / d, dy / d);
    let (mx, my) = (a.x + along * ux, a.y + along * uy);
    vec![(mx - h * uy, my + h * ux), (mx + h * uy, my - h * ux)]
}
