//! Drill-down controller: overview → region bubble → single period.
//!
//! The controller owns the only copy of the view state. Every input arrives
//! as an explicit [`Target`] handle, and camera moves are timed transitions
//! whose completion effects (mounting sub-bubbles, annotating, clearing) run
//! exactly once from [`ZoomController::advance`]. Input that arrives while a
//! transition is running is rejected.

use crate::config::{LabelConfig, PeriodZoom, ZoomConfig};
use crate::layout::pack;
use crate::scene::Scene;
use crate::types::Dataset;
use geo::Coord;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Affine camera: `screen = k * world + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub k: f64,
    pub x: f64,
    pub y: f64,
}

impl Camera {
    pub const IDENTITY: Camera = Camera { k: 1.0, x: 0.0, y: 0.0 };

    /// Centres `anchor` in a `width` × `height` viewport at magnification `scale`.
    pub fn framing(anchor: Coord<f64>, scale: f64, width: f64, height: f64) -> Self {
        Camera {
            k: scale,
            x: width / 2.0 - scale * anchor.x,
            y: height / 2.0 - scale * anchor.y,
        }
    }

    pub fn apply(&self, p: Coord<f64>) -> Coord<f64> {
        Coord { x: p.x * self.k + self.x, y: p.y * self.k + self.y }
    }

    pub fn invert(&self, p: Coord<f64>) -> Coord<f64> {
        Coord { x: (p.x - self.x) / self.k, y: (p.y - self.y) / self.k }
    }

    pub fn is_identity(&self) -> bool {
        *self == Camera::IDENTITY
    }
}

fn cubic_in_out(t: f64) -> f64 {
    let t = t * 2.0;
    if t <= 1.0 {
        t * t * t / 2.0
    } else {
        let t = t - 2.0;
        (t * t * t + 2.0) / 2.0
    }
}

/// Smooth pan-and-zoom path between two cameras (van Wijk & Nuij, rho = sqrt 2).
/// Views are `(centre x, centre y, visible width)` in world units.
#[derive(Debug, Clone, Copy)]
struct ZoomPath {
    centre: Coord<f64>,
    extent: f64,
    from: (f64, f64, f64),
    dx: f64,
    dy: f64,
    dist: f64,
    r0: f64,
    span: f64,
    straight: bool,
}

const RHO: f64 = std::f64::consts::SQRT_2;

impl ZoomPath {
    fn new(from: Camera, to: Camera, width: f64, height: f64) -> Self {
        let centre = Coord { x: width / 2.0, y: height / 2.0 };
        let extent = width.max(height);
        let view = |c: Camera| {
            let p = c.invert(centre);
            (p.x, p.y, extent / c.k)
        };
        let (ux0, uy0, w0) = view(from);
        let (ux1, uy1, w1) = view(to);
        let (dx, dy) = (ux1 - ux0, uy1 - uy0);
        let d2 = dx * dx + dy * dy;
        let rho2 = RHO * RHO;
        let rho4 = rho2 * rho2;

        if d2 < 1e-12 {
            return ZoomPath {
                centre,
                extent,
                from: (ux0, uy0, w0),
                dx,
                dy,
                dist: 0.0,
                r0: 0.0,
                span: (w1 / w0).ln() / RHO,
                straight: true,
            };
        }

        let d1 = d2.sqrt();
        let b0 = (w1 * w1 - w0 * w0 + rho4 * d2) / (2.0 * w0 * rho2 * d1);
        let b1 = (w1 * w1 - w0 * w0 - rho4 * d2) / (2.0 * w1 * rho2 * d1);
        let r0 = ((b0 * b0 + 1.0).sqrt() - b0).ln();
        let r1 = ((b1 * b1 + 1.0).sqrt() - b1).ln();
        ZoomPath {
            centre,
            extent,
            from: (ux0, uy0, w0),
            dx,
            dy,
            dist: d1,
            r0,
            span: (r1 - r0) / RHO,
            straight: false,
        }
    }

    fn at(&self, t: f64) -> Camera {
        let (ux0, uy0, w0) = self.from;
        let s = t * self.span;
        let (ux, uy, w) = if self.straight {
            (ux0 + t * self.dx, uy0 + t * self.dy, w0 * (RHO * s).exp())
        } else {
            let cosh_r0 = self.r0.cosh();
            let u = w0 / (RHO * RHO * self.dist)
                * (cosh_r0 * (RHO * s + self.r0).tanh() - self.r0.sinh());
            (ux0 + u * self.dx, uy0 + u * self.dy, w0 * cosh_r0 / (RHO * s + self.r0).cosh())
        };
        let k = self.extent / w;
        Camera { k, x: self.centre.x - ux * k, y: self.centre.y - uy * k }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewState {
    Overview,
    RegionZoomed { record: usize, anchor: Coord<f64>, radius: f64 },
    PeriodZoomed { record: usize, period: usize, anchor: Coord<f64>, radius: f64 },
}

/// What a click landed on. Handles index into the record list or into the
/// current region's periods; they are resolved again on every click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    TopBubble(usize),
    SubBubble(usize),
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    ZoomingToRegion { record: usize },
    ZoomingToPeriod { period: usize },
    Resetting,
    /// A transition is still running; the click was dropped.
    Busy,
    /// The target means nothing in the current view.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubBubble {
    pub period: usize,
    pub label: String,
    pub value: f64,
    pub center: Coord<f64>,
    pub radius: f64,
}

impl SubBubble {
    pub fn label_size(&self) -> f64 {
        (self.radius / 3.0).min(12.0)
    }

    fn contains(&self, p: Coord<f64>) -> bool {
        let (dx, dy) = (p.x - self.center.x, p.y - self.center.y);
        self.radius > 0.0 && dx * dx + dy * dy <= self.radius * self.radius
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationLine {
    pub text: String,
    pub position: Coord<f64>,
    pub font_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub period: usize,
    pub lines: [AnnotationLine; 2],
}

/// Elements mounted on top of the overview while zoomed in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub sub_bubbles: Vec<SubBubble>,
    pub labels_visible: bool,
    pub annotation: Option<Annotation>,
}

impl Overlay {
    /// Number of drawable overlay elements (bubbles, labels, detail lines).
    pub fn element_count(&self) -> usize {
        let labels = if self.labels_visible { self.sub_bubbles.len() } else { 0 };
        let details = self.annotation.as_ref().map_or(0, |a| a.lines.len());
        self.sub_bubbles.len() + labels + details
    }

    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }
}

#[derive(Debug, Clone)]
enum Effect {
    MountPeriods { record: usize, anchor: Coord<f64>, radius: f64, children: Vec<(String, f64)> },
    Annotate { record: usize, period: usize, anchor: Coord<f64>, radius: f64, label: String, value: f64 },
    Clear,
}

#[derive(Debug, Clone)]
struct Transition {
    path: ZoomPath,
    target: Camera,
    started: Duration,
    duration: Duration,
    on_end: Effect,
}

pub struct ZoomController {
    config: ZoomConfig,
    labels: LabelConfig,
    padding: f64,
    width: f64,
    height: f64,
    state: ViewState,
    camera: Camera,
    overlay: Overlay,
    pending: Option<Transition>,
    clock: Duration,
}

fn is_finite_coord(c: Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

impl ZoomController {
    pub fn new(config: ZoomConfig, labels: LabelConfig, padding: f64, width: f64, height: f64) -> Self {
        Self {
            config,
            labels,
            padding,
            width,
            height,
            state: ViewState::Overview,
            camera: Camera::IDENTITY,
            overlay: Overlay::default(),
            pending: None,
            clock: Duration::ZERO,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Time since the controller was created, as seen by transitions.
    pub fn clock(&self) -> Duration {
        self.clock
    }

    /// Resolves a screen point to the element drawn on top there.
    pub fn pick(&self, screen: Coord<f64>, scene: &Scene) -> Target {
        let world = self.camera.invert(screen);
        if let Some(sub) = self.overlay.sub_bubbles.iter().rev().find(|s| s.contains(world)) {
            return Target::SubBubble(sub.period);
        }
        match scene.bubble_at(world) {
            Some(bubble) => Target::TopBubble(bubble.record),
            None => Target::Background,
        }
    }

    pub fn click(&mut self, target: Target, scene: &Scene, dataset: &Dataset) -> ClickOutcome {
        if self.pending.is_some() {
            debug!("Ignoring click on {:?}: transition in progress", target);
            return ClickOutcome::Busy;
        }

        match (self.state, target) {
            (ViewState::Overview, Target::TopBubble(record)) => self.zoom_to_region(record, scene, dataset),
            (ViewState::Overview, _) => ClickOutcome::Ignored,
            (ViewState::RegionZoomed { record, .. }, Target::SubBubble(period)) => {
                self.zoom_to_period(record, period)
            }
            (ViewState::PeriodZoomed { period: current, .. }, Target::SubBubble(period)) if current == period => {
                self.reset()
            }
            (ViewState::PeriodZoomed { record, .. }, Target::SubBubble(period)) => {
                self.zoom_to_period(record, period)
            }
            (_, Target::TopBubble(_) | Target::Background) => self.reset(),
        }
    }

    /// Moves the clock forward, animating the camera. Returns true when a
    /// transition finished (and its completion effect ran) during this step.
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.clock += dt;
        let Some(transition) = &self.pending else {
            return false;
        };

        let elapsed = self.clock.saturating_sub(transition.started);
        if elapsed < transition.duration {
            let t = elapsed.as_secs_f64() / transition.duration.as_secs_f64();
            self.camera = transition.path.at(cubic_in_out(t));
            return false;
        }

        if let Some(done) = self.pending.take() {
            self.camera = done.target;
            self.complete(done.on_end);
        }
        true
    }

    /// Runs any pending transition to its end.
    pub fn settle(&mut self) -> bool {
        let remaining = self
            .pending
            .as_ref()
            .map(|t| (t.started + t.duration).saturating_sub(self.clock));
        match remaining {
            Some(dt) => self.advance(dt),
            None => false,
        }
    }

    /// Wheel zoom about a screen point. The resulting scale is clamped to
    /// `scale_extent` and the view level is left as it is. Returns false when
    /// the gesture was dropped.
    pub fn zoom_by(&mut self, factor: f64, screen: Coord<f64>) -> bool {
        if self.pending.is_some() {
            debug!("Ignoring zoom by {}: transition in progress", factor);
            return false;
        }
        if !(factor.is_finite() && factor > 0.0) || !is_finite_coord(screen) {
            warn!("Ignoring zoom by {} about {:?}", factor, screen);
            return false;
        }
        let [min_k, max_k] = self.config.scale_extent;
        let k = (self.camera.k * factor).clamp(min_k, max_k);
        let world = self.camera.invert(screen);
        self.camera = Camera { k, x: screen.x - world.x * k, y: screen.y - world.y * k };
        true
    }

    /// Drag pan by a screen-space offset.
    pub fn pan_by(&mut self, dx: f64, dy: f64) -> bool {
        if self.pending.is_some() {
            debug!("Ignoring pan: transition in progress");
            return false;
        }
        if !dx.is_finite() || !dy.is_finite() {
            warn!("Ignoring pan by ({}, {})", dx, dy);
            return false;
        }
        self.camera.x += dx;
        self.camera.y += dy;
        true
    }

    fn zoom_to_region(&mut self, record: usize, scene: &Scene, dataset: &Dataset) -> ClickOutcome {
        let (Some(bubble), Some(joined)) = (scene.bubble_for_record(record), dataset.records.get(record)) else {
            warn!("Record #{} has no bubble on the map", record);
            return ClickOutcome::Ignored;
        };
        if !is_finite_coord(bubble.center) || !bubble.radius.is_finite() {
            error!("Invalid coordinates or radius for '{}': {:?}", joined.name, bubble);
            return ClickOutcome::Ignored;
        }

        let scale = if bubble.radius < self.config.small_bubble_radius {
            self.config.small_bubble_scale
        } else {
            self.config.large_bubble_scale
        };
        info!("Zooming to '{}' at scale {}", joined.name, scale);

        let children = joined.values().iter().map(|v| (v.label.clone(), v.value)).collect();
        self.start(
            Camera::framing(bubble.center, scale, self.width, self.height),
            Effect::MountPeriods { record, anchor: bubble.center, radius: bubble.radius, children },
        );
        ClickOutcome::ZoomingToRegion { record }
    }

    fn zoom_to_period(&mut self, record: usize, period: usize) -> ClickOutcome {
        let Some(sub) = self.overlay.sub_bubbles.iter().find(|s| s.period == period).cloned() else {
            warn!("No period bubble #{} is mounted", period);
            return ClickOutcome::Ignored;
        };
        if !is_finite_coord(sub.center) || !sub.radius.is_finite() {
            error!("Invalid coordinates or radius for period '{}': {:?}", sub.label, sub);
            return ClickOutcome::Ignored;
        }
        let Some(scale) = self.period_scale(sub.radius) else {
            warn!("Period '{}' is too small to frame", sub.label);
            return ClickOutcome::Ignored;
        };

        self.overlay.labels_visible = false;
        info!("Zooming to period '{}' at scale {}", sub.label, scale);
        self.start(
            Camera::framing(sub.center, scale, self.width, self.height),
            Effect::Annotate {
                record,
                period,
                anchor: sub.center,
                radius: sub.radius,
                label: sub.label,
                value: sub.value,
            },
        );
        ClickOutcome::ZoomingToPeriod { period }
    }

    fn period_scale(&self, radius: f64) -> Option<f64> {
        let scale = match self.config.period_zoom {
            PeriodZoom::Fixed { scale } => scale,
            PeriodZoom::Adaptive { fill } => fill * self.width.min(self.height) / (2.0 * radius),
        };
        (scale.is_finite() && scale > 0.0).then_some(scale)
    }

    fn reset(&mut self) -> ClickOutcome {
        info!("Resetting zoom");
        self.start(Camera::IDENTITY, Effect::Clear);
        ClickOutcome::Resetting
    }

    fn start(&mut self, target: Camera, on_end: Effect) {
        self.pending = Some(Transition {
            path: ZoomPath::new(self.camera, target, self.width, self.height),
            target,
            started: self.clock,
            duration: self.config.duration(),
            on_end,
        });
    }

    fn complete(&mut self, effect: Effect) {
        match effect {
            Effect::MountPeriods { record, anchor, radius, children } => {
                self.overlay = Overlay::default();
                match pack(&children, radius, self.padding) {
                    Ok(nodes) => {
                        let subs: Vec<SubBubble> = nodes
                            .into_iter()
                            .enumerate()
                            .map(|(period, node)| SubBubble {
                                period,
                                label: node.label,
                                value: node.value,
                                center: Coord { x: anchor.x + node.x, y: anchor.y + node.y },
                                radius: node.r,
                            })
                            .collect();
                        if subs.iter().all(|s| is_finite_coord(s.center) && s.radius.is_finite()) {
                            self.overlay.sub_bubbles = subs;
                            self.overlay.labels_visible = true;
                        } else {
                            error!("Period layout for record #{} produced non-finite positions", record);
                        }
                    }
                    Err(e) => error!("Cannot lay out periods for record #{}: {}", record, e),
                }
                self.state = ViewState::RegionZoomed { record, anchor, radius };
            }
            Effect::Annotate { record, period, anchor, radius, label, value } => {
                self.overlay.annotation = None;
                if is_finite_coord(anchor) && radius.is_finite() {
                    self.overlay.annotation = Some(Annotation {
                        period,
                        lines: [
                            AnnotationLine {
                                text: format!("{}: {}", self.labels.period_caption, label),
                                position: Coord { x: anchor.x, y: anchor.y - radius / 5.0 },
                                font_size: (radius / 4.0).min(16.0),
                            },
                            AnnotationLine {
                                text: format!("{}: {}", self.labels.value_caption, value),
                                position: Coord { x: anchor.x, y: anchor.y + radius / 5.0 },
                                font_size: (radius / 5.0).min(14.0),
                            },
                        ],
                    });
                } else {
                    error!("Invalid coordinates or radius: {:?} r={}", anchor, radius);
                }
                self.state = ViewState::PeriodZoomed { record, period, anchor, radius };
            }
            Effect::Clear => {
                self.overlay = Overlay::default();
                self.state = ViewState::Overview;
            }
        }
        debug!("Transition complete: {:?}", self.state);
    }
}
