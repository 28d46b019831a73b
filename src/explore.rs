//! Scripted interaction with the zoomable map, one command per line.

use crate::app::{load_or_report, RunOutcome};
use crate::config::AppConfig;
use crate::matching::match_key;
use crate::render::{render_view, to_svg};
use crate::scene::Scene;
use crate::types::Dataset;
use crate::zoom::{ClickOutcome, Target, ViewState, ZoomController};
use anyhow::{anyhow, bail, Context, Result};
use geo::Coord;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Click(Coord<f64>),
    Select(String),
    Period(String),
    Background,
    Hover(Coord<f64>),
    Zoom { factor: f64, about: Coord<f64> },
    Pan(Coord<f64>),
    Wait(Duration),
    Settle,
    State,
    Snapshot(PathBuf),
}

fn parse_point(args: &str) -> Result<Coord<f64>> {
    let mut parts = args.split_whitespace();
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("expected two coordinates, got '{}'", args);
    };
    let x: f64 = x.parse().with_context(|| format!("bad x coordinate '{}'", x))?;
    let y: f64 = y.parse().with_context(|| format!("bad y coordinate '{}'", y))?;
    Ok(Coord { x, y })
}

fn required(args: &str, what: &str) -> Result<String> {
    if args.is_empty() {
        bail!("missing {}", what);
    }
    Ok(args.to_string())
}

/// `Ok(None)` for blank lines, comments and unknown commands.
fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let args = args.trim();

    let command = match word.to_ascii_lowercase().as_str() {
        "click" => Command::Click(parse_point(args)?),
        "select" => Command::Select(required(args, "region name")?),
        "period" => Command::Period(required(args, "period label")?),
        "background" => Command::Background,
        "hover" => Command::Hover(parse_point(args)?),
        "zoom" => {
            let (factor, point) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
            let factor: f64 = factor.parse().with_context(|| format!("bad zoom factor '{}'", factor))?;
            Command::Zoom { factor, about: parse_point(point)? }
        }
        "pan" => Command::Pan(parse_point(args)?),
        "wait" => {
            let ms: u64 = args.parse().with_context(|| format!("bad duration '{}'", args))?;
            Command::Wait(Duration::from_millis(ms))
        }
        "settle" => Command::Settle,
        "state" => Command::State,
        "snapshot" => Command::Snapshot(PathBuf::from(required(args, "file name")?)),
        other => {
            warn!("Unknown command '{}', skipping", other);
            return Ok(None);
        }
    };
    Ok(Some(command))
}

pub struct Session {
    config: AppConfig,
    dataset: Dataset,
    scene: Scene,
    controller: ZoomController,
    snapshots: Vec<PathBuf>,
}

impl Session {
    pub fn new(config: AppConfig, dataset: Dataset) -> Self {
        let scene = Scene::build(&dataset, &config);
        let controller = ZoomController::new(
            config.zoom.clone(),
            config.labels.clone(),
            config.bubbles.padding,
            scene.width,
            scene.height,
        );
        Self { config, dataset, scene, controller, snapshots: Vec::new() }
    }

    pub fn controller(&self) -> &ZoomController {
        &self.controller
    }

    pub fn execute(&mut self, line: &str) -> Result<()> {
        let Some(command) = parse_command(line)? else {
            return Ok(());
        };

        match command {
            Command::Click(screen) => {
                let target = self.controller.pick(screen, &self.scene);
                self.click(target);
            }
            Command::Select(name) => {
                let record = self.find_record(&name)?;
                self.click(Target::TopBubble(record));
            }
            Command::Period(label) => {
                let period = self.find_period(&label)?;
                self.click(Target::SubBubble(period));
            }
            Command::Background => {
                self.click(Target::Background);
            }
            Command::Hover(screen) => match self.hover(screen) {
                Some(name) => info!("({}, {}) is over {}", screen.x, screen.y, name),
                None => info!("({}, {}) is over no region", screen.x, screen.y),
            },
            Command::Zoom { factor, about } => {
                if self.controller.zoom_by(factor, about) {
                    info!(
                        "Zoomed by {} about ({}, {}), scale now {:.3}",
                        factor,
                        about.x,
                        about.y,
                        self.controller.camera().k
                    );
                } else {
                    info!("Zoom by {} dropped", factor);
                }
            }
            Command::Pan(offset) => {
                if !self.controller.pan_by(offset.x, offset.y) {
                    info!("Pan by ({}, {}) dropped", offset.x, offset.y);
                }
            }
            Command::Wait(dt) => {
                if self.controller.advance(dt) {
                    info!("Transition finished: {}", self.describe());
                }
            }
            Command::Settle => {
                if self.controller.settle() {
                    info!("Transition finished: {}", self.describe());
                }
            }
            Command::State => {
                let camera = self.controller.camera();
                info!(
                    "{} | camera k={:.3} x={:.1} y={:.1} | {} overlay elements{}",
                    self.describe(),
                    camera.k,
                    camera.x,
                    camera.y,
                    self.controller.overlay().element_count(),
                    if self.controller.is_busy() { " | zooming" } else { "" }
                );
            }
            Command::Snapshot(path) => self.snapshot(&path)?,
        }
        Ok(())
    }

    /// Name of the region under a screen point, looked up in map space.
    pub fn hover(&self, screen: Coord<f64>) -> Option<&str> {
        let world = self.controller.camera().invert(screen);
        self.scene.region_at(world).map(|shape| shape.id.as_str())
    }

    pub fn snapshots(&self) -> &[PathBuf] {
        &self.snapshots
    }

    fn click(&mut self, target: Target) -> ClickOutcome {
        let outcome = self.controller.click(target, &self.scene, &self.dataset);
        info!("Click on {:?}: {:?}", target, outcome);
        outcome
    }

    fn find_record(&self, name: &str) -> Result<usize> {
        let key = match_key(name);
        self.dataset
            .records
            .iter()
            .position(|r| match_key(&r.name) == key)
            .ok_or_else(|| anyhow!("no record named '{}'", name))
    }

    fn find_period(&self, label: &str) -> Result<usize> {
        let key = match_key(label);
        self.dataset
            .periods
            .iter()
            .position(|p| match_key(p) == key)
            .ok_or_else(|| anyhow!("no period labelled '{}'", label))
    }

    fn describe(&self) -> String {
        let name = |record: usize| self.dataset.records.get(record).map_or("?", |r| r.name.as_str());
        match *self.controller.state() {
            ViewState::Overview => "overview".to_string(),
            ViewState::RegionZoomed { record, .. } => format!("zoomed on {}", name(record)),
            ViewState::PeriodZoomed { record, period, .. } => format!(
                "zoomed on {} {}",
                name(record),
                self.dataset.periods.get(period).map_or("?", String::as_str)
            ),
        }
    }

    fn snapshot(&mut self, path: &Path) -> Result<()> {
        let path = if path.is_relative() { self.config.output.dir.join(path) } else { path.to_path_buf() };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let svg = to_svg(
            &render_view(&self.controller, &self.scene, &self.dataset),
            self.scene.width,
            self.scene.height,
        );
        fs::write(&path, svg).with_context(|| format!("Failed to write snapshot {:?}", path))?;
        info!("Snapshot of {} written to {:?}", self.describe(), path);
        self.snapshots.push(path);
        Ok(())
    }
}

/// Replays a script from `script`, or from stdin when none is given.
pub async fn run(config: &AppConfig, script: Option<&Path>) -> Result<RunOutcome> {
    let Some(dataset) = load_or_report(config).await else {
        return Ok(RunOutcome::LoadFailed);
    };

    let reader: Box<dyn AsyncBufRead + Unpin> = match script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open script {:?}", path))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut session = Session::new(config.clone(), dataset);
    let mut lines = reader.lines();
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await.context("Failed to read script")? {
        line_no += 1;
        if let Err(e) = session.execute(&line) {
            warn!("Line {}: '{}': {:#}", line_no, line.trim(), e);
        }
    }

    Ok(RunOutcome::Rendered(session.snapshots))
}
