use crate::scene::Scene;
use crate::types::Dataset;
use crate::zoom::{Camera, Target, ZoomController};
use geo::Coord;
use std::fmt::Write;

pub const REGION_FILL: &str = "#cad8d8";
pub const REGION_STROKE: &str = "#22113e";
pub const BUBBLE_FILL: &str = "#EA7DFF";
pub const PERIOD_FILL: &str = "#08f2db";
pub const DETAIL_FILL: &str = "#ffffff";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Bubble,
    PeriodBubble,
    PeriodLabel,
    Details,
}

impl Layer {
    pub fn class(&self) -> &'static str {
        match self {
            Layer::Bubble => "bubble",
            Layer::PeriodBubble => "period-bubble",
            Layer::PeriodLabel => "period-label",
            Layer::Details => "bubble-details",
        }
    }
}

/// Backend-neutral drawing instruction produced for every view.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    BeginGroup { transform: Camera },
    EndGroup,
    Region { name: String, path: String },
    Circle {
        layer: Layer,
        target: Target,
        center: Coord<f64>,
        radius: f64,
        fill: &'static str,
        title: Option<String>,
    },
    Text { layer: Layer, position: Coord<f64>, font_size: f64, text: String, fill: Option<&'static str> },
}

/// Draw list for the controller's current view, bottom layer first.
pub fn render_view(controller: &ZoomController, scene: &Scene, dataset: &Dataset) -> Vec<DrawCommand> {
    let overlay = controller.overlay();
    let mut commands = Vec::with_capacity(scene.regions.len() + scene.bubbles.len() + 8);

    commands.push(DrawCommand::BeginGroup { transform: controller.camera() });

    for region in &scene.regions {
        commands.push(DrawCommand::Region { name: region.id.clone(), path: region.path.clone() });
    }

    for bubble in &scene.bubbles {
        let Some(record) = dataset.records.get(bubble.record) else { continue };
        commands.push(DrawCommand::Circle {
            layer: Layer::Bubble,
            target: Target::TopBubble(bubble.record),
            center: bubble.center,
            radius: bubble.radius,
            fill: BUBBLE_FILL,
            title: Some(record.name.clone()),
        });
    }

    for sub in &overlay.sub_bubbles {
        commands.push(DrawCommand::Circle {
            layer: Layer::PeriodBubble,
            target: Target::SubBubble(sub.period),
            center: sub.center,
            radius: sub.radius,
            fill: PERIOD_FILL,
            title: None,
        });
    }

    if overlay.labels_visible {
        for sub in &overlay.sub_bubbles {
            commands.push(DrawCommand::Text {
                layer: Layer::PeriodLabel,
                position: sub.center,
                font_size: sub.label_size(),
                text: sub.label.clone(),
                fill: None,
            });
        }
    }

    if let Some(annotation) = &overlay.annotation {
        for line in &annotation.lines {
            commands.push(DrawCommand::Text {
                layer: Layer::Details,
                position: line.position,
                font_size: line.font_size,
                text: line.text.clone(),
                fill: Some(DETAIL_FILL),
            });
        }
    }

    commands.push(DrawCommand::EndGroup);
    commands
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn target_attr(target: Target) -> String {
    match target {
        Target::TopBubble(i) => format!("bubble:{}", i),
        Target::SubBubble(i) => format!("period:{}", i),
        Target::Background => "background".to_string(),
    }
}

/// Serializes a draw list as a standalone SVG document.
pub fn to_svg(commands: &[DrawCommand], width: f64, height: f64) -> String {
    let mut s = String::with_capacity(64 * 1024);
    let _ = writeln!(
        s,
        r#"<svg id="map" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" preserveAspectRatio="xMidYMid meet">"#,
        width, height
    );

    let mut depth = 1;
    for command in commands {
        let indent = "  ".repeat(depth);
        match command {
            DrawCommand::BeginGroup { transform } => {
                let _ = writeln!(
                    s,
                    r#"{}<g transform="translate({:.4},{:.4}) scale({:.4})">"#,
                    indent, transform.x, transform.y, transform.k
                );
                depth += 1;
            }
            DrawCommand::EndGroup => {
                depth = depth.saturating_sub(1).max(1);
                let _ = writeln!(s, "{}</g>", "  ".repeat(depth));
            }
            DrawCommand::Region { name, path } => {
                let _ = writeln!(
                    s,
                    r#"{}<path class="region" d="{}" fill="{}" stroke="{}"><title>{}</title></path>"#,
                    indent, path, REGION_FILL, REGION_STROKE, escape(name)
                );
            }
            DrawCommand::Circle { layer, target, center, radius, fill, title } => {
                let _ = write!(
                    s,
                    r#"{}<circle class="{}" data-target="{}" cx="{:.2}" cy="{:.2}" r="{:.3}" fill="{}""#,
                    indent, layer.class(), target_attr(*target), center.x, center.y, radius, fill
                );
                match title {
                    Some(title) => {
                        let _ = writeln!(s, "><title>{}</title></circle>", escape(title));
                    }
                    None => s.push_str("/>\n"),
                }
            }
            DrawCommand::Text { layer, position, font_size, text, fill } => {
                let fill_attr = fill.map(|f| format!(r#" fill="{}""#, f)).unwrap_or_default();
                let _ = writeln!(
                    s,
                    r#"{}<text class="{}" x="{:.2}" y="{:.2}" text-anchor="middle" dominant-baseline="middle" font-size="{:.3}px"{}>{}</text>"#,
                    indent, layer.class(), position.x, position.y, font_size, fill_attr, escape(text)
                );
            }
        }
    }

    s.push_str("</svg>\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::fixture_dataset;
    use pretty_assertions::assert_eq;

    fn count(commands: &[DrawCommand], layer: Layer) -> usize {
        commands
            .iter()
            .filter(|c| match c {
                DrawCommand::Circle { layer: l, .. } | DrawCommand::Text { layer: l, .. } => *l == layer,
                _ => false,
            })
            .count()
    }

    fn setup() -> (ZoomController, Scene, Dataset) {
        let config = AppConfig::default();
        let dataset = fixture_dataset();
        let scene = Scene::build(&dataset, &config);
        let zc = ZoomController::new(config.zoom, config.labels, 3.0, 800.0, 600.0);
        (zc, scene, dataset)
    }

    #[test]
    fn overview_draws_regions_and_bubbles_only() {
        let (zc, scene, dataset) = setup();
        let commands = render_view(&zc, &scene, &dataset);
        assert_eq!(commands.first(), Some(&DrawCommand::BeginGroup { transform: Camera::IDENTITY }));
        assert_eq!(commands.last(), Some(&DrawCommand::EndGroup));
        let regions = commands.iter().filter(|c| matches!(c, DrawCommand::Region { .. })).count();
        assert_eq!(regions, 3);
        assert_eq!(count(&commands, Layer::Bubble), 2);
        assert_eq!(count(&commands, Layer::PeriodBubble), 0);
    }

    #[test]
    fn each_level_mounts_its_overlay() {
        let (mut zc, scene, dataset) = setup();
        zc.click(Target::TopBubble(0), &scene, &dataset);
        zc.settle();
        let commands = render_view(&zc, &scene, &dataset);
        assert_eq!(count(&commands, Layer::PeriodBubble), 3);
        assert_eq!(count(&commands, Layer::PeriodLabel), 3);

        zc.click(Target::SubBubble(0), &scene, &dataset);
        zc.settle();
        let commands = render_view(&zc, &scene, &dataset);
        assert_eq!(count(&commands, Layer::PeriodLabel), 0);
        assert_eq!(count(&commands, Layer::Details), 2);
    }

    #[test]
    fn svg_marks_click_targets() {
        let (zc, scene, dataset) = setup();
        let svg = to_svg(&render_view(&zc, &scene, &dataset), 800.0, 600.0);
        assert!(svg.starts_with(r#"<svg id="map""#));
        assert!(svg.contains(r#"data-target="bubble:0""#));
        assert!(svg.contains(r#"data-target="bubble:1""#));
        assert!(!svg.contains(r#"data-target="bubble:2""#));
        assert!(svg.contains("<title>Geneve</title>"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn text_is_escaped() {
        let commands = vec![DrawCommand::Text {
            layer: Layer::Details,
            position: Coord { x: 1.0, y: 2.0 },
            font_size: 10.0,
            text: "A & <B>".to_string(),
            fill: Some(DETAIL_FILL),
        }];
        let svg = to_svg(&commands, 10.0, 10.0);
        assert_eq!(
            svg.lines().nth(1).unwrap(),
            r##"  <text class="bubble-details" x="1.00" y="2.00" text-anchor="middle" dominant-baseline="middle" font-size="10.000px" fill="#ffffff">A &amp; &lt;B&gt;</text>"##
        );
    }
}
