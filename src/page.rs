use crate::chart::render_bar_chart;
use crate::config::AppConfig;
use crate::render::{escape, render_view, to_svg};
use crate::scene::Scene;
use crate::table::render_table;
use crate::types::Dataset;
use crate::zoom::ZoomController;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

const STYLE: &str = "\
body { font-family: sans-serif; margin: 0 auto; max-width: 960px; color: #22113e; }
#map { width: 100%; height: auto; background: #f4f7f7; }
#map .bubble, #map .period-bubble { cursor: pointer; }
#map .period-label { pointer-events: none; }
#data-table { border-collapse: collapse; margin: 2em 0; }
#data-table th, #data-table td { border: 1px solid #cad8d8; padding: 4px 8px; text-align: right; }
#data-table td:first-child, #data-table th:first-child { text-align: left; }
";

/// Map in its initial view, followed by the chart and the table.
pub fn render_index(config: &AppConfig, map_svg: &str, chart_svg: &str, table_html: &str) -> String {
    let title = escape(&config.title);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\n{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n{map_svg}{chart_svg}{table_html}</body>\n</html>\n"
    )
}

/// Writes `map.svg`, `chart.svg` and `index.html` into the output directory.
pub fn write_outputs(config: &AppConfig, dataset: &Dataset, scene: &Scene) -> Result<Vec<PathBuf>> {
    let dir = &config.output.dir;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let controller = ZoomController::new(
        config.zoom.clone(),
        config.labels.clone(),
        config.bubbles.padding,
        scene.width,
        scene.height,
    );
    let map_svg = to_svg(&render_view(&controller, scene, dataset), scene.width, scene.height);
    let chart_svg = render_bar_chart(dataset, config);
    let table_html = render_table(dataset, config);
    let index = render_index(config, &map_svg, &chart_svg, &table_html);

    let mut written = Vec::with_capacity(3);
    for (name, content) in [("map.svg", &map_svg), ("chart.svg", &chart_svg), ("index.html", &index)] {
        let path = dir.join(name);
        fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote {:?} ({} bytes)", path, content.len());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_dataset;

    #[test]
    fn writes_all_three_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.output.dir = tmp.path().join("site");
        let dataset = fixture_dataset();
        let scene = Scene::build(&dataset, &config);

        let written = write_outputs(&config, &dataset, &scene).unwrap();
        let names: Vec<_> = written.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["map.svg", "chart.svg", "index.html"]);

        let index = fs::read_to_string(config.output.dir.join("index.html")).unwrap();
        assert!(index.contains("<title>Market Milk Production in Switzerland</title>"));
        assert!(index.contains(r#"<svg id="map""#));
        assert!(index.contains(r#"<svg id="bar-chart""#));
        assert!(index.contains(r#"<table id="data-table">"#));

        let map = fs::read_to_string(config.output.dir.join("map.svg")).unwrap();
        assert!(map.contains("translate(0.0000,0.0000) scale(1.0000)"));
    }

    #[test]
    fn title_is_escaped() {
        let mut config = AppConfig::default();
        config.title = "Milk & <Cheese>".to_string();
        let html = render_index(&config, "", "", "");
        assert!(html.contains("<h1>Milk &amp; &lt;Cheese&gt;</h1>"));
    }
}
