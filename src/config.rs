use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use std::time::Duration;
use anyhow::{Context, Result, ensure};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub title: String,
    pub input: InputConfig,
    pub projection: ProjectionConfig,
    pub bubbles: BubbleConfig,
    pub zoom: ZoomConfig,
    pub labels: LabelConfig,
    pub chart: ChartConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    /// URL or local path of the region boundaries (GeoJSON, or `.shp` when local).
    pub geometry: String,
    /// URL or local path of the per-region metric CSV.
    pub metrics: String,
    pub name_property: String,
    pub region_column: String,
    pub periods: Vec<PeriodConfig>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PeriodConfig {
    pub label: String,
    pub column: String, // CSV column holding this period's value
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProjectionConfig {
    pub center: [f64; 2], // lon, lat
    pub scale: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BubbleConfig {
    pub max_radius: f64,
    pub padding: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ZoomConfig {
    pub duration_ms: u64,
    pub small_bubble_radius: f64,
    pub small_bubble_scale: f64,
    pub large_bubble_scale: f64,
    pub period_zoom: PeriodZoom,
    /// Allowed scale range for free wheel zooming, `[min, max]`.
    pub scale_extent: [f64; 2],
}

/// Magnification used when drilling into a single period bubble.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PeriodZoom {
    Fixed { scale: f64 },
    /// Scale so the bubble's diameter covers `fill` of the shorter canvas side.
    Adaptive { fill: f64 },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LabelConfig {
    pub region_caption: String,
    pub period_caption: String,
    pub value_caption: String,
    pub short_value_caption: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    pub width: f64,
    pub height: f64,
    pub colors: Vec<String>, // Hex codes, one per period
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Market Milk Production in Switzerland".to_string(),
            input: InputConfig::default(),
            projection: ProjectionConfig::default(),
            bubbles: BubbleConfig::default(),
            zoom: ZoomConfig::default(),
            labels: LabelConfig::default(),
            chart: ChartConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            geometry: "https://raw.githubusercontent.com/codeforgermany/click_that_hood/main/public/data/switzerland.geojson".to_string(),
            metrics: "https://docs.google.com/spreadsheets/d/e/2PACX-1vQELzLSpDUjKWvcToht_3VNhHCiETLviN1GrrobguJzAMmMjPb5Gp_cF714rM_N3FqGuatY0LtbJTub/pub?gid=1278676072&single=true&output=csv".to_string(),
            name_property: "name".to_string(),
            region_column: "Canton".to_string(),
            periods: ["2021", "2022", "2023"]
                .iter()
                .map(|year| PeriodConfig {
                    label: year.to_string(),
                    column: format!("{}_Market_Milk_Tons", year),
                })
                .collect(),
            timeout_secs: 30,
        }
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { center: [8.2275, 46.8182], scale: 7000.0, width: 800.0, height: 600.0 }
    }
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self { max_radius: 30.0, padding: 3.0 }
    }
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            duration_ms: 750,
            small_bubble_radius: 20.0,
            small_bubble_scale: 20.0,
            large_bubble_scale: 4.0,
            period_zoom: PeriodZoom::Fixed { scale: 8.0 },
            scale_extent: [1.0, 10.0],
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            region_caption: "Canton".to_string(),
            period_caption: "Year".to_string(),
            value_caption: "Tons of Milk".to_string(),
            short_value_caption: "Tons".to_string(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 500.0,
            colors: vec!["#EA7DFF".to_string(), "#08f2db".to_string(), "#22113e".to_string()],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output") }
    }
}

impl ZoomConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.input.periods.is_empty(), "At least one period must be configured");
        ensure!(
            self.projection.width > 0.0 && self.projection.height > 0.0,
            "Projection canvas must have a positive size"
        );
        ensure!(self.projection.scale > 0.0, "Projection scale must be positive");
        ensure!(self.bubbles.max_radius > 0.0, "Bubble max_radius must be positive");
        ensure!(self.bubbles.padding >= 0.0, "Bubble padding cannot be negative");
        ensure!(self.zoom.duration_ms > 0, "Zoom duration must be positive");
        let [min_k, max_k] = self.zoom.scale_extent;
        ensure!(
            min_k > 0.0 && min_k <= max_k && max_k.is_finite(),
            "Zoom scale_extent must satisfy 0 < min <= max, got [{}, {}]",
            min_k,
            max_k
        );
        ensure!(
            self.chart.colors.len() >= self.input.periods.len(),
            "Chart needs {} colors, only {} configured",
            self.input.periods.len(),
            self.chart.colors.len()
        );
        match self.zoom.period_zoom {
            PeriodZoom::Fixed { scale } => ensure!(scale > 0.0, "Period zoom scale must be positive"),
            PeriodZoom::Adaptive { fill } => {
                ensure!(fill > 0.0 && fill <= 1.0, "Adaptive period zoom fill must be in (0, 1]")
            }
        }
        Ok(())
    }

    pub fn period_labels(&self) -> Vec<String> {
        self.input.periods.iter().map(|p| p.label.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_reference_instance() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.period_labels(), vec!["2021", "2022", "2023"]);
        assert_eq!(config.input.periods[1].column, "2022_Market_Milk_Tons");
        assert_eq!(config.projection.center, [8.2275, 46.8182]);
        assert_eq!(config.zoom.period_zoom, PeriodZoom::Fixed { scale: 8.0 });
        assert_eq!(config.zoom.duration(), Duration::from_millis(750));
        assert_eq!(config.zoom.scale_extent, [1.0, 10.0]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [zoom]
            duration_ms = 300
            period_zoom = { mode = "adaptive", fill = 0.5 }

            [output]
            dir = "site"
            "#,
        )
        .unwrap();
        assert_eq!(config.zoom.duration_ms, 300);
        assert_eq!(config.zoom.small_bubble_scale, 20.0);
        assert_eq!(config.zoom.period_zoom, PeriodZoom::Adaptive { fill: 0.5 });
        assert_eq!(config.output.dir, PathBuf::from("site"));
    }

    #[test]
    fn rejects_more_periods_than_colors() {
        let err = AppConfig::from_toml(
            r##"
            [chart]
            colors = ["#000000"]
            "##,
        )
        .unwrap_err();
        assert!(err.to_string().contains("colors"));
    }

    #[test]
    fn rejects_inverted_scale_extent() {
        let err = AppConfig::from_toml(
            r#"
            [zoom]
            scale_extent = [10.0, 1.0]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("scale_extent"));
    }

    #[test]
    fn rejects_empty_periods() {
        let err = AppConfig::from_toml(
            r#"
            [input]
            periods = []
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("period"));
    }

    #[test]
    fn bundled_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml");
        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.input.region_column, "Canton");
        assert_eq!(config.chart.colors.len(), 3);
    }
}
