//! Grouped bar chart: one group per record, one bar per period.

use crate::config::AppConfig;
use crate::render::escape;
use crate::table::format_grouped;
use crate::types::Dataset;
use std::fmt::Write;
use tracing::warn;

const MARGIN_TOP: f64 = 20.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 100.0;
const MARGIN_LEFT: f64 = 50.0;
const TICK_COUNT: usize = 10;
const FALLBACK_COLOR: &str = "#EA7DFF";

/// Evenly spaced bands with matching inner and outer padding, centred in the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandScale {
    start: f64,
    step: f64,
    bandwidth: f64,
}

impl BandScale {
    pub fn new(count: usize, range: (f64, f64), padding: f64) -> Self {
        let n = count as f64;
        let extent = range.1 - range.0;
        let step = extent / (n - padding + padding * 2.0).max(1.0);
        let start = range.0 + (extent - step * (n - padding)) * 0.5;
        Self { start, step, bandwidth: step * (1.0 - padding) }
    }

    pub fn position(&self, index: usize) -> f64 {
        self.start + self.step * index as f64
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }
}

const E10: f64 = 7.0710678118654755; // sqrt(50)
const E5: f64 = 3.1622776601683795; // sqrt(10)
const E2: f64 = std::f64::consts::SQRT_2;

/// Tick step for roughly `count` ticks over `[start, stop]`. Negative results
/// encode the reciprocal of a fractional step.
fn tick_increment(start: f64, stop: f64, count: usize) -> f64 {
    let step = (stop - start) / count.max(1) as f64;
    let power = step.log10().floor();
    let error = step / 10f64.powf(power);
    let factor = if error >= E10 {
        10.0
    } else if error >= E5 {
        5.0
    } else if error >= E2 {
        2.0
    } else {
        1.0
    };
    if power >= 0.0 {
        factor * 10f64.powf(power)
    } else {
        -(10f64.powf(-power)) / factor
    }
}

/// Extends `[0, max]` so both ends fall on round tick values.
pub fn nice_max(max: f64, count: usize) -> f64 {
    if !(max > 0.0) || !max.is_finite() {
        return 1.0;
    }
    let (mut start, mut stop) = (0.0, max);
    let mut previous = None;
    for _ in 0..10 {
        let step = tick_increment(start, stop, count);
        if previous == Some(step) {
            break;
        }
        if step > 0.0 {
            start = (start / step).floor() * step;
            stop = (stop / step).ceil() * step;
        } else if step < 0.0 {
            start = (start * step).ceil() / step;
            stop = (stop * step).floor() / step;
        } else {
            break;
        }
        previous = Some(step);
    }
    stop
}

pub fn ticks(start: f64, stop: f64, count: usize) -> Vec<f64> {
    let inc = tick_increment(start, stop, count);
    if !inc.is_finite() || inc == 0.0 {
        return Vec::new();
    }
    if inc > 0.0 {
        let (i0, i1) = ((start / inc).ceil() as i64, (stop / inc).floor() as i64);
        (i0..=i1).map(|i| i as f64 * inc).collect()
    } else {
        let (i0, i1) = ((start * -inc).ceil() as i64, (stop * -inc).floor() as i64);
        (i0..=i1).map(|i| i as f64 / -inc).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub group: usize,
    pub period: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub tooltip: String,
}

#[derive(Debug, Clone)]
pub struct ChartLayout {
    pub inner_width: f64,
    pub inner_height: f64,
    pub y_max: f64,
    pub groups: BandScale,
    pub bars: Vec<Bar>,
    pub y_ticks: Vec<(f64, f64)>,
}

pub fn layout_chart(dataset: &Dataset, config: &AppConfig) -> ChartLayout {
    let inner_width = config.chart.width - MARGIN_LEFT - MARGIN_RIGHT;
    let inner_height = config.chart.height - MARGIN_TOP - MARGIN_BOTTOM;

    let groups = BandScale::new(dataset.records.len(), (0.0, inner_width), 0.2);
    let periods = BandScale::new(dataset.periods.len(), (0.0, groups.bandwidth()), 0.1);
    let y_max = nice_max(dataset.max_value().unwrap_or(0.0), TICK_COUNT);
    let y = |v: f64| inner_height - v / y_max * inner_height;

    let mut bars = Vec::new();
    for (g, record) in dataset.records.iter().enumerate() {
        for (p, value) in record.values().iter().enumerate() {
            if !value.value.is_finite() {
                warn!("Skipping bar for '{}' {}: value is not a number", record.name, value.label);
                continue;
            }
            let top = y(value.value.max(0.0));
            bars.push(Bar {
                group: g,
                period: p,
                x: periods.position(p),
                y: top,
                width: periods.bandwidth(),
                height: inner_height - top,
                tooltip: format!(
                    "{}: {}, {}: {}",
                    config.labels.period_caption,
                    value.label,
                    config.labels.short_value_caption,
                    format_grouped(value.value)
                ),
            });
        }
    }

    let y_ticks = ticks(0.0, y_max, TICK_COUNT).into_iter().map(|t| (t, y(t))).collect();

    ChartLayout { inner_width, inner_height, y_max, groups, bars, y_ticks }
}

/// Fill for the `index`-th period, cycling through the palette.
fn period_color(colors: &[String], index: usize) -> &str {
    if colors.is_empty() {
        return FALLBACK_COLOR;
    }
    &colors[index % colors.len()]
}

pub fn render_bar_chart(dataset: &Dataset, config: &AppConfig) -> String {
    let layout = layout_chart(dataset, config);
    let colors = &config.chart.colors;
    let mut s = String::with_capacity(16 * 1024);

    let _ = writeln!(
        s,
        r#"<svg id="bar-chart" xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = config.chart.width,
        h = config.chart.height
    );
    s.push_str("  <style>.bar:hover { opacity: 0.8; } .tick text { font-size: 10px; }</style>\n");
    let _ = writeln!(s, r#"  <g transform="translate({},{})">"#, MARGIN_LEFT, MARGIN_TOP);

    // x axis
    let _ = writeln!(s, r#"    <g class="x-axis" transform="translate(0,{:.2})">"#, layout.inner_height);
    let _ = writeln!(s, r#"      <path class="domain" stroke="currentColor" d="M0.5,6V0.5H{:.2}V6"/>"#, layout.inner_width);
    for (g, record) in dataset.records.iter().enumerate() {
        let cx = layout.groups.position(g) + layout.groups.bandwidth() / 2.0;
        let _ = writeln!(
            s,
            r#"      <g class="tick" transform="translate({:.2},0)"><line stroke="currentColor" y2="6"/><text y="9" dy="0.71em" transform="rotate(-45)" text-anchor="end">{}</text></g>"#,
            cx,
            escape(&record.name)
        );
    }
    s.push_str("    </g>\n");

    // y axis
    s.push_str("    <g class=\"y-axis\">\n");
    let _ = writeln!(s, r#"      <path class="domain" stroke="currentColor" d="M-6,{:.2}H0.5V0.5H-6"/>"#, layout.inner_height);
    for (value, y) in &layout.y_ticks {
        let _ = writeln!(
            s,
            r#"      <g class="tick" transform="translate(0,{:.2})"><line stroke="currentColor" x2="-6"/><text x="-9" dy="0.32em" text-anchor="end">{}</text></g>"#,
            y,
            format_grouped(*value)
        );
    }
    s.push_str("    </g>\n");

    // bars, grouped per record
    for (g, _) in dataset.records.iter().enumerate() {
        let _ = writeln!(s, r#"    <g class="bar-group" transform="translate({:.2},0)">"#, layout.groups.position(g));
        for bar in layout.bars.iter().filter(|b| b.group == g) {
            let _ = writeln!(
                s,
                r#"      <rect class="bar" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"><title>{}</title></rect>"#,
                bar.x,
                bar.y,
                bar.width,
                bar.height,
                period_color(colors, bar.period),
                escape(&bar.tooltip)
            );
        }
        s.push_str("    </g>\n");
    }

    // legend
    let _ = writeln!(
        s,
        r#"    <g class="legend" transform="translate({:.2},{:.2})">"#,
        layout.inner_width - 100.0,
        -MARGIN_TOP
    );
    for (i, period) in dataset.periods.iter().enumerate() {
        let _ = writeln!(
            s,
            r#"      <rect x="0" y="{}" width="15" height="15" fill="{}"/><text x="20" y="{}" font-size="12px" alignment-baseline="middle">{}</text>"#,
            i * 20,
            period_color(colors, i),
            i * 20 + 12,
            escape(period)
        );
    }
    s.push_str("    </g>\n");

    s.push_str("  </g>\n</svg>\n");
    s
}
