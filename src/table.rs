use crate::config::AppConfig;
use crate::render::escape;
use crate::types::Dataset;
use std::fmt::Write;

/// Formats a number with thousands separators and at most three fraction
/// digits (`1234567.891` → `1,234,567.891`). Non-finite values print as
/// `NaN` or `∞`.
pub fn format_grouped(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞".to_string() } else { "-∞".to_string() };
    }

    let fixed = format!("{:.3}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let is_zero = int_part.chars().all(|c| c == '0') && frac_part.is_empty();
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

/// One row per joined record, matched or not.
pub fn render_table(dataset: &Dataset, config: &AppConfig) -> String {
    let mut html = String::new();
    html.push_str("<table id=\"data-table\">\n  <thead>\n    <tr>");
    let _ = write!(html, "<th>{}</th>", escape(&config.labels.region_caption));
    for period in &dataset.periods {
        let _ = write!(html, "<th>{}</th>", escape(period));
    }
    html.push_str("</tr>\n  </thead>\n  <tbody>\n");

    for record in &dataset.records {
        html.push_str("    <tr>");
        let _ = write!(html, "<td>{}</td>", escape(&record.name));
        for value in record.values() {
            let _ = write!(html, "<td>{}</td>", format_grouped(value.value));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("  </tbody>\n</table>\n");
    html
}
