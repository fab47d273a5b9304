//! Prometheus text exposition of collected metric families.

use std::fmt::Write;

use crate::accumulator::MetricFamily;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render metric families in Prometheus text format, in the given order.
///
/// Families without samples still get their HELP and TYPE lines.
pub fn render(families: &[MetricFamily]) -> String {
    let mut output = String::with_capacity(families.len() * 128);

    for family in families {
        writeln!(
            output,
            "# HELP {} {}",
            family.name,
            escape_help(&family.help)
        )
        .ok();
        writeln!(output, "# TYPE {} {}", family.name, family.kind.as_str()).ok();

        for sample in &family.samples {
            let labels: Vec<(&str, &str)> = family
                .label_names
                .iter()
                .map(String::as_str)
                .zip(sample.labels.iter().map(String::as_str))
                .collect();
            writeln!(
                output,
                "{}{} {}",
                family.name,
                format_labels(&labels),
                sample.value
            )
            .ok();
        }
    }

    output
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// HELP text escapes only backslash and newline.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
