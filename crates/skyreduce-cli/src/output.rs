//! CLI output formatting.

use std::time::Duration;

use skyreduce_core::model::QualityReport;
use skyreduce_orchestration::report::RunReport;

/// Format a duration for display.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 0.001 {
        format!("{:.2}µs", secs * 1_000_000.0)
    } else if secs < 1.0 {
        format!("{:.2}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.3}s")
    } else {
        let mins = (secs / 60.0).floor() as u64;
        let remaining = secs - (mins as f64 * 60.0);
        format!("{mins}m{remaining:.1}s")
    }
}

/// Format a millisecond count, as stored in run reports.
#[must_use]
pub fn format_millis(ms: f64) -> String {
    format_duration(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
}

/// Format a byte count with a binary unit.
#[must_use]
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Format a number with thousand separators.
#[must_use]
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Label/value rows for an image quality report.
#[must_use]
pub fn quality_rows(quality: &QualityReport) -> Vec<(&'static str, String)> {
    vec![
        ("shape", format!("{} x {}", quality.shape.0, quality.shape.1)),
        ("max", format!("{:.6e}", quality.max)),
        ("min", format!("{:.6e}", quality.min)),
        ("maxabs", format!("{:.6e}", quality.maxabs)),
        ("rms", format!("{:.6e}", quality.rms)),
        ("sum", format!("{:.6e}", quality.sum)),
        ("medianabs", format!("{:.6e}", quality.medianabs)),
    ]
}

/// Pretty JSON rendering of a run report.
pub fn report_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
