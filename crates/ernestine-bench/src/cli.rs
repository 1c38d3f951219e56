use crate::bench::{Report, Summary};
use colored::Colorize;
use std::time::Duration;

pub const CHART_WIDTH: usize = 140;
pub const CHART_HEIGHT: usize = 10;

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Renders per-operation latency as a bar chart, one column per operation.
/// Runs longer than `width` are folded so each column shows the slowest
/// operation of its slice.
pub fn render_chart(durations: &[Duration], width: usize, height: usize) -> Vec<String> {
    if durations.is_empty() || width == 0 || height == 0 {
        return Vec::new();
    }

    let per_column = durations.len().div_ceil(width);
    let columns: Vec<f64> = durations
        .chunks(per_column)
        .map(|chunk| chunk.iter().copied().map(millis).fold(0.0, f64::max))
        .collect();
    let top = columns.iter().copied().fold(0.0, f64::max);
    let scale = if top > 0.0 { top } else { 1.0 };

    let bar_heights: Vec<usize> = columns
        .iter()
        .map(|&v| {
            let h = (v / scale * height as f64).ceil() as usize;
            h.clamp(usize::from(v > 0.0), height)
        })
        .collect();

    let mut lines = Vec::with_capacity(height + 2);
    for row in (1..=height).rev() {
        let label = if row == height {
            format!("{:>9.2}ms", top)
        } else {
            " ".repeat(11)
        };
        let bars: String = bar_heights
            .iter()
            .map(|&h| if h >= row { '█' } else { ' ' })
            .collect();
        lines.push(format!("{} │{}", label, bars));
    }
    lines.push(format!("{:>9.2}ms └{}", 0.0, "─".repeat(columns.len())));
    lines.push(format!(
        "{} 1..{} (ops per column: {})",
        " ".repeat(13),
        durations.len(),
        per_column
    ));
    lines
}

pub fn print_report(operation: &str, report: &Report) {
    let Some(mean) = report.mean() else {
        tracing::warn!(operation, "No operations were run.");
        return;
    };

    tracing::info!(
        "{} operations in {:?} ({:.2} op/s, {:?}/op)",
        report.count(),
        report.total,
        report.ops_per_second(),
        mean
    );

    println!();
    println!("{}", format!("{} latency", operation).bright_white().bold());
    for line in render_chart(&report.durations, CHART_WIDTH, CHART_HEIGHT) {
        println!("{}", line.bright_purple());
    }
    println!();

    if let Some(Summary { p50, p90, p99, max }) = Summary::from_durations(&report.durations) {
        tracing::info!("p50={:?} p90={:?} p99={:?} max={:?}", p50, p90, p99, max);
    }
}
