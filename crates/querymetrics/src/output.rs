use std::io::IsTerminal;

use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use querymetrics_core::model::metric::MetricPoint;
use querymetrics_runner::RunSummary;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub queries_path: String,
    pub descriptors: usize,
    pub sender: String,
    pub log_analytics: bool,
    pub resource_graph: bool,
    pub extra_dimensions: String,
    pub unknown_query_types: Vec<String>,
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_summary_human(summary: &RunSummary) {
    let color = std::io::stdout().is_terminal();
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(points) => {
                println!(
                    "{:<6} {} points={} skipped_rows={}",
                    paint_ok("sent", color),
                    outcome.metric_name,
                    points,
                    outcome.skipped_rows
                );
            }
            Err(failure) => {
                println!(
                    "{:<6} {} kind={} stage={} | {}",
                    paint_err("failed", color),
                    outcome.metric_name,
                    failure.kind,
                    failure.stage,
                    failure.context
                );
            }
        }
    }
    println!(
        "-- run {} via {}: {} sent, {} failed, {} points ({}ms) --",
        summary.run_id,
        summary.sender,
        summary.sent_count(),
        summary.failed_count(),
        summary.points_sent(),
        (summary.finished_at - summary.started_at).num_milliseconds()
    );
}

pub fn print_check_human(report: &CheckReport) {
    println!("queries_path={}", report.queries_path);
    println!("descriptors={}", report.descriptors);
    println!("sender={}", report.sender);
    println!(
        "log_analytics={} resource_graph={}",
        report.log_analytics, report.resource_graph
    );
    if !report.extra_dimensions.is_empty() {
        println!("extra_dimensions={}", report.extra_dimensions);
    }
    for name in &report.unknown_query_types {
        println!("warning: {name} has an unknown query type and will fail at run time");
    }
}

pub fn print_points_human(points: &[MetricPoint], skipped_rows: usize) {
    for point in points {
        let dims = point
            .dimensions
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{} value={} {}",
            point.ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            point.value,
            dims
        );
    }
    println!("-- {} points ({} rows skipped) --", points.len(), skipped_rows);
}

fn paint_ok(label: &str, color: bool) -> String {
    if color {
        label.green().to_string()
    } else {
        label.to_string()
    }
}

fn paint_err(label: &str, color: bool) -> String {
    if color {
        label.red().bold().to_string()
    } else {
        label.to_string()
    }
}
