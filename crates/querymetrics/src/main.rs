mod output;
mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use querymetrics_core::config::Config;
use querymetrics_core::dimensions::ExtraDimensions;
use querymetrics_core::model::descriptor::QueryType;
use querymetrics_core::model::table::TabularResult;
use querymetrics_core::time::parse_duration_str;
use querymetrics_core::transform::transform;
use querymetrics_query::{Backends, QueryBackend};
use querymetrics_runner::{Orchestrator, ensure_backends, load_descriptors};
use querymetrics_sink::{MetricsSender, SinkConfig, build_sender};
use tokio::time::MissedTickBehavior;

use crate::output::{
    CheckReport, print_check_human, print_json, print_points_human, print_summary_human,
};
use crate::telemetry::{init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "querymetrics")]
#[command(about = "Run Azure analytic queries and forward the results as metrics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Config file (defaults to $QUERYMETRICS_CONFIG)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Query every descriptor and send the metrics")]
    Run {
        #[command(flatten)]
        overrides: CliOverrides,
        #[arg(long, help = "Repeat the pass on this period (e.g. 5m) until ctrl-c")]
        every: Option<String>,
    },
    #[command(about = "Validate configuration and queries without sending")]
    Check {
        #[command(flatten)]
        overrides: CliOverrides,
    },
    #[command(about = "Transform a JSON query result file into metric points")]
    Transform {
        file: PathBuf,
        #[arg(long)]
        extra_dimensions: Option<String>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct CliOverrides {
    #[arg(long)]
    queries: Option<PathBuf>,
    #[arg(long)]
    workspace_id: Option<String>,
    #[arg(long)]
    subscription_id: Option<String>,
    #[arg(long)]
    extra_dimensions: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { overrides, every } => {
            init_run_tracing();
            let result = run_command(cli.config.as_deref(), overrides, every, cli.json).await;
            shutdown_tracing();
            result
        }
        Commands::Check { overrides } => {
            init_cli_tracing();
            check_command(cli.config.as_deref(), overrides, cli.json)
        }
        Commands::Transform {
            file,
            extra_dimensions,
        } => {
            init_cli_tracing();
            transform_command(&file, extra_dimensions, cli.json)
        }
    }
}

fn load_config(path: Option<&Path>, overrides: CliOverrides) -> anyhow::Result<Config> {
    let mut cfg = Config::load_with(path).context("load config")?;
    if let Some(v) = overrides.queries {
        cfg.queries_path = v;
    }
    if let Some(v) = overrides.workspace_id {
        cfg.log_analytics_workspace_id = Some(v);
    }
    if let Some(v) = overrides.subscription_id {
        cfg.subscription_id = Some(v);
    }
    if let Some(v) = overrides.extra_dimensions {
        cfg.extra_dimensions = ExtraDimensions::parse(&v).context("parse --extra-dimensions")?;
    }
    Ok(cfg)
}

async fn run_command(
    config_path: Option<&Path>,
    overrides: CliOverrides,
    every: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let every = every
        .map(|v| parse_duration_str(&v))
        .transpose()
        .context("parse --every")?;
    if every.is_some_and(|p| p.is_zero()) {
        anyhow::bail!("--every must be greater than zero");
    }
    let cfg = load_config(config_path, overrides)?;
    tracing::info!(extra_dimensions = %cfg.extra_dimensions, "starting job");

    let descriptors = load_descriptors(&cfg.queries_path).context("load query descriptors")?;
    let backends = Backends::from_config(&cfg).context("configure query backends")?;
    ensure_backends(&backends, &descriptors)?;
    let sink = SinkConfig::from_config(&cfg);
    let orchestrator = Orchestrator::new(&backends, &cfg.extra_dimensions);

    let Some(period) = every else {
        let mut sender = build_sender(&sink).context("select metrics backend")?;
        let summary = orchestrator.run_pass(&mut sender, &descriptors).await;
        return print_summary(&summary, json);
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break;
            }
        }
        let mut sender = build_sender(&sink).context("select metrics backend")?;
        let summary = orchestrator.run_pass(&mut sender, &descriptors).await;
        print_summary(&summary, json)?;
    }
    Ok(())
}

fn check_command(
    config_path: Option<&Path>,
    overrides: CliOverrides,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = load_config(config_path, overrides)?;
    let descriptors = load_descriptors(&cfg.queries_path).context("load query descriptors")?;
    let backends = Backends::from_config(&cfg).context("configure query backends")?;
    ensure_backends(&backends, &descriptors)?;
    let mut sender = build_sender(&SinkConfig::from_config(&cfg)).context("select metrics backend")?;
    let sender_name = sender.backend_name();
    sender.close();

    let report = CheckReport {
        queries_path: cfg.queries_path.display().to_string(),
        descriptors: descriptors.len(),
        sender: sender_name.to_string(),
        log_analytics: backends.supports(QueryType::LogAnalytics),
        resource_graph: backends.supports(QueryType::ResourceGraph),
        extra_dimensions: cfg.extra_dimensions.to_string(),
        unknown_query_types: descriptors
            .iter()
            .filter(|d| d.resolve_query_type().is_err())
            .map(|d| format!("{} ({})", d.metric_name, d.query_type))
            .collect(),
    };

    if json {
        print_json(&report)
    } else {
        print_check_human(&report);
        Ok(())
    }
}

fn transform_command(file: &Path, extra: Option<String>, json: bool) -> anyhow::Result<()> {
    let extra = extra
        .map(|v| ExtraDimensions::parse(&v))
        .transpose()
        .context("parse --extra-dimensions")?
        .unwrap_or_default();
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read {}", file.display()))?;
    let table = parse_table(&raw).with_context(|| format!("parse {}", file.display()))?;

    let transformed = transform(table, &extra)?;
    if json {
        print_json(&transformed.points)
    } else {
        print_points_human(&transformed.points, transformed.skipped_rows);
        Ok(())
    }
}

/// Accepts a bare table or a Log Analytics response, whose first table is used.
fn parse_table(raw: &str) -> anyhow::Result<TabularResult> {
    let mut value: serde_json::Value = serde_json::from_str(raw)?;
    if let Some(tables) = value.get_mut("tables").and_then(|t| t.as_array_mut()) {
        if tables.is_empty() {
            return Ok(TabularResult::default());
        }
        return Ok(serde_json::from_value(tables.swap_remove(0))?);
    }
    Ok(serde_json::from_value(value)?)
}

fn print_summary(summary: &querymetrics_runner::RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(summary);
    }
    print_summary_human(summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_table_accepts_both_shapes() {
        let bare = r#"{"columns":[{"name":"timestamp"},{"name":"metric_value"}],"rows":[["2024-01-01T00:00:00Z",1]]}"#;
        assert_eq!(parse_table(bare).unwrap().rows.len(), 1);

        let wrapped = format!(r#"{{"tables":[{bare}]}}"#);
        assert_eq!(parse_table(&wrapped).unwrap().columns.len(), 2);

        assert!(parse_table(r#"{"tables":[]}"#).unwrap().is_empty());
        assert!(parse_table("not json").is_err());
    }

    #[test]
    fn cli_overrides_replace_loaded_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "subscription_id = \"from-file\"\n").unwrap();

        let cfg = load_config(
            Some(path.as_path()),
            CliOverrides {
                subscription_id: Some("from-flag".to_string()),
                extra_dimensions: Some("env=prod".to_string()),
                ..CliOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(cfg.subscription_id.as_deref(), Some("from-flag"));
        assert_eq!(cfg.extra_dimensions.get("env"), Some("prod"));
    }

    #[test]
    fn missing_explicit_config_file_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/qm.toml")), CliOverrides::default()).is_err());
    }
}
