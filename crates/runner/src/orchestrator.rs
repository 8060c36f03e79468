use std::any::Any;
use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::FutureExt;
use querymetrics_core::dimensions::ExtraDimensions;
use querymetrics_core::error::{QueryMetricsError, Result};
use querymetrics_core::model::descriptor::QueryDescriptor;
use querymetrics_core::transform::transform;
use querymetrics_query::QueryBackend;
use querymetrics_sink::MetricsSender;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::summary::{
    DescriptorFailure, DescriptorOutcome, DescriptorState, FailureKind, RunSummary,
};

/// Runs descriptors one at a time: query, transform, send. A failing
/// descriptor is recorded and the pass moves on to the next one.
pub struct Orchestrator<'a, B> {
    backend: &'a B,
    extra: &'a ExtraDimensions,
}

impl<'a, B: QueryBackend> Orchestrator<'a, B> {
    pub fn new(backend: &'a B, extra: &'a ExtraDimensions) -> Self {
        Self { backend, extra }
    }

    /// One pass over `descriptors`. Always yields one outcome per descriptor,
    /// and always closes `sender` before returning. A panic while processing
    /// a descriptor is recorded as an unexpected failure for that descriptor.
    pub async fn run_pass<S: MetricsSender>(
        &self,
        sender: &mut S,
        descriptors: &[QueryDescriptor],
    ) -> RunSummary {
        let run_id = Uuid::new_v4();
        let backend_name = sender.backend_name();
        let span = info_span!(
            "run_pass",
            %run_id,
            sender = backend_name,
            descriptors = descriptors.len()
        );
        let started_at = Utc::now();

        let shared: &S = sender;
        let outcomes = async {
            info!("starting pass");
            let mut outcomes = Vec::with_capacity(descriptors.len());
            for descriptor in descriptors {
                let span = info_span!("descriptor", metric = %descriptor.metric_name);
                let outcome = AssertUnwindSafe(self.process(shared, descriptor))
                    .catch_unwind()
                    .instrument(span.clone())
                    .await
                    .unwrap_or_else(|panic| {
                        let err = QueryMetricsError::Internal(panic_message(panic.as_ref()));
                        span.in_scope(|| {
                            error!(error_kind = err.kind(), error = %err, "descriptor panicked");
                        });
                        failed(&descriptor.metric_name, DescriptorState::Pending, &err, 0)
                    });
                outcomes.push(outcome);
            }
            outcomes
        }
        .instrument(span.clone())
        .await;

        sender.close();

        let summary = RunSummary {
            run_id,
            sender: backend_name.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        span.in_scope(|| {
            info!(
                sent = summary.sent_count(),
                failed = summary.failed_count(),
                points = summary.points_sent(),
                skipped_rows = summary.skipped_rows(),
                "pass finished"
            );
        });
        summary
    }

    async fn process<S: MetricsSender>(
        &self,
        sender: &S,
        descriptor: &QueryDescriptor,
    ) -> DescriptorOutcome {
        let name = descriptor.metric_name.as_str();

        let query_type = match descriptor.resolve_query_type() {
            Ok(t) => t,
            Err(err) => {
                error!(query_type = %descriptor.query_type, "unknown query type for metric {name}");
                return failed(name, DescriptorState::Pending, &err, 0);
            }
        };

        info!(%query_type, "querying and sending metric {name}");
        debug!(query = %descriptor.query, "executing query");
        let table = match self.backend.run_query(query_type, &descriptor.query).await {
            Ok(table) => table,
            Err(err) => {
                error!(error_kind = err.kind(), error = %err, "error while running {query_type} query for {name}");
                return failed(name, DescriptorState::Pending, &err, 0);
            }
        };

        if table.is_empty() {
            warn!("no result for metric {name}");
            return DescriptorOutcome::failed(name, DescriptorFailure::no_data(), 0);
        }
        debug!(rows = table.rows.len(), "found data for metric {name}");

        let rows = table.rows.len();
        let transformed = match transform(table, self.extra) {
            Ok(t) => t,
            Err(err) => {
                error!(error_kind = err.kind(), error = %err, "cannot build metrics for {name}");
                return failed(name, DescriptorState::Queried, &err, 0);
            }
        };
        let skipped = transformed.skipped_rows;
        if skipped > 0 {
            warn!(skipped, rows, "some rows were not usable for metric {name}");
        }
        if transformed.points.is_empty() {
            warn!("every row was skipped for metric {name}");
            let failure = DescriptorFailure {
                kind: FailureKind::NoData,
                stage: DescriptorState::Transformed,
                context: format!("all {rows} rows were skipped"),
            };
            return DescriptorOutcome::failed(name, failure, skipped);
        }

        let count = transformed.points.len();
        match sender
            .send_metrics(name, descriptor.metric_type, transformed.points)
            .await
        {
            Ok(()) => {
                info!(points = count, "metric {name} successfully sent");
                DescriptorOutcome::sent(name, count, skipped)
            }
            Err(err) => {
                error!(error_kind = err.kind(), error = %err, "failed to send metric {name}");
                failed(name, DescriptorState::Transformed, &err, skipped)
            }
        }
    }
}

fn failed(
    name: &str,
    stage: DescriptorState,
    err: &QueryMetricsError,
    skipped_rows: usize,
) -> DescriptorOutcome {
    DescriptorOutcome::failed(name, DescriptorFailure::from_error(stage, err), skipped_rows)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

/// Fails when a descriptor names a known query type whose backend is not
/// configured. Unknown query types are left to fail at dispatch.
pub fn ensure_backends<B: QueryBackend>(backend: &B, descriptors: &[QueryDescriptor]) -> Result<()> {
    let missing: Vec<String> = descriptors
        .iter()
        .filter_map(|d| {
            let query_type = d.resolve_query_type().ok()?;
            (!backend.supports(query_type)).then(|| format!("{} ({query_type})", d.metric_name))
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(QueryMetricsError::Config(format!(
            "no backend configured for: {}",
            missing.join(", ")
        )))
    }
}
