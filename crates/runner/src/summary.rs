use std::fmt;

use chrono::{DateTime, Utc};
use querymetrics_core::error::QueryMetricsError;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Progress of one descriptor through a pass. `Failed` may follow any of the
/// earlier states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorState {
    Pending,
    Queried,
    Transformed,
    Sent,
    Failed,
}

impl DescriptorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queried => "queried",
            Self::Transformed => "transformed",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DescriptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownQueryType,
    Backend,
    NoData,
    Schema,
    Send,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownQueryType => "unknown_query_type",
            Self::Backend => "backend",
            Self::NoData => "no_data",
            Self::Schema => "schema",
            Self::Send => "send",
            Self::Unexpected => "unexpected",
        }
    }
}

impl From<&QueryMetricsError> for FailureKind {
    fn from(err: &QueryMetricsError) -> Self {
        match err {
            QueryMetricsError::UnsupportedQueryType(_) => Self::UnknownQueryType,
            QueryMetricsError::Query(_) => Self::Backend,
            QueryMetricsError::Schema(_) => Self::Schema,
            QueryMetricsError::Send(_) => Self::Send,
            _ => Self::Unexpected,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorFailure {
    pub kind: FailureKind,
    /// Last state reached before the failure.
    pub stage: DescriptorState,
    pub context: String,
}

impl DescriptorFailure {
    pub fn from_error(stage: DescriptorState, err: &QueryMetricsError) -> Self {
        Self {
            kind: FailureKind::from(err),
            stage,
            context: err.to_string(),
        }
    }

    pub fn no_data() -> Self {
        Self {
            kind: FailureKind::NoData,
            stage: DescriptorState::Queried,
            context: "query returned no rows".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorOutcome {
    pub metric_name: String,
    pub state: DescriptorState,
    pub skipped_rows: usize,
    /// Number of points sent, or why the descriptor failed.
    pub result: Result<usize, DescriptorFailure>,
}

impl DescriptorOutcome {
    pub fn sent(metric_name: impl Into<String>, points: usize, skipped_rows: usize) -> Self {
        Self {
            metric_name: metric_name.into(),
            state: DescriptorState::Sent,
            skipped_rows,
            result: Ok(points),
        }
    }

    pub fn failed(
        metric_name: impl Into<String>,
        failure: DescriptorFailure,
        skipped_rows: usize,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            state: DescriptorState::Failed,
            skipped_rows,
            result: Err(failure),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure(&self) -> Option<&DescriptorFailure> {
        self.result.as_ref().err()
    }
}

impl Serialize for DescriptorOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("DescriptorOutcome", 5)?;
        s.serialize_field("metric_name", &self.metric_name)?;
        s.serialize_field("state", &self.state)?;
        s.serialize_field("skipped_rows", &self.skipped_rows)?;
        s.serialize_field("points_sent", &self.result.as_ref().ok())?;
        s.serialize_field("failure", &self.failure())?;
        s.end()
    }
}

/// Everything one pass did, one outcome per descriptor in input order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub sender: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<DescriptorOutcome>,
}

impl RunSummary {
    pub fn sent_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sent()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.sent_count()
    }

    pub fn points_sent(&self) -> usize {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()).sum()
    }

    pub fn skipped_rows(&self) -> usize {
        self.outcomes.iter().map(|o| o.skipped_rows).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DescriptorFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.failure().map(|f| (o.metric_name.as_str(), f)))
    }
}
