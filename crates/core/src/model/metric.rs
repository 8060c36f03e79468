use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dimensions::Dimensions;
use crate::error::{QueryMetricsError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    pub ts: DateTime<Utc>,
    pub value: f64,
    pub dimensions: Dimensions,
}

impl MetricPoint {
    pub fn epoch_millis(&self) -> i64 {
        self.ts.timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
    CumulativeCounter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
            Self::CumulativeCounter => "cumulative_counter",
        }
    }
}

impl FromStr for MetricKind {
    type Err = QueryMetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            "cumulative_counter" | "cumulativecounter" => Ok(Self::CumulativeCounter),
            other => Err(QueryMetricsError::Parse(format!(
                "unknown metric type {other:?} (expected gauge, counter or cumulative_counter)"
            ))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
