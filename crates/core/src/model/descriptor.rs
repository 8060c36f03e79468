use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QueryMetricsError, Result};
use crate::model::metric::MetricKind;

pub const LOG_ANALYTICS_QUERY_TYPE: &str = "log_analytics";
pub const RESOURCE_GRAPH_QUERY_TYPE: &str = "resource_graph";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    LogAnalytics,
    ResourceGraph,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogAnalytics => LOG_ANALYTICS_QUERY_TYPE,
            Self::ResourceGraph => RESOURCE_GRAPH_QUERY_TYPE,
        }
    }
}

impl FromStr for QueryType {
    type Err = QueryMetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            LOG_ANALYTICS_QUERY_TYPE => Ok(Self::LogAnalytics),
            RESOURCE_GRAPH_QUERY_TYPE => Ok(Self::ResourceGraph),
            other => Err(QueryMetricsError::UnsupportedQueryType(other.to_string())),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration record as stored upstream, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRecord {
    #[serde(rename = "MetricName", default)]
    pub metric_name: Option<String>,
    #[serde(rename = "MetricType", default)]
    pub metric_type: Option<String>,
    #[serde(rename = "Query", default)]
    pub query: Option<String>,
    #[serde(rename = "QueryType", default)]
    pub query_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    pub metric_name: String,
    pub metric_type: MetricKind,
    pub query: String,
    /// Kept raw: an unknown value fails only this descriptor at dispatch.
    pub query_type: String,
}

impl QueryDescriptor {
    pub fn new(metric_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            metric_type: MetricKind::Gauge,
            query: query.into(),
            query_type: LOG_ANALYTICS_QUERY_TYPE.to_string(),
        }
    }

    pub fn with_metric_type(mut self, kind: MetricKind) -> Self {
        self.metric_type = kind;
        self
    }

    pub fn with_query_type(mut self, query_type: impl Into<String>) -> Self {
        self.query_type = query_type.into();
        self
    }

    pub fn resolve_query_type(&self) -> Result<QueryType> {
        self.query_type.parse()
    }
}

impl TryFrom<QueryRecord> for QueryDescriptor {
    type Error = QueryMetricsError;

    fn try_from(record: QueryRecord) -> Result<Self> {
        let metric_name = non_empty(record.metric_name).ok_or_else(|| {
            QueryMetricsError::Config("query record is missing a non-empty MetricName".to_string())
        })?;
        let query = non_empty(record.query).ok_or_else(|| {
            QueryMetricsError::Config(format!(
                "query record {metric_name} is missing a non-empty Query"
            ))
        })?;
        let metric_type = match non_empty(record.metric_type) {
            Some(raw) => raw.parse::<MetricKind>().map_err(|e| {
                QueryMetricsError::Config(format!("query record {metric_name}: {e}"))
            })?,
            None => MetricKind::default(),
        };
        let query_type = non_empty(record.query_type)
            .unwrap_or_else(|| LOG_ANALYTICS_QUERY_TYPE.to_string());

        Ok(Self {
            metric_name,
            metric_type,
            query,
            query_type,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: Option<&str>, query: Option<&str>) -> QueryRecord {
        QueryRecord {
            metric_name: name.map(str::to_string),
            query: query.map(str::to_string),
            ..QueryRecord::default()
        }
    }

    #[test]
    fn record_defaults_to_gauge_and_log_analytics() {
        let d = QueryDescriptor::try_from(record(Some("az.errors"), Some("AppRequests"))).unwrap();
        assert_eq!(d.metric_type, MetricKind::Gauge);
        assert_eq!(d.resolve_query_type().unwrap(), QueryType::LogAnalytics);
    }

    #[test]
    fn record_requires_name_and_query() {
        assert!(matches!(
            QueryDescriptor::try_from(record(None, Some("q"))),
            Err(QueryMetricsError::Config(_))
        ));
        assert!(matches!(
            QueryDescriptor::try_from(record(Some("m"), Some("  "))),
            Err(QueryMetricsError::Config(_))
        ));
    }

    #[test]
    fn record_rejects_unknown_metric_type() {
        let mut rec = record(Some("m"), Some("q"));
        rec.metric_type = Some("histogram".to_string());
        assert!(matches!(
            QueryDescriptor::try_from(rec),
            Err(QueryMetricsError::Config(_))
        ));
    }

    #[test]
    fn unknown_query_type_survives_until_dispatch() {
        let mut rec = record(Some("m"), Some("q"));
        rec.query_type = Some("cosmos".to_string());
        let d = QueryDescriptor::try_from(rec).unwrap();
        assert!(matches!(
            d.resolve_query_type(),
            Err(QueryMetricsError::UnsupportedQueryType(t)) if t == "cosmos"
        ));
    }

    #[test]
    fn record_uses_upstream_field_names() {
        let rec: QueryRecord = serde_json::from_str(
            r#"{"MetricName":"vm.count","MetricType":"counter","Query":"Resources | count","QueryType":"resource_graph"}"#,
        )
        .unwrap();
        let d = QueryDescriptor::try_from(rec).unwrap();
        assert_eq!(d.metric_type, MetricKind::Counter);
        assert_eq!(d.resolve_query_type().unwrap(), QueryType::ResourceGraph);
    }
}
