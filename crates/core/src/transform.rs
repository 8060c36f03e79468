use serde_json::Value;
use tracing::{debug, warn};

use crate::dimensions::{Dimensions, ExtraDimensions, merge_dimensions};
use crate::error::{QueryMetricsError, Result};
use crate::model::metric::MetricPoint;
use crate::model::table::TabularResult;
use crate::time::parse_timestamp;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const METRIC_VALUE_COLUMN: &str = "metric_value";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformed {
    pub points: Vec<MetricPoint>,
    pub skipped_rows: usize,
}

/// Turns a query result into metric points.
///
/// The `timestamp` and `metric_value` columns are mandatory; every other
/// column becomes a dimension, in column order, with `extra` overlaid on top.
/// Rows that cannot be parsed are skipped and counted; schema problems fail the
/// whole result.
pub fn transform(result: TabularResult, extra: &ExtraDimensions) -> Result<Transformed> {
    if result.rows.is_empty() {
        return Ok(Transformed::default());
    }

    result.ensure_unique_columns()?;
    let layout = RowLayout::resolve(&result)?;

    let expected_len = result.columns.len();
    let mut points = Vec::with_capacity(result.rows.len());
    let mut skipped_rows = 0;

    for (idx, row) in result.rows.into_iter().enumerate() {
        if row.len() != expected_len {
            warn!(
                row = idx,
                len = row.len(),
                expected = expected_len,
                "skipping malformed row"
            );
            skipped_rows += 1;
            continue;
        }

        match layout.point(row, extra) {
            Ok(point) => points.push(point),
            Err(err) => {
                warn!(row = idx, error = %err, "skipping unparsable row");
                skipped_rows += 1;
            }
        }
    }

    debug!(
        points = points.len(),
        skipped = skipped_rows,
        "transformed query result"
    );
    Ok(Transformed {
        points,
        skipped_rows,
    })
}

struct RowLayout {
    ts_idx: usize,
    value_idx: usize,
    /// `(column index, dimension name)` for every non-mandatory column.
    dimensions: Vec<(usize, String)>,
}

impl RowLayout {
    fn resolve(result: &TabularResult) -> Result<Self> {
        let (Some(ts_idx), Some(value_idx)) = (
            result.column_index(TIMESTAMP_COLUMN),
            result.column_index(METRIC_VALUE_COLUMN),
        ) else {
            return Err(QueryMetricsError::Schema(format!(
                "columns {TIMESTAMP_COLUMN:?} and {METRIC_VALUE_COLUMN:?} must exist in the query result (got {:?})",
                result.column_names().collect::<Vec<_>>()
            )));
        };

        let dimensions = result
            .columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != ts_idx && *idx != value_idx)
            .map(|(idx, col)| (idx, col.name.clone()))
            .collect();

        Ok(Self {
            ts_idx,
            value_idx,
            dimensions,
        })
    }

    fn point(&self, mut row: Vec<Value>, extra: &ExtraDimensions) -> Result<MetricPoint> {
        let ts = parse_timestamp(&row[self.ts_idx])?;
        let value = parse_metric_value(&row[self.value_idx])?;

        let mut dims = Dimensions::new();
        for (idx, name) in &self.dimensions {
            if let Some(rendered) = render_dimension(row[*idx].take()) {
                dims.insert(name.clone(), rendered);
            }
        }

        Ok(MetricPoint {
            ts,
            value,
            dimensions: merge_dimensions(dims, extra),
        })
    }
}

pub fn parse_metric_value(value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(QueryMetricsError::RowParse(format!(
            "metric_value must be numeric, got {value}"
        ))),
    }
}

/// `None` means the cell carries no dimension (JSON null).
fn render_dimension(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
