use std::fs;
use std::path::{Path, PathBuf};

use querymetrics_core::error::{QueryMetricsError, Result};
use querymetrics_core::model::descriptor::{QueryDescriptor, QueryRecord};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Deserialize)]
struct QueriesFile {
    #[serde(default)]
    queries: Vec<QueryRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonQueries {
    List(Vec<QueryRecord>),
    Table(QueriesFile),
}

/// Loads query descriptors from a TOML or JSON file, or from every `*.toml`
/// and `*.json` file in a directory in name order.
///
/// The load is all-or-nothing: one invalid record fails the whole set before
/// any query runs.
pub fn load_descriptors(path: &Path) -> Result<Vec<QueryDescriptor>> {
    let files = if path.is_dir() {
        list_query_files(path)?
    } else if path.exists() {
        vec![path.to_path_buf()]
    } else {
        return Err(QueryMetricsError::Config(format!(
            "queries path {} does not exist",
            path.display()
        )));
    };

    let mut descriptors = Vec::new();
    for file in &files {
        let records = read_records(file)?;
        debug!(file = %file.display(), records = records.len(), "read query records");
        for (i, record) in records.into_iter().enumerate() {
            let descriptor = QueryDescriptor::try_from(record).map_err(|e| {
                QueryMetricsError::Config(format!("{} record {}: {e}", file.display(), i + 1))
            })?;
            descriptors.push(descriptor);
        }
    }

    if descriptors.is_empty() {
        warn!(path = %path.display(), "no queries configured");
    }
    warn_duplicate_names(&descriptors);
    info!(count = descriptors.len(), "loaded query descriptors");
    Ok(descriptors)
}

fn list_query_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    // The directory itself may contain glob metacharacters.
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    for ext in ["toml", "json"] {
        let pattern = Path::new(&base).join(format!("*.{ext}"));
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| QueryMetricsError::Config(format!("bad queries path {pattern}: {e}")))?;
        for entry in entries {
            let file = entry.map_err(|e| QueryMetricsError::Io(e.to_string()))?;
            if file.is_file() {
                files.push(file);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn read_records(file: &Path) -> Result<Vec<QueryRecord>> {
    let raw = fs::read_to_string(file)
        .map_err(|e| QueryMetricsError::Config(format!("read {}: {e}", file.display())))?;

    let is_json = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let parsed: JsonQueries = serde_json::from_str(&raw)
            .map_err(|e| QueryMetricsError::Config(format!("parse {}: {e}", file.display())))?;
        Ok(match parsed {
            JsonQueries::List(records) => records,
            JsonQueries::Table(table) => table.queries,
        })
    } else {
        let parsed: QueriesFile = toml::from_str(&raw)
            .map_err(|e| QueryMetricsError::Config(format!("parse {}: {e}", file.display())))?;
        Ok(parsed.queries)
    }
}

fn warn_duplicate_names(descriptors: &[QueryDescriptor]) {
    for (i, d) in descriptors.iter().enumerate() {
        if descriptors[..i].iter().any(|p| p.metric_name == d.metric_name) {
            warn!(metric = %d.metric_name, "metric name configured more than once");
        }
    }
}
