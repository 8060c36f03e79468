use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueryMetricsError, Result};

pub type Dimensions = BTreeMap<String, String>;

/// Static dimensions attached to every emitted point, parsed once at startup
/// from a `key=value,key=value` string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraDimensions(Dimensions);

impl ExtraDimensions {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut out = Dimensions::new();
        for entry in raw.split(',') {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(QueryMetricsError::Config(format!(
                    "extra dimension {trimmed:?} must use key=value syntax"
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(QueryMetricsError::Config(
                    "extra dimension key cannot be empty".to_string(),
                ));
            }
            out.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self(out))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl fmt::Display for ExtraDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Merges query-derived dimensions with the static extra dimensions.
///
/// Row dimensions are applied first and extra dimensions second, so an extra
/// dimension replaces a row dimension with the same key.
pub fn merge_dimensions(row: Dimensions, extra: &ExtraDimensions) -> Dimensions {
    let mut merged = row;
    for (k, v) in extra.iter() {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
