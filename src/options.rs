//! Job configuration.
//!
//! Options can come from serde (`{"maxDepth": 3, "excludePrefix": "_dds"}`) or from a scope
//! string of comma-separated `KEY=value` pairs, the way map/reduce jobs are usually launched from
//! a shell:
//!
//! ```
//! # use schema_variety::JobOptions;
//! # fn main() -> schema_variety::Result<()> {
//! let opts = JobOptions::from_scope("MAXDEPTH=3,FILTER=_dds")?;
//! assert_eq!(opts.max_depth(), 3);
//! assert_eq!(opts.exclude_prefix(), Some("_dds"));
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{Flattener, Timestamp, Value, DEFAULT_MAX_DEPTH};

/// Scope key holding the depth budget.
pub const MAX_DEPTH_KEY: &str = "MAXDEPTH";
/// Scope key holding the exclusion prefix.
pub const FILTER_KEY: &str = "FILTER";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct JobOptions {
    max_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclude_prefix: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            exclude_prefix: None,
        }
    }
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Skip paths starting with `prefix`. An empty prefix clears the filter.
    pub fn with_exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.exclude_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn exclude_prefix(&self) -> Option<&str> {
        self.exclude_prefix.as_deref()
    }

    /// Build the flattener these options describe.
    pub fn flattener(&self) -> Flattener {
        let flattener = Flattener::new(self.max_depth);
        match self.exclude_prefix {
            Some(ref prefix) => flattener.exclude_prefix(prefix.as_str()),
            None => flattener,
        }
    }

    /// Read options out of a scope string. Keys other than `MAXDEPTH` and `FILTER` are ignored.
    ///
    /// `FILTER` is taken as written, so prefixes like `2024` or `true` stay plain text.
    pub fn from_scope(scope: &str) -> Result<JobOptions> {
        let mut opts = JobOptions::default();
        for (key, raw) in scope_pairs(scope)? {
            match key {
                MAX_DEPTH_KEY => {
                    let depth = parse_scope_value(raw);
                    let depth = depth
                        .as_i64()
                        .filter(|d| *d >= 0)
                        .ok_or_else(|| {
                            Error::BadOption(format!(
                                "{} must be a non-negative integer, got {:?}",
                                MAX_DEPTH_KEY, depth
                            ))
                        })?;
                    opts.max_depth = usize::try_from(depth).map_err(|_| {
                        Error::BadOption(format!("{} is too large: {}", MAX_DEPTH_KEY, depth))
                    })?;
                }
                FILTER_KEY => opts = opts.with_exclude_prefix(raw),
                _ => (),
            }
        }
        Ok(opts)
    }
}

/// Split a scope string of `KEY=value` pairs and type each value.
///
/// Values are tried as an integer, a float, a date, and a boolean, in that order, and kept as a
/// string if none of those fit. Blank pairs are skipped. A later pair replaces an earlier one
/// with the same key.
pub fn parse_scope(scope: &str) -> Result<BTreeMap<String, Value>> {
    Ok(scope_pairs(scope)?
        .into_iter()
        .map(|(key, raw)| (key.to_string(), parse_scope_value(raw)))
        .collect())
}

/// Trimmed `(key, raw value)` pairs, in the order written.
fn scope_pairs(scope: &str) -> Result<Vec<(&str, &str)>> {
    let mut out = Vec::new();
    for pair in scope.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::BadOption(format!("expected KEY=value, got {:?}", pair)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::BadOption(format!("missing key in {:?}", pair)));
        }
        out.push((key, value.trim()));
    }
    Ok(out)
}

fn parse_scope_value(raw: &str) -> Value {
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int(v);
    }
    // Keep words like "inf" and "NaN" as strings
    if raw.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
        if let Ok(v) = raw.parse::<f64>() {
            return Value::F64(v);
        }
    }
    if let Some(t) = Timestamp::parse(raw) {
        return Value::Timestamp(t);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(raw.to_string()),
    }
}
