//! Field discovery over previously unseen API responses.
//!
//! Pure functions over parsed JSON, no I/O. Time-series responses yield the
//! latest record's OHLCV fields plus a derived `change`; anything else is
//! walked generically into a flat catalogue of dotted paths.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::provider::{
    field_description, strip_ordinal, CHANGE_KEY, CHANGE_PATH, SERIES_PATH_PREFIX,
};
use crate::schema::{ChartPoint, Field, ValueType};
use crate::shape::{
    number_value, ohlcv_point, parse_number, percent_change, record_number, ResponseShape,
    TimeSeries,
};

/// Nesting levels walked below the root for generic responses.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Array samples keep at most this many elements.
const ARRAY_SAMPLE_LEN: usize = 2;

/// Field catalogue plus, for time-series responses, every period as a chart point.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub fields: Vec<Field>,
    pub chart_data: Vec<ChartPoint>,
}

pub fn discover(raw: &Value) -> Result<Discovery, DiscoveryError> {
    discover_with_depth(raw, DEFAULT_MAX_DEPTH)
}

pub fn discover_with_depth(raw: &Value, max_depth: usize) -> Result<Discovery, DiscoveryError> {
    match ResponseShape::detect(raw) {
        ResponseShape::TimeSeries(series) => discover_series(&series),
        ResponseShape::Generic(value) => {
            let mut keys = KeyRegistry::default();
            let mut fields = Vec::new();
            walk(value, "", 0, max_depth, &mut keys, &mut fields);
            debug!("Generic discovery found {} fields", fields.len());
            Ok(Discovery {
                fields,
                chart_data: Vec::new(),
            })
        }
    }
}

fn discover_series(series: &TimeSeries<'_>) -> Result<Discovery, DiscoveryError> {
    let (_, latest) = series.latest().ok_or(DiscoveryError::NoTimeSeriesFound)?;

    // `change` is reserved for the derived field.
    let mut keys = KeyRegistry::default();
    keys.reserve(CHANGE_KEY);

    let mut fields = Vec::new();
    if let Some(record) = latest.as_object() {
        for (api_key, sample) in record {
            let name = strip_ordinal(api_key);
            let value_type = if parse_number(sample).is_some() {
                ValueType::Number
            } else {
                ValueType::of(sample)
            };
            fields.push(Field {
                key: keys.claim(&name, api_key),
                path: format!("{}{}", SERIES_PATH_PREFIX, api_key),
                value_type,
                sample: sample.clone(),
                description: Some(field_description(&name)),
            });
        }
    }

    let previous = series.older_than(0).map(|(_, record)| record);
    let change = percent_change(
        record_number(latest, "close"),
        previous.and_then(|record| record_number(record, "close")),
    );
    fields.push(Field {
        key: CHANGE_KEY.to_string(),
        path: CHANGE_PATH.to_string(),
        value_type: ValueType::Number,
        sample: number_value(change),
        description: Some(field_description(CHANGE_KEY)),
    });

    let chart_data = series
        .entries()
        .iter()
        .map(|(date, record)| ohlcv_point(date, record))
        .collect();

    debug!(
        "Time-series discovery on {:?}: {} fields over {} periods",
        series.key,
        fields.len(),
        series.len()
    );

    Ok(Discovery { fields, chart_data })
}

fn walk(
    value: &Value,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    keys: &mut KeyRegistry,
    out: &mut Vec<Field>,
) {
    if depth > max_depth {
        return;
    }

    // Arrays are leaves, except a root array whose items are walked by index.
    let children: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) if depth == 0 => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return,
    };

    for (key, child) in children {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        if child.is_object() {
            walk(child, &path, depth + 1, max_depth, keys, out);
            continue;
        }

        out.push(Field {
            key: keys.claim(&key, &path),
            value_type: ValueType::of(child),
            sample: sample_of(child),
            description: Some(format!("{} field", key)),
            path,
        });
    }
}

fn sample_of(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().take(ARRAY_SAMPLE_LEN).cloned().collect()),
        other => other.clone(),
    }
}

/// Hands out display keys unique within one discovery result.
#[derive(Default)]
struct KeyRegistry {
    taken: HashSet<String>,
}

impl KeyRegistry {
    fn reserve(&mut self, key: &str) {
        self.taken.insert(key.to_string());
    }

    /// `preferred` if free, else `fallback`, else `fallback#n`.
    fn claim(&mut self, preferred: &str, fallback: &str) -> String {
        for candidate in [preferred, fallback] {
            if self.taken.insert(candidate.to_string()) {
                return candidate.to_string();
            }
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}#{}", fallback, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
