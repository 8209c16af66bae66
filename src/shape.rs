//! Response shape detection.
//!
//! A raw response is classified exactly once into [`ResponseShape`]; discovery
//! and extraction both match on the result instead of probing keys again.

use crate::provider::{META_DATA_KEY, TIME_SERIES_KEYS};
use crate::schema::ChartPoint;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// The two response families the dashboard understands.
#[derive(Debug)]
pub enum ResponseShape<'a> {
    TimeSeries(TimeSeries<'a>),
    Generic(&'a Value),
}

/// A time-series bucket with its entries ordered newest first.
#[derive(Debug)]
pub struct TimeSeries<'a> {
    /// Matched bucket key. `None` when only the metadata marker was present.
    pub key: Option<&'static str>,
    entries: Vec<(&'a str, &'a Value)>,
}

impl<'a> ResponseShape<'a> {
    pub fn detect(raw: &'a Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self::Generic(raw);
        };

        let present = |key: &str| obj.get(key).is_some_and(is_truthy);
        if !present(META_DATA_KEY) && !TIME_SERIES_KEYS.iter().any(|k| present(*k)) {
            return Self::Generic(raw);
        }

        let matched = TIME_SERIES_KEYS
            .iter()
            .find_map(|k| obj.get(*k).filter(|v| is_truthy(v)).map(|v| (*k, v)));

        let series = match matched {
            Some((key, bucket)) => TimeSeries {
                key: Some(key),
                entries: newest_first(bucket),
            },
            None => TimeSeries {
                key: None,
                entries: Vec::new(),
            },
        };
        Self::TimeSeries(series)
    }
}

impl<'a> TimeSeries<'a> {
    /// All `(timestamp, record)` pairs, newest first.
    pub fn entries(&self) -> &[(&'a str, &'a Value)] {
        &self.entries
    }

    pub fn latest(&self) -> Option<(&'a str, &'a Value)> {
        self.entries.first().copied()
    }

    /// The entry immediately older than the one at `index`.
    pub fn older_than(&self, index: usize) -> Option<(&'a str, &'a Value)> {
        self.entries.get(index + 1).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// JavaScript-style truthiness, used for the provider marker checks.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn newest_first(bucket: &Value) -> Vec<(&str, &Value)> {
    let Some(obj) = bucket.as_object() else {
        return Vec::new();
    };
    let mut entries: Vec<(&str, &Value)> = obj.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by(|(a, _), (b, _)| compare_newest_first(a, b));
    entries
}

/// Calendar ordering, newest first. Unparseable stamps sort after parseable
/// ones; stamps naming the same instant fall back to their text.
fn compare_newest_first(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| b.cmp(a)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.cmp(a),
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc())
}

/// Numeric reading of a value. Provider records carry numbers as strings.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// JSON number for `n`, written as an integer when it has no fractional part.
pub fn number_value(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// First sub-value of a series record whose key contains `name`.
pub fn record_field<'v>(record: &'v Value, name: &str) -> Option<&'v Value> {
    record
        .as_object()?
        .iter()
        .find(|(k, _)| k.contains(name))
        .map(|(_, v)| v)
}

pub fn record_number(record: &Value, name: &str) -> Option<f64> {
    record_field(record, name).and_then(parse_number)
}

/// OHLCV point for one period, without a computed change.
pub fn ohlcv_point(date: &str, record: &Value) -> ChartPoint {
    ChartPoint {
        date: Some(date.to_string()),
        open: record_number(record, "open"),
        high: record_number(record, "high"),
        low: record_number(record, "low"),
        close: record_number(record, "close"),
        volume: record_number(record, "volume").map(f64::trunc),
        change: None,
    }
}

/// Percent change from `previous` to `current`; zero when either is missing.
pub fn percent_change(current: Option<f64>, previous: Option<f64>) -> f64 {
    match (current, previous) {
        (Some(current), Some(previous)) if previous != 0.0 => {
            (current - previous) / previous * 100.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_series_and_sorts_by_calendar() {
        let raw = json!({
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (5min)": {
                "2024-01-02 09:35:00": {"4. close": "1"},
                "2024-01-02 10:00:00": {"4. close": "2"},
                "2024-01-01 16:00:00": {"4. close": "3"}
            }
        });
        let ResponseShape::TimeSeries(series) = ResponseShape::detect(&raw) else {
            panic!("expected time series");
        };
        assert_eq!(series.key, Some("Time Series (5min)"));
        let dates: Vec<&str> = series.entries().iter().map(|(d, _)| *d).collect();
        assert_eq!(
            dates,
            vec!["2024-01-02 10:00:00", "2024-01-02 09:35:00", "2024-01-01 16:00:00"]
        );
    }

    #[test]
    fn test_mixed_granularity_orders_by_time() {
        let raw = json!({
            "Weekly Time Series": {
                "2024-01-05": {}, "2024-01-05 12:00:00": {}, "2023-12-29": {}
            }
        });
        let ResponseShape::TimeSeries(series) = ResponseShape::detect(&raw) else {
            panic!("expected time series");
        };
        assert_eq!(series.latest().unwrap().0, "2024-01-05 12:00:00");
        assert_eq!(series.older_than(1).unwrap().0, "2023-12-29");
    }

    #[test]
    fn test_same_instant_stamps_have_a_fixed_order() {
        let forward = json!({"Time Series (Daily)": {
            "2024-01-05": {}, "2024-01-05 00:00:00": {}, "2024-01-04": {}
        }});
        let backward = json!({"Time Series (Daily)": {
            "2024-01-04": {}, "2024-01-05 00:00:00": {}, "2024-01-05": {}
        }});

        let dates = |raw: &Value| -> Vec<String> {
            let ResponseShape::TimeSeries(series) = ResponseShape::detect(raw) else {
                panic!("expected time series");
            };
            series.entries().iter().map(|(d, _)| d.to_string()).collect()
        };
        let expected = vec!["2024-01-05 00:00:00", "2024-01-05", "2024-01-04"];
        assert_eq!(dates(&forward), expected);
        assert_eq!(dates(&backward), expected);
    }

    #[test]
    fn test_first_key_in_scan_order_wins() {
        let raw = json!({
            "Monthly Time Series": {"2024-01-31": {}},
            "Time Series (Daily)": {"2024-01-02": {}, "2024-01-01": {}}
        });
        let ResponseShape::TimeSeries(series) = ResponseShape::detect(&raw) else {
            panic!("expected time series");
        };
        assert_eq!(series.key, Some("Time Series (Daily)"));
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_metadata_only_is_series_without_entries() {
        let raw = json!({"Meta Data": {"1. Information": "x"}});
        match ResponseShape::detect(&raw) {
            ResponseShape::TimeSeries(series) => {
                assert!(series.key.is_none());
                assert!(series.is_empty());
            }
            ResponseShape::Generic(_) => panic!("expected time series"),
        }
    }

    #[test]
    fn test_null_marker_is_generic() {
        let raw = json!({"Time Series (Daily)": null, "price": 3});
        assert!(matches!(ResponseShape::detect(&raw), ResponseShape::Generic(_)));
        assert!(matches!(ResponseShape::detect(&json!([1, 2])), ResponseShape::Generic(_)));
    }

    #[test]
    fn test_number_helpers() {
        assert_eq!(parse_number(&json!("11.50")), Some(11.5));
        assert_eq!(parse_number(&json!(7)), Some(7.0));
        assert_eq!(parse_number(&json!("n/a")), None);
        assert_eq!(number_value(10.0), json!(10));
        assert_eq!(number_value(2.5), json!(2.5));
    }

    #[test]
    fn test_percent_change_defaults_to_zero() {
        assert!((percent_change(Some(11.0), Some(10.0)) - 10.0).abs() < 1e-9);
        assert_eq!(percent_change(Some(11.0), None), 0.0);
        assert_eq!(percent_change(None, Some(10.0)), 0.0);
        assert_eq!(percent_change(Some(11.0), Some(0.0)), 0.0);
    }

    #[test]
    fn test_record_field_matches_by_substring() {
        let record = json!({"1. open": "1", "4. close": "2", "5. adjusted close": "3"});
        assert_eq!(record_number(&record, "close"), Some(2.0));
        assert_eq!(record_number(&record, "volume"), None);
    }
}
