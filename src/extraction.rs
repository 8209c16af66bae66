//! Widget data extraction.
//!
//! [`extract`] shapes a parsed response for one widget type; [`Extractor`]
//! pairs it with the outbound fetch used by widget refreshes.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtractionError;
use crate::provider::CHANGE_KEY;
use crate::schema::{ChartPoint, ChartSeries, ExtractedData, Field, TableRows, WidgetType};
use crate::shape::{
    number_value, ohlcv_point, parse_number, percent_change, record_field, record_number,
    ResponseShape, TimeSeries,
};
use crate::source::{check_provider_markers, DataSource};

/// Most recent periods included in table rows and chart points.
pub const SERIES_WINDOW: usize = 20;

/// Fetches a widget endpoint and shapes the response.
#[derive(Clone)]
pub struct Extractor {
    source: Arc<dyn DataSource>,
}

impl Extractor {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    pub async fn extract(
        &self,
        endpoint: &str,
        fields: &[Field],
        widget_type: WidgetType,
    ) -> Result<ExtractedData, ExtractionError> {
        let raw = self.source.fetch_json(endpoint).await?;
        check_provider_markers(&raw)?;
        Ok(extract(&raw, fields, widget_type))
    }
}

/// Shape `raw` for `widget_type` using the selected fields. Fields that cannot
/// be resolved are left out rather than failing the whole extraction.
pub fn extract(raw: &Value, fields: &[Field], widget_type: WidgetType) -> ExtractedData {
    match ResponseShape::detect(raw) {
        ResponseShape::TimeSeries(series) if series.is_empty() => {
            debug!("Time-series response without periods; returning empty {:?}", widget_type);
            ExtractedData::empty(widget_type)
        }
        ResponseShape::TimeSeries(series) => match widget_type {
            WidgetType::Card => ExtractedData::Record(series_card(&series, fields)),
            WidgetType::Table => ExtractedData::Table(TableRows {
                stocks: series_rows(&series, fields),
            }),
            WidgetType::Chart => ExtractedData::Chart(ChartSeries {
                chart_data: series_points(&series),
            }),
        },
        ResponseShape::Generic(value) => match widget_type {
            WidgetType::Card => ExtractedData::Record(generic_record(value, fields)),
            // No notion of a series without a recognized time-series shape.
            WidgetType::Table | WidgetType::Chart => ExtractedData::empty(widget_type),
        },
    }
}

/// Resolve a dotted path. Numeric segments index into arrays.
pub fn resolve_path<'v>(raw: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(raw, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn series_card(series: &TimeSeries<'_>, fields: &[Field]) -> Map<String, Value> {
    let mut record = Map::new();
    let Some((_, latest)) = series.latest() else {
        return record;
    };

    for field in fields {
        if field.key == CHANGE_KEY {
            record.insert(field.key.clone(), number_value(change_at(series, 0)));
        } else if let Some(value) = period_value(latest, &field.key) {
            record.insert(field.key.clone(), value);
        }
    }

    // Card consumers read either name.
    if let Some(close) = record.get("close").cloned() {
        record.insert("price".to_string(), close);
    }
    record
}

fn series_rows(series: &TimeSeries<'_>, fields: &[Field]) -> Vec<Map<String, Value>> {
    series
        .entries()
        .iter()
        .take(SERIES_WINDOW)
        .enumerate()
        .map(|(index, (date, period))| {
            let mut row = Map::new();
            row.insert("date".to_string(), Value::String(date.to_string()));
            for field in fields {
                if field.key == CHANGE_KEY {
                    row.insert(field.key.clone(), number_value(change_at(series, index)));
                } else if let Some(value) = period_value(period, &field.key) {
                    row.insert(field.key.clone(), value);
                }
            }
            row
        })
        .collect()
}

/// The newest window of periods, returned oldest first.
fn series_points(series: &TimeSeries<'_>) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = series
        .entries()
        .iter()
        .take(SERIES_WINDOW)
        .enumerate()
        .map(|(index, (date, period))| ChartPoint {
            change: Some(change_at(series, index)),
            ..ohlcv_point(date, period)
        })
        .collect();
    points.reverse();
    points
}

/// Percent change of the period at `index` against the next older period.
fn change_at(series: &TimeSeries<'_>, index: usize) -> f64 {
    let current = series
        .entries()
        .get(index)
        .and_then(|(_, period)| record_number(period, "close"));
    let previous = series
        .older_than(index)
        .and_then(|(_, period)| record_number(period, "close"));
    percent_change(current, previous)
}

fn period_value(period: &Value, key: &str) -> Option<Value> {
    if key == "date" {
        return None;
    }
    let value = record_field(period, key)?;
    Some(match parse_number(value) {
        Some(n) => number_value(n),
        None => value.clone(),
    })
}

fn generic_record(raw: &Value, fields: &[Field]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| {
            resolve_path(raw, &field.path).map(|value| (field.key.clone(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::discover;
    use crate::provider::default_ohlcv_fields;
    use crate::schema::ValueType;
    use serde_json::json;

    fn daily() -> Value {
        json!({
            "Time Series (Daily)": {
                "2024-01-02": {"1. open":"10","2. high":"12","3. low":"9","4. close":"11","5. volume":"100"},
                "2024-01-01": {"1. open":"9","2. high":"10","3. low":"8","4. close":"10","5. volume":"90"}
            }
        })
    }

    fn long_series(days: u32) -> Value {
        let mut bucket = Map::new();
        for day in 1..=days {
            let close = 100.0 + day as f64;
            bucket.insert(
                format!("2024-03-{:02}", day),
                json!({"1. open": "100", "2. high": "130", "3. low": "90",
                       "4. close": close.to_string(), "5. volume": "1000"}),
            );
        }
        json!({"Time Series (Daily)": bucket})
    }

    fn field(key: &str, path: &str) -> Field {
        Field {
            key: key.to_string(),
            path: path.to_string(),
            value_type: ValueType::Number,
            sample: Value::Null,
            description: None,
        }
    }

    #[test]
    fn test_card_from_discovered_fields() {
        let raw = daily();
        let fields = discover(&raw).unwrap().fields;
        let ExtractedData::Record(card) = extract(&raw, &fields, WidgetType::Card) else {
            panic!("expected record");
        };
        assert_eq!(
            Value::Object(card),
            json!({"open": 10, "high": 12, "low": 9, "close": 11, "volume": 100, "change": 10, "price": 11})
        );
    }

    #[test]
    fn test_card_change_is_zero_without_previous_period() {
        let raw = json!({"Time Series (Daily)": {"2024-01-02": {"4. close": "11"}}});
        let fields = vec![field("close", "timeSeries.4. close"), field("change", "calculated.change")];
        let ExtractedData::Record(card) = extract(&raw, &fields, WidgetType::Card) else {
            panic!("expected record");
        };
        assert_eq!(card["change"], json!(0));
        assert_eq!(card["price"], json!(11));
    }

    #[test]
    fn test_card_without_close_has_no_price() {
        let raw = daily();
        let fields = vec![field("open", "timeSeries.1. open"), field("missing", "x")];
        let ExtractedData::Record(card) = extract(&raw, &fields, WidgetType::Card) else {
            panic!("expected record");
        };
        assert_eq!(Value::Object(card), json!({"open": 10}));
    }

    #[test]
    fn test_table_rows_newest_first_with_per_row_change() {
        let raw = long_series(25);
        let mut fields = default_ohlcv_fields();
        fields.push(field("change", "calculated.change"));
        let ExtractedData::Table(table) = extract(&raw, &fields, WidgetType::Table) else {
            panic!("expected table");
        };
        assert_eq!(table.stocks.len(), SERIES_WINDOW);
        assert_eq!(table.stocks[0]["date"], json!("2024-03-25"));
        assert_eq!(table.stocks[0]["close"], json!(125));

        let expected = (125.0 - 124.0) / 124.0 * 100.0;
        let change = table.stocks[0]["change"].as_f64().unwrap();
        assert!((change - expected).abs() < 1e-9);

        // The last row in the window still compares against the older period.
        let last = table.stocks.last().unwrap();
        assert_eq!(last["date"], json!("2024-03-06"));
        assert!(last["change"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_chart_points_ascending_and_windowed() {
        let raw = long_series(25);
        let ExtractedData::Chart(chart) = extract(&raw, &[], WidgetType::Chart) else {
            panic!("expected chart");
        };
        assert_eq!(chart.chart_data.len(), SERIES_WINDOW);
        let dates: Vec<&str> = chart
            .chart_data
            .iter()
            .map(|p| p.date.as_deref().unwrap())
            .collect();
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(dates.first(), Some(&"2024-03-06"));
        assert_eq!(dates.last(), Some(&"2024-03-25"));

        let newest = chart.chart_data.last().unwrap();
        assert_eq!(newest.close, Some(125.0));
        assert_eq!(newest.volume, Some(1000.0));
    }

    #[test]
    fn test_chart_shorter_than_window() {
        let raw = daily();
        let ExtractedData::Chart(chart) = extract(&raw, &[], WidgetType::Chart) else {
            panic!("expected chart");
        };
        assert_eq!(chart.chart_data.len(), 2);
        assert_eq!(chart.chart_data[0].date.as_deref(), Some("2024-01-01"));
        assert_eq!(chart.chart_data[0].change, Some(0.0));
        assert!((chart.chart_data[1].change.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_generic_card_resolves_paths() {
        let raw = json!({"data": {"quote": {"price": 42.5}}, "items": [{"id": 7}]});
        let fields = vec![
            field("price", "data.quote.price"),
            field("first", "items.0.id"),
            field("gone", "data.missing.price"),
        ];
        let ExtractedData::Record(card) = extract(&raw, &fields, WidgetType::Card) else {
            panic!("expected record");
        };
        assert_eq!(Value::Object(card), json!({"price": 42.5, "first": 7}));
    }

    #[test]
    fn test_generic_table_and_chart_are_empty() {
        let raw = json!({"price": 1});
        let fields = vec![field("price", "price")];
        assert!(extract(&raw, &fields, WidgetType::Table).is_empty());
        assert!(extract(&raw, &fields, WidgetType::Chart).is_empty());
    }

    #[test]
    fn test_metadata_only_series_is_empty() {
        let raw = json!({"Meta Data": {"2. Symbol": "IBM"}});
        let data = extract(&raw, &default_ohlcv_fields(), WidgetType::Card);
        assert_eq!(data, ExtractedData::empty(WidgetType::Card));
    }
}
