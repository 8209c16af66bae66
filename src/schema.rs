//! Dashboard data model: discovered fields, widgets and extracted payloads.
//!
//! Field names serialize in camelCase so exported dashboards stay readable by
//! the browser front end. Aliases accept records written by older exports.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Runtime type of a field's sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Boolean,
    Array,
    Object,
    Null,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::Null => Self::Null,
        }
    }
}

/// A discovered, displayable unit of data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Display identifier, unique within one discovery result.
    pub key: String,
    /// Dotted lookup path into the raw response, or a `calculated.` marker.
    #[serde(alias = "apiPath")]
    pub path: String,
    #[serde(alias = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub sample: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    /// Path prefix marking a derived field that extraction computes.
    pub const CALCULATED_PREFIX: &'static str = "calculated.";

    pub fn is_calculated(&self) -> bool {
        self.path.starts_with(Self::CALCULATED_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Table,
    Card,
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Candlestick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInterval {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Watchlist,
    Gainers,
    Performance,
    Financial,
}

/// Per-widget settings. Only the entries relevant to the widget type are read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Refresh period in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<TimeInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<CardType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
}

impl WidgetConfig {
    pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

    pub fn effective_refresh_interval(&self) -> u64 {
        self.refresh_interval
            .filter(|ms| *ms > 0)
            .unwrap_or(Self::DEFAULT_REFRESH_INTERVAL_MS)
    }
}

/// Grid placement, owned by the layout collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// A configured visual unit and its most recent fetch state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub endpoint: String,
    pub selected_fields: Vec<Field>,
    pub config: WidgetConfig,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractedData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<u64>,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Stored form of a [`Widget`]. `data` stays raw until the widget type is known.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetRecord {
    id: String,
    #[serde(rename = "type")]
    widget_type: WidgetType,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(alias = "apiEndpoint")]
    endpoint: String,
    #[serde(default)]
    selected_fields: Vec<Field>,
    #[serde(default)]
    config: WidgetConfig,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    last_updated: Option<u64>,
    #[serde(default)]
    is_loading: bool,
    #[serde(default)]
    error: Option<String>,
}

impl<'de> Deserialize<'de> for Widget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = WidgetRecord::deserialize(deserializer)?;
        let data = record
            .data
            .filter(|value| !value.is_null())
            .map(|value| ExtractedData::from_value(record.widget_type, value))
            .transpose()
            .map_err(de::Error::custom)?;
        Ok(Self {
            id: record.id,
            widget_type: record.widget_type,
            title: record.title,
            description: record.description,
            endpoint: record.endpoint,
            selected_fields: record.selected_fields,
            config: record.config,
            position: record.position,
            data,
            last_updated: record.last_updated,
            is_loading: record.is_loading,
            error: record.error,
        })
    }
}

/// Widget as submitted by the configuration flow, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDraft {
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "apiEndpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub selected_fields: Vec<Field>,
    #[serde(default)]
    pub config: WidgetConfig,
    #[serde(default)]
    pub position: Position,
}

impl WidgetDraft {
    pub fn into_widget(self, id: String) -> Widget {
        Widget {
            id,
            widget_type: self.widget_type,
            title: self.title,
            description: self.description,
            endpoint: self.endpoint,
            selected_fields: self.selected_fields,
            config: self.config,
            position: self.position,
            data: None,
            last_updated: None,
            is_loading: false,
            error: None,
        }
    }
}

/// Shallow update of a widget's user-editable settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "apiEndpoint")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub selected_fields: Option<Vec<Field>>,
    #[serde(default)]
    pub config: Option<WidgetConfig>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl WidgetPatch {
    /// Replace each top-level setting present in the patch.
    pub fn apply(self, widget: &mut Widget) {
        if let Some(title) = self.title {
            widget.title = title;
        }
        if let Some(description) = self.description {
            widget.description = Some(description);
        }
        if let Some(endpoint) = self.endpoint {
            widget.endpoint = endpoint;
        }
        if let Some(fields) = self.selected_fields {
            widget.selected_fields = fields;
        }
        if let Some(config) = self.config {
            widget.config = config;
        }
        if let Some(position) = self.position {
            widget.position = position;
        }
    }
}

/// One chart-ready period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    #[serde(rename = "chartData")]
    pub chart_data: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRows {
    pub stocks: Vec<Map<String, Value>>,
}

/// Payload shaped for one widget type. Serializes as the bare payload; reading
/// one back needs the widget type, see [`ExtractedData::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedData {
    Chart(ChartSeries),
    Table(TableRows),
    Record(Map<String, Value>),
}

impl ExtractedData {
    /// Parse a stored payload as the variant `widget_type` produces. A card's
    /// record may hold any keys, `chartData` and `stocks` included.
    pub fn from_value(widget_type: WidgetType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match widget_type {
            WidgetType::Card => Self::Record(serde_json::from_value(value)?),
            WidgetType::Table => Self::Table(serde_json::from_value(value)?),
            WidgetType::Chart => Self::Chart(serde_json::from_value(value)?),
        })
    }

    pub fn empty(widget_type: WidgetType) -> Self {
        match widget_type {
            WidgetType::Card => Self::Record(Map::new()),
            WidgetType::Table => Self::Table(TableRows { stocks: Vec::new() }),
            WidgetType::Chart => Self::Chart(ChartSeries {
                chart_data: Vec::new(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Chart(series) => series.chart_data.is_empty(),
            Self::Table(rows) => rows.stocks.is_empty(),
            Self::Record(record) => record.is_empty(),
        }
    }
}
