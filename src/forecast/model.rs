// src/forecast/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GeoJSON point. Coordinates keep the upstream attribute order `[lt, ln]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn point(first: f64, second: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [first, second],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayForecast {
    /// Weekday abbreviation, e.g. "Mon".
    pub day: String,
    pub value: i64,
}

/// One monitoring site's multi-day forecast. Keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub name: String,
    pub updated: DateTime<Utc>,
    pub location: GeoPoint,
    pub forecast: Vec<DayForecast>,
}

pub const SUMMARY_KEY: &str = "latest";

/// Sections extracted from the free-text summary report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tomorrow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlook: Option<String>,
}

/// Singleton document (`type = "latest"`) holding the newest summary report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    #[serde(rename = "type")]
    pub kind: String,
    /// Remote file name the summary was read from.
    pub name: String,
    #[serde(flatten)]
    pub parsed: ParsedSummary,
    pub updated: DateTime<Utc>,
}

impl SummaryRecord {
    pub fn latest(name: impl Into<String>, parsed: ParsedSummary, updated: DateTime<Utc>) -> Self {
        Self {
            kind: SUMMARY_KEY.to_string(),
            name: name.into(),
            parsed,
            updated,
        }
    }
}
