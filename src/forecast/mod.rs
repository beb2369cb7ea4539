// src/forecast/mod.rs
//! Artifact records and the pure parsers that produce them.

pub mod model;
pub mod summary;
pub mod xml;

pub use model::{DayForecast, ForecastRecord, GeoPoint, ParsedSummary, SummaryRecord, SUMMARY_KEY};
pub use summary::parse_summary_txt;
pub use xml::parse_forecast_xml;
