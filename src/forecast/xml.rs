// src/forecast/xml.rs
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use super::model::{DayForecast, ForecastRecord, GeoPoint};
use crate::error::{SyncError, SyncResult};

/// Maximum number of forecast days kept per site.
pub const MAX_FORECAST_DAYS: usize = 5;

#[derive(Debug, Deserialize)]
struct DefraAirQuality {
    #[serde(rename = "site", default)]
    site: Vec<Site>,
}

#[derive(Debug, Deserialize)]
struct Site {
    #[serde(rename = "@lc")]
    lc: Option<String>,
    #[serde(rename = "@yr")]
    yr: Option<String>,
    #[serde(rename = "@mon")]
    mon: Option<String>,
    #[serde(rename = "@dayn")]
    dayn: Option<String>,
    #[serde(rename = "@hr")]
    hr: Option<String>,
    #[serde(rename = "@lt")]
    lt: Option<String>,
    #[serde(rename = "@ln")]
    ln: Option<String>,
    #[serde(rename = "day", default)]
    day: Vec<Day>,
}

#[derive(Debug, Deserialize)]
struct Day {
    #[serde(rename = "@aq")]
    aq: Option<String>,
}

/// Parse the daily `DEFRAAirQuality` XML feed into one record per site.
pub fn parse_forecast_xml(bytes: &[u8]) -> SyncResult<Vec<ForecastRecord>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SyncError::Parse(format!("forecast xml is not UTF-8: {e}")))?;
    let doc: DefraAirQuality =
        from_str(text).map_err(|e| SyncError::Parse(format!("forecast xml: {e}")))?;

    let mut out = Vec::with_capacity(doc.site.len());
    for site in doc.site {
        let Some(name) = site.lc.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::debug!("skipping forecast site without lc attribute");
            continue;
        };
        out.push(site_to_record(name, &site)?);
    }
    Ok(out)
}

fn site_to_record(name: &str, site: &Site) -> SyncResult<ForecastRecord> {
    let year: i32 = attr_num(name, "yr", site.yr.as_deref())?;
    let month: u32 = attr_num(name, "mon", site.mon.as_deref())?;
    let day: u32 = attr_num(name, "dayn", site.dayn.as_deref())?;
    // hr arrives as "12" or "1200"; only the hour digits matter.
    let hr_raw = site.hr.as_deref().unwrap_or_default().trim();
    let hour: u32 = attr_num(name, "hr", Some(hr_raw.get(..2).unwrap_or(hr_raw)))?;

    let base = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            SyncError::Parse(format!(
                "site {name}: invalid base date {year}-{month}-{day}T{hour}"
            ))
        })?;

    let lat: f64 = attr_num(name, "lt", site.lt.as_deref())?;
    let lon: f64 = attr_num(name, "ln", site.ln.as_deref())?;

    let forecast = site
        .day
        .iter()
        .take(MAX_FORECAST_DAYS)
        .enumerate()
        .map(|(i, d)| {
            let value: i64 = attr_num(name, "aq", d.aq.as_deref())?;
            Ok(DayForecast {
                day: (base + Duration::days(i as i64)).format("%a").to_string(),
                value,
            })
        })
        .collect::<SyncResult<Vec<_>>>()?;

    Ok(ForecastRecord {
        name: name.to_string(),
        updated: base,
        location: GeoPoint::point(lat, lon),
        forecast,
    })
}

fn attr_num<T>(site: &str, attr: &str, raw: Option<&str>) -> SyncResult<T>
where
    T: std::str::FromStr,
{
    let raw = raw
        .map(str::trim)
        .ok_or_else(|| SyncError::Parse(format!("site {site}: missing attribute {attr}")))?;
    raw.parse::<T>()
        .map_err(|_| SyncError::Parse(format!("site {site}: attribute {attr}={raw:?} is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_SITE: &str = r#"
        <DEFRAAirQuality>
          <site lc="TestLocation" yr="2025" mon="06" dayn="04" hr="12" lt="51.5" ln="-0.1">
            <day aq="2"/>
          </site>
        </DEFRAAirQuality>
    "#;

    #[test]
    fn parses_single_site() {
        let out = parse_forecast_xml(ONE_SITE.as_bytes()).unwrap();
        assert_eq!(out.len(), 1);
        let r = &out[0];
        assert_eq!(r.name, "TestLocation");
        assert_eq!(r.updated, Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap());
        assert_eq!(r.location, GeoPoint::point(51.5, -0.1));
        assert_eq!(
            r.forecast,
            vec![DayForecast {
                day: "Wed".into(),
                value: 2
            }]
        );
    }

    #[test]
    fn days_interleaved_with_other_elements_are_all_kept() {
        let xml = r#"
            <DEFRAAirQuality>
              <site lc="A" yr="2025" mon="06" dayn="04" hr="00" lt="1" ln="2">
                <day aq="1"/><note/><day aq="2"/>
              </site>
              <issued/>
              <site lc="B" yr="2025" mon="06" dayn="04" hr="00" lt="3" ln="4">
                <day aq="7"/>
              </site>
            </DEFRAAirQuality>
        "#;
        let out = parse_forecast_xml(xml.as_bytes()).unwrap();
        assert_eq!(out.len(), 2);
        let values: Vec<_> = out[0].forecast.iter().map(|d| d.value).collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(out[1].name, "B");
    }

    #[test]
    fn keeps_at_most_five_days_with_rolling_weekdays() {
        let xml = r#"
            <DEFRAAirQuality>
              <site lc="A" yr="2025" mon="06" dayn="04" hr="1200" lt="1" ln="2">
                <day aq="1"/><day aq="2"/><day aq="3"/><day aq="4"/><day aq="5"/><day aq="6"/>
              </site>
            </DEFRAAirQuality>
        "#;
        let out = parse_forecast_xml(xml.as_bytes()).unwrap();
        let days: Vec<_> = out[0].forecast.iter().map(|d| d.day.as_str()).collect();
        assert_eq!(days, vec!["Wed", "Thu", "Fri", "Sat", "Sun"]);
        assert_eq!(out[0].forecast.last().unwrap().value, 5);
    }

    #[test]
    fn empty_root_yields_no_records() {
        let out = parse_forecast_xml(b"<DEFRAAirQuality></DEFRAAirQuality>").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn sites_without_name_are_skipped() {
        let xml = r#"<DEFRAAirQuality><site/><site lc="B" yr="2025" mon="1" dayn="2" hr="00" lt="1" ln="2"/></DEFRAAirQuality>"#;
        let out = parse_forecast_xml(xml.as_bytes()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "B");
        assert!(out[0].forecast.is_empty());
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let err = parse_forecast_xml(b"<DEFRAAirQuality><site lc=").unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
    }

    #[test]
    fn non_numeric_aq_is_parse_error() {
        let xml = r#"<DEFRAAirQuality><site lc="C" yr="2025" mon="1" dayn="2" hr="00" lt="1" ln="2"><day aq="high"/></site></DEFRAAirQuality>"#;
        let err = parse_forecast_xml(xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("aq"));
    }
}
