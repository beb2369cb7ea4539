// src/forecast/summary.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use super::model::ParsedSummary;
use crate::error::{SyncError, SyncResult};

static RE_ISSUED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^Issued on (.+) at ([0-9:]+) Local time").expect("valid issued regex")
});
static RE_WEEKDAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+,\s*").expect("valid weekday regex"));

/// Date layouts seen in the "Issued on ..." line.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %B %Y", "%d %b %Y", "%B %d %Y", "%d/%m/%Y"];

pub const ISSUE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse the free-text summary report.
pub fn parse_summary_txt(bytes: &[u8]) -> SyncResult<ParsedSummary> {
    let txt = std::str::from_utf8(bytes)
        .map_err(|e| SyncError::Parse(format!("summary report is not UTF-8: {e}")))?;
    Ok(parse_summary_str(txt))
}

pub fn parse_summary_str(txt: &str) -> ParsedSummary {
    let mut out = ParsedSummary::default();
    let lines: Vec<&str> = txt.lines().map(str::trim).collect();

    // Last valid "Issued on" line wins.
    for line in &lines {
        if let Some(d) = parse_issued_line(line) {
            out.issue_date = Some(d.format("%Y-%m-%d %H:%M:00").to_string());
        }
    }

    let mut current: Option<&'static str> = None;
    let mut buffer: Vec<&str> = Vec::new();
    for line in &lines {
        if let Some(label) = section_label(line) {
            flush(&mut out, current, &mut buffer);
            current = Some(label);
            continue;
        }
        if current.is_none() {
            continue;
        }
        if line.is_empty() {
            if !buffer.is_empty() {
                flush(&mut out, current, &mut buffer);
                current = None;
            }
        } else {
            buffer.push(line);
        }
    }
    flush(&mut out, current, &mut buffer);
    out
}

/// Calendar date of a stored `issue_date` value.
pub fn issue_date_day(issue_date: &str) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(issue_date, ISSUE_DATE_FORMAT)
        .ok()
        .map(|dt| dt.date())
}

fn parse_issued_line(line: &str) -> Option<NaiveDateTime> {
    let caps = RE_ISSUED.captures(line)?;
    let date_str = RE_WEEKDAY.replace(caps.get(1)?.as_str().trim(), "").to_string();
    let time = NaiveTime::parse_from_str(caps.get(2)?.as_str().trim(), "%H:%M").ok()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_str.trim(), fmt).ok())
        .map(|d| d.and_time(time))
}

fn section_label(line: &str) -> Option<&'static str> {
    match line.to_ascii_lowercase().as_str() {
        "today:" => Some("today"),
        "tomorrow:" => Some("tomorrow"),
        "outlook:" => Some("outlook"),
        _ => None,
    }
}

fn flush(out: &mut ParsedSummary, label: Option<&str>, buffer: &mut Vec<&str>) {
    if buffer.is_empty() {
        return;
    }
    let text = buffer.join(" ");
    buffer.clear();
    match label {
        Some("today") => out.today = Some(text),
        Some("tomorrow") => out.tomorrow = Some(text),
        Some("outlook") => out.outlook = Some(text),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_date_iso_layout() {
        let r = parse_summary_str("Issued on Monday, 2025-09-15 at 09:00 Local time");
        assert_eq!(r.issue_date.as_deref(), Some("2025-09-15 09:00:00"));
    }

    #[test]
    fn issue_date_long_layout() {
        let r = parse_summary_str("Issued on Monday, 29 September 2025 at 04:10 Local time");
        assert_eq!(r.issue_date.as_deref(), Some("2025-09-29 04:10:00"));
    }

    #[test]
    fn malformed_issue_date_is_ignored() {
        let r = parse_summary_str("Issued on nonsense");
        assert!(r.issue_date.is_none());
    }

    #[test]
    fn sections_join_lines_and_close_on_blank() {
        let txt = "
            Today:
            Line one.
            Line two.

            Tomorrow:
            Line three.

            Outlook:
        ";
        let r = parse_summary_str(txt);
        assert_eq!(r.today.as_deref(), Some("Line one. Line two."));
        assert_eq!(r.tomorrow.as_deref(), Some("Line three."));
        assert!(r.outlook.is_none());
    }

    #[test]
    fn empty_input_is_empty_summary() {
        assert_eq!(parse_summary_str(""), ParsedSummary::default());
    }

    #[test]
    fn non_utf8_is_parse_error() {
        assert!(matches!(
            parse_summary_txt(&[0xff, 0xfe, 0x00]),
            Err(SyncError::Parse(_))
        ));
    }

    #[test]
    fn issue_day_extraction() {
        assert_eq!(
            issue_date_day("2025-09-15 09:00:00"),
            NaiveDate::from_ymd_opt(2025, 9, 15)
        );
        assert_eq!(issue_date_day("garbage"), None);
    }
}
