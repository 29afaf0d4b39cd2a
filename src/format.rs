use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::schema::ColumnType;

const ERROR_STATUSES: [&str; 5] = ["fail", "failed", "error", "expired", "critical"];
const WARNING_STATUSES: [&str; 3] = ["warning", "pending", "in progress"];
const SUCCESS_STATUSES: [&str; 5] = ["success", "pass", "passed", "valid", "active"];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Error,
    Warning,
    Success,
    Neutral,
}

pub fn status_level(value: &str) -> StatusLevel {
    let status = value.to_lowercase();
    if ERROR_STATUSES.iter().any(|s| status.contains(s)) {
        StatusLevel::Error
    } else if WARNING_STATUSES.iter().any(|s| status.contains(s)) {
        StatusLevel::Warning
    } else if SUCCESS_STATUSES.iter().any(|s| status.contains(s)) {
        StatusLevel::Success
    } else {
        StatusLevel::Neutral
    }
}

/// Plain string form of a value, used for search, filters, sorting and export.
/// `None` for null.
pub fn raw_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn format_cell(value: &Value, ctype: ColumnType) -> String {
    if value.is_null() {
        return String::new();
    }
    let text = match ctype {
        ColumnType::Date => format_date(value),
        ColumnType::Object => format_object(value),
        ColumnType::Boolean => match value.as_bool() {
            Some(true) => "Yes".to_string(),
            Some(false) => "No".to_string(),
            None => raw_text(value).unwrap_or_default(),
        },
        ColumnType::Number => match value {
            Value::Number(n) => format_number(n),
            other => raw_text(other).unwrap_or_default(),
        },
        ColumnType::Status | ColumnType::Id | ColumnType::Text => {
            raw_text(value).unwrap_or_default()
        }
    };
    text.replace("\r\n", " ↵ ").replace('\n', " ↵ ")
}

fn format_date(value: &Value) -> String {
    match value {
        Value::String(s) => parse_date(s)
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| s.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|d| d.with_timezone(&Local).format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| n.to_string()),
        other => raw_text(other).unwrap_or_default(),
    }
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Local).naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn format_object(value: &Value) -> String {
    match value {
        Value::Object(map) => ["commonName", "organizationName"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => raw_text(other).unwrap_or_default(),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return group_thousands(&i.unsigned_abs().to_string(), i < 0);
    }
    if let Some(u) = n.as_u64() {
        return group_thousands(&u.to_string(), false);
    }
    let f = n.as_f64().unwrap_or(0.0);
    let rendered = format!("{:.3}", f.abs());
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    match rendered.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group_thousands(int, f < 0.0), frac),
        None => group_thousands(rendered, f < 0.0),
    }
}

fn group_thousands(digits: &str, negative: bool) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if negative {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
