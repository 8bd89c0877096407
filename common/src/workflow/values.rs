// Parsing of raw workflow attribute values

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

pub fn parse_guid_value(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}

/// Accepts `YYYY-MM-DD`, RFC 3339, `YYYY-MM-DDTHH:MM:SS` and `M/D/YYYY`
pub fn parse_date_value(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(value, "%m/%d/%Y").ok()
}

/// Currency amount, tolerating a leading currency symbol and thousands separators.
/// Negative amounts are rejected.
pub fn parse_amount_value(value: &str, currency_symbol: &str) -> Option<Decimal> {
    let mut cleaned = value.trim();
    if !currency_symbol.is_empty() {
        cleaned = cleaned.strip_prefix(currency_symbol).unwrap_or(cleaned).trim();
    }
    let cleaned: String = cleaned.chars().filter(|c| *c != ',').collect();
    Decimal::from_str(&cleaned)
        .ok()
        .filter(|amount| !amount.is_sign_negative())
}
