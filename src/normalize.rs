//! Field normalization for locale-formatted source data.
//!
//! Every function here is total: bad input becomes `None`, never an error.
//! Source files mix formats across years, so cleaning keeps every row it can.

use chrono::{NaiveDate, NaiveDateTime};

use crate::records::{RawWeatherObservation, WeatherFeatures, WeatherObservation};

/// Day-first format used by most weather files.
const PRIMARY_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H%M";

/// Year-first formats tried when the primary one fails.
const ALTERNATE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H%M", "%Y/%m/%d %H%M"];

const OUTAGE_DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const OUTAGE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// Parses a number written with a decimal comma, e.g. `"12,5"` → `12.5`.
///
/// Quote characters are stripped and an empty value is missing.
pub fn parse_locale_float(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '"')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reduces a time-of-day string to a zero-padded `HHMM`.
///
/// Non-digit characters are dropped first, so `"1400 UTC"` and `"14:00"`
/// both become `"1400"` and `"0"` becomes `"0000"`.
pub fn normalize_time_of_day(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    Some(format!("{:0>4}", digits))
}

/// Builds an observation timestamp from separate date and time fields.
pub fn parse_observation_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let time = normalize_time_of_day(time)?;
    let joined = format!("{} {}", date.trim(), time);

    NaiveDateTime::parse_from_str(&joined, PRIMARY_TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            ALTERNATE_TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&joined, fmt).ok())
        })
}

/// Parses an outage start/end timestamp in any of the formats seen in the
/// outage datasets. A bare date maps to midnight.
pub fn parse_outage_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim().trim_matches('"').trim();
    if raw.is_empty() {
        return None;
    }

    OUTAGE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            OUTAGE_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parses an integer code such as `IdeMotivoInterrupcao`, tolerating `"0,0"`.
pub fn parse_code(raw: &str) -> Option<i64> {
    let value = parse_locale_float(raw)?;
    if value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

/// Replaces Portuguese accented letters with their plain counterparts.
pub fn fold_accents(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Canonical column name used for header lookups.
pub fn standardize_column(raw: &str) -> String {
    fold_accents(raw.trim().trim_start_matches('\u{feff}'))
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical free-text form for matching: accent-free, upper-case, every run
/// of punctuation or whitespace collapsed to one space.
pub fn fold_text(raw: &str) -> String {
    let spaced: String = fold_accents(raw)
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleans one raw weather row. Returns `None` when any feature or the
/// timestamp cannot be parsed.
pub fn normalize_observation(raw: &RawWeatherObservation) -> Option<WeatherObservation> {
    let features = WeatherFeatures {
        temperature: parse_locale_float(&raw.temperature)?,
        wind_speed: parse_locale_float(&raw.wind_speed)?,
        wind_gust: parse_locale_float(&raw.wind_gust)?,
        pressure: parse_locale_float(&raw.pressure)?,
        precipitation: parse_locale_float(&raw.precipitation)?,
    };
    let timestamp = parse_observation_timestamp(&raw.date, &raw.time)?;

    Some(WeatherObservation {
        timestamp,
        features,
    })
}
