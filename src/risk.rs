//! Rule-based rain, wind and vegetation risk levels.
//!
//! This is a separate derivation from the learned classifier: it reads
//! normalized weather observations and never feeds training.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::normalize::{parse_locale_float, parse_observation_timestamp};
use crate::records::RawWeatherObservation;

/// Ordinal risk bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Unknown,
    Baixo,
    Moderado,
    Alto,
    MuitoAlto,
    Critico,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "unknown",
            RiskLevel::Baixo => "baixo",
            RiskLevel::Moderado => "moderado",
            RiskLevel::Alto => "alto",
            RiskLevel::MuitoAlto => "muito_alto",
            RiskLevel::Critico => "critico",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rain risk from hourly precipitation in mm.
///
/// | Range      | Level      |
/// |------------|------------|
/// | < 5        | baixo      |
/// | < 15       | moderado   |
/// | < 30       | alto       |
/// | >= 30      | muito_alto |
pub fn classify_rain_risk(precipitation: Option<f64>) -> RiskLevel {
    match precipitation {
        None => RiskLevel::Unknown,
        Some(mm) if mm < 5.0 => RiskLevel::Baixo,
        Some(mm) if mm < 15.0 => RiskLevel::Moderado,
        Some(mm) if mm < 30.0 => RiskLevel::Alto,
        Some(_) => RiskLevel::MuitoAlto,
    }
}

/// Wind risk from gust speed in m/s.
///
/// | Range      | Level      |
/// |------------|------------|
/// | < 10       | baixo      |
/// | < 15       | moderado   |
/// | < 21       | alto       |
/// | < 25       | muito_alto |
/// | >= 25      | critico    |
pub fn classify_wind_risk(gust: Option<f64>) -> RiskLevel {
    match gust {
        None => RiskLevel::Unknown,
        Some(v) if v < 10.0 => RiskLevel::Baixo,
        Some(v) if v < 15.0 => RiskLevel::Moderado,
        Some(v) if v < 21.0 => RiskLevel::Alto,
        Some(v) if v < 25.0 => RiskLevel::MuitoAlto,
        Some(_) => RiskLevel::Critico,
    }
}

/// Vegetation (falling trees, branches on lines) risk from the strongest
/// wind reading and the rain accumulated over the trailing 24 hours.
/// Unknown inputs fall through to `baixo`.
pub fn classify_vegetation_risk(max_wind: Option<f64>, rain_24h: Option<f64>) -> RiskLevel {
    if let (Some(wind), Some(rain)) = (max_wind, rain_24h) {
        if wind >= 21.0 && rain >= 80.0 {
            return RiskLevel::Critico;
        }
        if wind >= 15.0 && rain >= 50.0 {
            return RiskLevel::Alto;
        }
    }
    RiskLevel::Baixo
}

/// One observation reduced to what the risk rules read. Features are parsed
/// independently, so a missing gust does not hide the rain reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInput {
    pub timestamp: NaiveDateTime,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
}

impl RiskInput {
    /// `None` when the timestamp cannot be parsed.
    pub fn from_raw(raw: &RawWeatherObservation) -> Option<Self> {
        Some(Self {
            timestamp: parse_observation_timestamp(&raw.date, &raw.time)?,
            precipitation: parse_locale_float(&raw.precipitation),
            wind_speed: parse_locale_float(&raw.wind_speed),
            wind_gust: parse_locale_float(&raw.wind_gust),
        })
    }

    fn max_wind(&self) -> Option<f64> {
        match (self.wind_speed, self.wind_gust) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Risk levels for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAssessment {
    pub timestamp: NaiveDateTime,
    pub precipitation: Option<f64>,
    pub wind_gust: Option<f64>,
    pub rain_24h: f64,
    pub rain: RiskLevel,
    pub wind: RiskLevel,
    pub vegetation: RiskLevel,
}

/// Trailing 24-hour precipitation sums over time-sorted inputs.
///
/// Each sum covers `(t - 24h, t]`; missing readings count as zero.
pub fn rolling_rain_24h(inputs: &[RiskInput]) -> Vec<f64> {
    let window = Duration::hours(24);
    let mut queue: VecDeque<(NaiveDateTime, f64)> = VecDeque::new();
    let mut total = 0.0;

    inputs
        .iter()
        .map(|input| {
            let rain = input.precipitation.unwrap_or(0.0);
            queue.push_back((input.timestamp, rain));
            total += rain;
            while let Some(&(ts, value)) = queue.front() {
                if input.timestamp - ts >= window {
                    total -= value;
                    queue.pop_front();
                } else {
                    break;
                }
            }
            total.max(0.0)
        })
        .collect()
}

/// Assesses a city's observations, sorted by time.
pub fn assess_city(mut inputs: Vec<RiskInput>) -> Vec<RiskAssessment> {
    inputs.sort_by_key(|i| i.timestamp);
    let rain_24h = rolling_rain_24h(&inputs);

    inputs
        .iter()
        .zip(rain_24h)
        .map(|(input, rain_24h)| RiskAssessment {
            timestamp: input.timestamp,
            precipitation: input.precipitation,
            wind_gust: input.wind_gust,
            rain_24h,
            rain: classify_rain_risk(input.precipitation),
            wind: classify_wind_risk(input.wind_gust),
            vegetation: classify_vegetation_risk(input.max_wind(), Some(rain_24h)),
        })
        .collect()
}

/// Row of the consolidated risk table. Missing readings stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRow {
    pub data: String,
    pub hora: String,
    #[serde(rename = "chuva_mm")]
    pub precipitation: Option<f64>,
    #[serde(rename = "raj. vento (m/s)")]
    pub wind_gust: Option<f64>,
    #[serde(rename = "risco de chuva")]
    pub rain: RiskLevel,
    #[serde(rename = "risco de vento")]
    pub wind: RiskLevel,
    #[serde(rename = "risco de vegetacao")]
    pub vegetation: RiskLevel,
}

impl From<&RiskAssessment> for RiskRow {
    fn from(a: &RiskAssessment) -> Self {
        Self {
            data: a.timestamp.format("%d/%m/%Y").to_string(),
            hora: a.timestamp.format("%H%M").to_string(),
            precipitation: a.precipitation,
            wind_gust: a.wind_gust,
            rain: a.rain,
            wind: a.wind,
            vegetation: a.vegetation,
        }
    }
}
