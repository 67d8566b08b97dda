//! Typed records for each pipeline stage.
//!
//! Raw records keep the source text untouched; the normalizer turns them into
//! [`WeatherObservation`]s, the aligner into [`HourlyWeatherRecord`]s and the
//! labeler into [`LabeledSample`]s.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Number of meteorological features fed to the classifier.
pub const FEATURE_COUNT: usize = 5;

/// Source column names of the features, in model order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Temp. Ins. (C)",
    "Vel. Vento (m/s)",
    "Raj. Vento (m/s)",
    "Pressao Ins. (hPa)",
    "Chuva (mm)",
];

/// Name of the binary label column.
pub const TARGET_NAME: &str = "interrupcao_real";

/// One reported interruption event from a yearly outage file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutageRecord {
    pub agent: String,
    pub area: String,
    pub interruption_type: String,
    pub motive_code: Option<i64>,
    pub cause: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub source_year: i32,
}

/// One station reading, fields exactly as found in the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWeatherObservation {
    pub date: String,
    pub time: String,
    pub temperature: String,
    pub wind_speed: String,
    pub wind_gust: String,
    pub pressure: String,
    pub precipitation: String,
    pub source_year: i32,
}

/// The five weather features used by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeatherFeatures {
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
    pub pressure: f64,
    pub precipitation: f64,
}

impl WeatherFeatures {
    /// Features as a fixed-order array matching [`FEATURE_NAMES`].
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.temperature,
            self.wind_speed,
            self.wind_gust,
            self.pressure,
            self.precipitation,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            temperature: values[0],
            wind_speed: values[1],
            wind_gust: values[2],
            pressure: values[3],
            precipitation: values[4],
        }
    }
}

/// A cleaned observation with a parsed timestamp and complete features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherObservation {
    pub timestamp: NaiveDateTime,
    pub features: WeatherFeatures,
}

/// Mean of all observations that fell in one calendar hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyWeatherRecord {
    pub hour: NaiveDateTime,
    pub features: WeatherFeatures,
}

/// The training unit: one city-hour with its label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledSample {
    pub hour: NaiveDateTime,
    pub features: WeatherFeatures,
    pub label: u8,
}
