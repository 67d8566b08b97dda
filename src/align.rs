//! Temporal alignment of weather observations and outage start times.

use chrono::{NaiveDateTime, Timelike};
use std::collections::{BTreeMap, HashSet};

use crate::records::{FEATURE_COUNT, HourlyWeatherRecord, WeatherFeatures, WeatherObservation};
use crate::stats::mean;

/// Truncates a timestamp to the start of its hour (14:59:30 → 14:00:00).
pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(ts)
}

/// Resamples observations to one record per calendar hour.
///
/// Exact duplicate timestamps keep their first occurrence. Each feature is
/// the mean of the observations in the hour; hours without observations do
/// not appear in the output, which is sorted by hour.
pub fn resample_hourly(observations: &[WeatherObservation]) -> Vec<HourlyWeatherRecord> {
    let mut seen = HashSet::new();
    let mut buckets: BTreeMap<NaiveDateTime, Vec<[f64; FEATURE_COUNT]>> = BTreeMap::new();

    for obs in observations {
        if !seen.insert(obs.timestamp) {
            continue;
        }
        buckets
            .entry(floor_to_hour(obs.timestamp))
            .or_default()
            .push(obs.features.to_array());
    }

    buckets
        .into_iter()
        .map(|(hour, rows)| {
            let mut means = [0.0; FEATURE_COUNT];
            for (i, slot) in means.iter_mut().enumerate() {
                let column: Vec<f64> = rows.iter().map(|r| r[i]).collect();
                *slot = mean(&column);
            }
            HourlyWeatherRecord {
                hour,
                features: WeatherFeatures::from_array(means),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn obs(ts: NaiveDateTime, rain: f64) -> WeatherObservation {
        WeatherObservation {
            timestamp: ts,
            features: WeatherFeatures {
                temperature: 20.0,
                wind_speed: 2.0,
                wind_gust: 5.0,
                pressure: 1010.0,
                precipitation: rain,
            },
        }
    }

    #[test]
    fn test_floor_to_hour_truncates() {
        assert_eq!(floor_to_hour(at(14, 59, 30)), at(14, 0, 0));
        assert_eq!(floor_to_hour(at(15, 0, 0)), at(15, 0, 0));
        assert_eq!(floor_to_hour(at(0, 0, 1)), at(0, 0, 0));
    }

    #[test]
    fn test_resample_hourly_means_within_bucket() {
        let hourly = resample_hourly(&[obs(at(14, 10, 0), 2.0), obs(at(14, 50, 0), 4.0)]);
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].hour, at(14, 0, 0));
        assert_eq!(hourly[0].features.precipitation, 3.0);
        assert_eq!(hourly[0].features.temperature, 20.0);
    }

    #[test]
    fn test_resample_hourly_empty_hours_absent() {
        let hourly = resample_hourly(&[obs(at(10, 0, 0), 1.0), obs(at(13, 0, 0), 1.0)]);
        let hours: Vec<_> = hourly.iter().map(|h| h.hour).collect();
        assert_eq!(hours, vec![at(10, 0, 0), at(13, 0, 0)]);
    }

    #[test]
    fn test_resample_hourly_keeps_first_duplicate() {
        let hourly = resample_hourly(&[obs(at(9, 0, 0), 1.0), obs(at(9, 0, 0), 9.0)]);
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].features.precipitation, 1.0);
    }

    #[test]
    fn test_resample_hourly_sorts_output() {
        let hourly = resample_hourly(&[obs(at(12, 0, 0), 1.0), obs(at(8, 30, 0), 1.0)]);
        assert_eq!(hourly[0].hour, at(8, 0, 0));
        assert_eq!(hourly[1].hour, at(12, 0, 0));
    }
}
