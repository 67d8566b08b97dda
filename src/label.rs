//! City-hour labeling.
//!
//! A city-hour is positive when at least one qualifying outage of that city
//! started in it. Qualifying means unscheduled, environmentally caused and
//! reported under motive code 0.
//!
//! City membership uses one canonicalization policy: city and area names are
//! folded (no accents, upper-case, punctuation as spaces) and the city's
//! words must appear as consecutive whole words of the area name. That keeps
//! `PORTO ALEGRE 4 - CENTRO` in Porto Alegre and keeps `ALEGRETE` out of it.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::align::floor_to_hour;
use crate::normalize::fold_text;
use crate::records::{HourlyWeatherRecord, LabeledSample, RawOutageRecord};
use crate::stats::pct;

const UNSCHEDULED: &str = "NAO PROGRAMADA";
const ENVIRONMENTAL: &str = "MEIO AMBIENTE";
const QUALIFYING_MOTIVE: i64 = 0;

/// Matches free-text area names against one city.
#[derive(Debug, Clone)]
pub struct CityMatcher {
    tokens: Vec<String>,
}

impl CityMatcher {
    pub fn new(city: &str) -> Self {
        Self {
            tokens: fold_text(city).split(' ').map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, area: &str) -> bool {
        if self.tokens.iter().all(|t| t.is_empty()) {
            return false;
        }
        let folded = fold_text(area);
        let area_tokens: Vec<&str> = folded.split(' ').collect();
        area_tokens
            .windows(self.tokens.len())
            .any(|w| w.iter().zip(&self.tokens).all(|(a, b)| *a == b.as_str()))
    }
}

pub fn is_unscheduled(record: &RawOutageRecord) -> bool {
    fold_text(&record.interruption_type) == UNSCHEDULED
}

pub fn is_environmental(record: &RawOutageRecord) -> bool {
    fold_text(&record.cause).contains(ENVIRONMENTAL)
}

/// Whether an outage counts as positive-label evidence.
pub fn is_qualifying(record: &RawOutageRecord) -> bool {
    record.start.is_some()
        && record.motive_code == Some(QUALIFYING_MOTIVE)
        && is_unscheduled(record)
        && is_environmental(record)
}

/// Qualifying outage start hours for one city, with the counts behind them.
#[derive(Debug, Default, Clone)]
pub struct OutageSelection {
    pub city_outages: usize,
    pub qualifying_outages: usize,
    pub hours: BTreeSet<NaiveDateTime>,
}

pub fn select_outage_hours(records: &[RawOutageRecord], matcher: &CityMatcher) -> OutageSelection {
    let mut selection = OutageSelection::default();

    for record in records.iter().filter(|r| matcher.matches(&r.area)) {
        selection.city_outages += 1;
        if !is_qualifying(record) {
            continue;
        }
        if let Some(start) = record.start {
            selection.qualifying_outages += 1;
            selection.hours.insert(floor_to_hour(start));
        }
    }

    selection
}

/// Labels every hour of the weather table.
pub fn label_hours(
    hourly: &[HourlyWeatherRecord],
    outage_hours: &BTreeSet<NaiveDateTime>,
) -> Vec<LabeledSample> {
    hourly
        .iter()
        .map(|h| LabeledSample {
            hour: h.hour,
            features: h.features,
            label: u8::from(outage_hours.contains(&floor_to_hour(h.hour))),
        })
        .collect()
}

/// A city's labeled table and the counts that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct CityDataset {
    pub city: String,
    #[serde(skip)]
    pub samples: Vec<LabeledSample>,
    pub city_outages: usize,
    pub qualifying_outages: usize,
    pub outage_hours: usize,
}

impl CityDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.samples.iter().filter(|s| s.label == 1).count()
    }

    /// Share of positive samples, in percent.
    pub fn positive_pct(&self) -> f64 {
        pct(self.positives(), self.len())
    }

    /// Number of distinct label values present.
    pub fn distinct_labels(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.label)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Joins a city's outages onto its hourly weather table.
pub fn build_city_dataset(
    city: &str,
    outages: &[RawOutageRecord],
    hourly: &[HourlyWeatherRecord],
) -> CityDataset {
    let selection = select_outage_hours(outages, &CityMatcher::new(city));

    if selection.city_outages == 0 {
        warn!(city, "No outages found for city, every hour labeled 0");
    } else if selection.qualifying_outages == 0 {
        warn!(
            city,
            city_outages = selection.city_outages,
            "No unscheduled environmental outages for city, every hour labeled 0"
        );
    }

    let dataset = CityDataset {
        city: city.to_string(),
        samples: label_hours(hourly, &selection.hours),
        city_outages: selection.city_outages,
        qualifying_outages: selection.qualifying_outages,
        outage_hours: selection.hours.len(),
    };

    info!(
        city,
        samples = dataset.len(),
        positives = dataset.positives(),
        positive_pct = dataset.positive_pct(),
        outage_hours = dataset.outage_hours,
        "Labeled dataset ready"
    );

    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::WeatherFeatures;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn outage(area: &str, kind: &str, cause: &str, start: NaiveDateTime) -> RawOutageRecord {
        RawOutageRecord {
            agent: "RGE SUL".into(),
            area: area.into(),
            interruption_type: kind.into(),
            motive_code: Some(0),
            cause: cause.into(),
            start: Some(start),
            end: None,
            source_year: 2021,
        }
    }

    fn hourly(hours: &[NaiveDateTime]) -> Vec<HourlyWeatherRecord> {
        hours
            .iter()
            .map(|&hour| HourlyWeatherRecord {
                hour,
                features: WeatherFeatures::default(),
            })
            .collect()
    }

    #[test]
    fn test_city_matcher_word_boundaries() {
        let matcher = CityMatcher::new("Porto Alegre");
        assert!(matcher.matches("PORTO ALEGRE 4 - CENTRO"));
        assert!(matcher.matches("porto alegre"));
        assert!(!matcher.matches("ALEGRETE"));
        assert!(!matcher.matches("PORTO"));

        let alegre = CityMatcher::new("Alegre");
        assert!(!alegre.matches("ALEGRETE 1"));
        assert!(alegre.matches("PORTO ALEGRE 2"));
    }

    #[test]
    fn test_city_matcher_accents() {
        assert!(CityMatcher::new("Sao Leopoldo").matches("SÃO LEOPOLDO 3"));
        assert!(!CityMatcher::new("").matches("anything"));
    }

    #[test]
    fn test_is_qualifying() {
        let start = at(1, 14, 0);
        assert!(is_qualifying(&outage("SANTA MARIA", "Não Programada", "Meio Ambiente - Vento", start)));
        assert!(is_qualifying(&outage("SANTA MARIA", "NAO PROGRAMADA", "Interna;Nao Programada;Meio Ambiente;Arvore", start)));
        assert!(!is_qualifying(&outage("SANTA MARIA", "Programada", "Meio Ambiente", start)));
        assert!(!is_qualifying(&outage("SANTA MARIA", "Não Programada", "Terceiros", start)));

        let mut other_motive = outage("SANTA MARIA", "Não Programada", "Meio Ambiente", start);
        other_motive.motive_code = Some(1);
        assert!(!is_qualifying(&other_motive));

        let mut no_start = outage("SANTA MARIA", "Não Programada", "Meio Ambiente", start);
        no_start.start = None;
        assert!(!is_qualifying(&no_start));
    }

    #[test]
    fn test_label_hours_marks_floored_matches() {
        let outages = vec![
            outage("PASSO FUNDO 1", "Não Programada", "Meio Ambiente", at(1, 10, 45)),
            outage("PASSO FUNDO 1", "Não Programada", "Meio Ambiente", at(1, 10, 5)),
            outage("SANTA MARIA", "Não Programada", "Meio Ambiente", at(1, 11, 0)),
            outage("PASSO FUNDO 1", "Programada", "Manutenção", at(1, 12, 0)),
        ];
        let weather = hourly(&[at(1, 10, 0), at(1, 11, 0), at(1, 12, 0)]);

        let dataset = build_city_dataset("Passo Fundo", &outages, &weather);
        let labels: Vec<u8> = dataset.samples.iter().map(|s| s.label).collect();

        assert_eq!(labels, vec![1, 0, 0]);
        assert_eq!(dataset.city_outages, 3);
        assert_eq!(dataset.qualifying_outages, 2);
        assert_eq!(dataset.outage_hours, 1);
        assert_eq!(dataset.distinct_labels(), 2);
    }

    #[test]
    fn test_no_outages_labels_everything_zero() {
        let weather = hourly(&[at(1, 10, 0), at(1, 11, 0)]);
        let dataset = build_city_dataset("Lagoa Vermelha", &[], &weather);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.positives(), 0);
        assert_eq!(dataset.distinct_labels(), 1);
    }

    #[test]
    fn test_no_qualifying_outages_labels_everything_zero() {
        let outages = vec![outage("LAGOA VERMELHA", "Programada", "Manutenção", at(1, 10, 0))];
        let weather = hourly(&[at(1, 10, 0)]);
        let dataset = build_city_dataset("Lagoa Vermelha", &outages, &weather);
        assert_eq!(dataset.city_outages, 1);
        assert_eq!(dataset.positives(), 0);
    }

    #[test]
    fn test_empty_weather_gives_empty_dataset() {
        let outages = vec![outage("SANTA MARIA", "Não Programada", "Meio Ambiente", at(1, 10, 0))];
        let dataset = build_city_dataset("Santa Maria", &outages, &[]);
        assert!(dataset.is_empty());
        assert_eq!(dataset.positive_pct(), 0.0);
    }

    #[test]
    fn test_labeling_is_idempotent() {
        let outages = vec![
            outage("SANTA MARIA 2", "Não Programada", "Meio Ambiente", at(2, 3, 15)),
            outage("SANTA MARIA 5", "Não Programada", "Meio Ambiente", at(3, 7, 59)),
        ];
        let weather = hourly(&[at(2, 3, 0), at(2, 4, 0), at(3, 7, 0), at(3, 8, 0)]);

        let first = build_city_dataset("Santa Maria", &outages, &weather);
        let second = build_city_dataset("Santa Maria", &outages, &weather);
        assert_eq!(first.samples, second.samples);
        assert_eq!(first.positives(), 2);
    }
}
