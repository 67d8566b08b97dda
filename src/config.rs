//! Pipeline configuration.
//!
//! Stored as a JSON object on disk; every field is optional and falls back to
//! the defaults below:
//! ```json
//! {
//!   "outage_dir": "ANEEL/Data/Filtrados",
//!   "weather_dir": "INMET/Data/Filtrados",
//!   "years": [2020, 2021, 2022, 2023],
//!   "cities": [{ "name": "Porto Alegre", "weather_file": "PortoAlegre_filtrado.csv" }],
//!   "training": { "seed": 42, "cv_folds": 3 }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::grid::ParamGrid;

/// Placeholder replaced by the year in [`PipelineConfig::outage_file_pattern`].
pub const YEAR_PLACEHOLDER: &str = "{year}";

/// A city to process: the name used to match outage areas and the name of
/// its weather file inside each year directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,
    pub weather_file: String,
}

impl CityConfig {
    pub fn new(name: &str, weather_file: &str) -> Self {
        Self {
            name: name.to_string(),
            weather_file: weather_file.to_string(),
        }
    }

    /// File-name-safe form of the city name (`"Porto Alegre"` → `"Porto_Alegre"`).
    pub fn safe_name(&self) -> String {
        self.name.replace(' ', "_").replace('/', "")
    }
}

/// Settings for the split, the grid search and the worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub grid: ParamGrid,
    /// Worker threads for tree fitting; 0 uses every core.
    pub threads: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            cv_folds: 3,
            grid: ParamGrid::default(),
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub outage_dir: PathBuf,
    pub weather_dir: PathBuf,
    pub output_dir: PathBuf,
    pub outage_file_pattern: String,
    pub years: Vec<i32>,
    pub cities: Vec<CityConfig>,
    /// Only outage rows whose agent contains this text are kept.
    pub agent_filter: Option<String>,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outage_dir: PathBuf::from("ANEEL/Data/Filtrados"),
            weather_dir: PathBuf::from("INMET/Data/Filtrados"),
            output_dir: PathBuf::from("Data/Random Forest"),
            outage_file_pattern: format!("interrupcoes_rge_sul_filtrado_{YEAR_PLACEHOLDER}.csv"),
            years: (2020..=2023).collect(),
            cities: vec![
                CityConfig::new("Lagoa Vermelha", "LagoaVermelha_filtrado.csv"),
                CityConfig::new("Passo Fundo", "PassoFundo_filtrado.csv"),
                CityConfig::new("Porto Alegre", "PortoAlegre_filtrado.csv"),
                CityConfig::new("Santa Maria", "SantaMaria_filtrado.csv"),
            ],
            agent_filter: None,
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Path of the outage file for `year`.
    pub fn outage_path(&self, year: i32) -> PathBuf {
        let file_name = self
            .outage_file_pattern
            .replace(YEAR_PLACEHOLDER, &year.to_string());
        self.outage_dir.join(file_name)
    }

    /// Path of a city's weather file for `year`.
    pub fn weather_path(&self, year: i32, city: &CityConfig) -> PathBuf {
        self.weather_dir
            .join(year.to_string())
            .join(&city.weather_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.outage_path(2021),
            PathBuf::from("ANEEL/Data/Filtrados/interrupcoes_rge_sul_filtrado_2021.csv")
        );
        let city = &config.cities[2];
        assert_eq!(
            config.weather_path(2020, city),
            PathBuf::from("INMET/Data/Filtrados/2020/PortoAlegre_filtrado.csv")
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "years": [2022], "training": { "seed": 7 } }"#).unwrap();
        assert_eq!(config.years, vec![2022]);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.cv_folds, 3);
        assert_eq!(config.cities.len(), 4);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "cities": [{ "name": "Santa Maria", "weather_file": "SM.csv" }], "agent_filter": "RGE SUL" }"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.cities, vec![CityConfig::new("Santa Maria", "SM.csv")]);
        assert_eq!(config.agent_filter.as_deref(), Some("RGE SUL"));
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(PipelineConfig::load(Path::new("/nonexistent/config.json")).is_err());
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(CityConfig::new("Porto Alegre", "x").safe_name(), "Porto_Alegre");
        assert_eq!(CityConfig::new("A/B C", "x").safe_name(), "AB_C");
    }
}
