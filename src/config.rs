//! Run configuration.
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! is a valid configuration.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, DelegationError};
use crate::region_catalog::RegionCatalog;
use crate::shared::{CountryCode, Registry};

const DATE_FORMAT: &str = "%Y%m%d";

/// Which consumer the observations are fed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Country role classification over collector RIBs.
    #[default]
    Countries,
    /// Peer tree of a single exchange point.
    Ixp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding inputs and receiving the reports.
    pub source: PathBuf,

    /// Delegation feed, defaults to `<source>/delegated-<date>.csv`.
    pub delegated_path: Option<PathBuf>,

    /// `prefix|as path` lines, defaults to `<source>/paths-<date>.txt`.
    pub observations_path: Option<PathBuf>,

    /// Defaults to `source`.
    pub output_dir: Option<PathBuf>,

    /// Registry region whose countries are reported.
    pub region: Registry,

    /// `{ "<registry>": ["CC", ...] }` table; the built-in one otherwise.
    pub regions_path: Option<PathBuf>,

    pub mode: Mode,

    /// In `ixp` mode, also compare the exchange with this country's view
    /// built from `coverage_rib_path`.
    pub coverage_country: Option<String>,

    pub coverage_rib_path: Option<PathBuf>,

    /// Classification threads, 0 for one per CPU.
    pub workers: usize,

    /// Run date as YYYYMMDD, today when absent.
    pub date: Option<String>,

    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            source: PathBuf::from("data"),
            delegated_path: None,
            observations_path: None,
            output_dir: None,
            region: Registry::Lacnic,
            regions_path: None,
            mode: Mode::Countries,
            coverage_country: None,
            coverage_rib_path: None,
            workers: 0,
            date: None,
            log_level: "info".to_string(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(date) = &self.date {
            NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|e| {
                ConfigError::InvalidValue {
                    field: "date",
                    reason: format!("{:?} is not YYYYMMDD: {}", date, e),
                }
            })?;
        }
        if self.coverage_country.is_some() != self.coverage_rib_path.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "coverage_country",
                reason: "coverage_country and coverage_rib_path go together".to_string(),
            });
        }
        self.coverage_country()?;
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log_level",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn date(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| Local::now().format(DATE_FORMAT).to_string())
    }

    pub fn delegated_path(&self) -> PathBuf {
        self.delegated_path
            .clone()
            .unwrap_or_else(|| self.source.join(format!("delegated-{}.csv", self.date())))
    }

    pub fn observations_path(&self) -> PathBuf {
        self.observations_path
            .clone()
            .unwrap_or_else(|| self.source.join(format!("paths-{}.txt", self.date())))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| self.source.clone())
    }

    pub fn workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn coverage_country(&self) -> Result<Option<CountryCode>, ConfigError> {
        self.coverage_country
            .as_deref()
            .map(|cc| {
                cc.parse::<CountryCode>().map_err(|e: DelegationError| ConfigError::InvalidValue {
                    field: "coverage_country",
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn regions(&self) -> Result<RegionCatalog, ConfigError> {
        match &self.regions_path {
            Some(path) => RegionCatalog::from_path(path),
            None => Ok(RegionCatalog::builtin()),
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let path = path.as_ref();
    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config = load_config_str(&contents)?;

    info!(region = %config.region, mode = ?config.mode, "Configuration loaded");
    Ok(config)
}

/// Load configuration from a JSON string
pub fn load_config_str(json: &str) -> Result<RunConfig, ConfigError> {
    let config: RunConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_str("{}").unwrap();
        assert_eq!(config.region, Registry::Lacnic);
        assert_eq!(config.mode, Mode::Countries);
        assert_eq!(config.output_dir(), PathBuf::from("data"));
    }

    #[test]
    fn test_config_paths_follow_date() {
        let config =
            load_config_str(r#"{"source": "/tmp/rib", "date": "20240115", "region": "ripencc"}"#)
                .unwrap();
        assert_eq!(config.region, Registry::RipeNcc);
        assert_eq!(
            config.delegated_path(),
            PathBuf::from("/tmp/rib/delegated-20240115.csv")
        );
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert!(matches!(
            load_config_str(r#"{"date": "2024-01-15"}"#),
            Err(ConfigError::InvalidValue { field: "date", .. })
        ));
        assert!(matches!(
            load_config_str(r#"{"region": "iana"}"#),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            load_config_str(r#"{"coverage_country": "AR"}"#),
            Err(ConfigError::InvalidValue { field: "coverage_country", .. })
        ));
        assert!(load_config_str(r#"{"coverage_country": "ARG", "coverage_rib_path": "r.txt"}"#)
            .is_err());
    }
}
