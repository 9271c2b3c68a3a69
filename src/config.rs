use crate::constants;
use crate::error::{Result, ScraperError};
use crate::pipeline::extract::PriceUnit;
use crate::pipeline::fetcher::RetryPolicy;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "boxoffice.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_root: PathBuf,
    pub log_dir: PathBuf,
    pub harvest: HarvestConfig,
    pub nepal: NepalConfig,
    pub srilanka: SriLankaConfig,
    pub japan: JapanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            harvest: HarvestConfig::default(),
            nepal: NepalConfig::default(),
            srilanka: SriLankaConfig::default(),
            japan: JapanConfig::default(),
        }
    }
}

/// Settings shared by every source unless a source overrides them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub cooldown_secs: u64,
    pub retry_delay_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_retries: 5,
            timeout_secs: 15,
            cooldown_secs: 6,
            retry_delay_ms: 1500,
        }
    }
}

impl HarvestConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NepalConfig {
    pub movie_list_url: String,
    /// Contains a `{movie_id}` placeholder
    pub movie_info_url: String,
    pub showinfo_url: String,
    pub token_url: String,
    pub cutoff_minutes: i64,
    /// Advance tracking never looks at dates before this one
    pub advance_floor_date: Option<NaiveDate>,
    pub advance_offset_days: i64,
    pub price_unit: PriceUnit,
}

impl Default for NepalConfig {
    fn default() -> Self {
        Self {
            movie_list_url: constants::KHALTI_MOVIE_LIST_URL.to_string(),
            movie_info_url: constants::KHALTI_MOVIE_INFO_URL.to_string(),
            showinfo_url: constants::KHALTI_SHOWINFO_URL.to_string(),
            token_url: constants::KHALTI_TOKEN_URL.to_string(),
            cutoff_minutes: 200,
            advance_floor_date: NaiveDate::from_ymd_opt(2026, 1, 9),
            advance_offset_days: 2,
            price_unit: PriceUnit::Minor,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SriLankaConfig {
    pub movies_url: String,
    pub showtimes_url: String,
    pub region_code: String,
    pub cutoff_minutes: i64,
    pub daily_passes: usize,
    pub advance_passes: usize,
    pub max_workers: usize,
    /// Attempts per request minus one
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub price_unit: PriceUnit,
}

impl Default for SriLankaConfig {
    fn default() -> Self {
        Self {
            movies_url: constants::BMS_MOVIES_URL.to_string(),
            showtimes_url: constants::BMS_SHOWTIMES_URL.to_string(),
            region_code: constants::BMS_REGION_CODE.to_string(),
            cutoff_minutes: 200,
            daily_passes: 5,
            advance_passes: 7,
            max_workers: 5,
            max_retries: 5,
            timeout_secs: 1,
            price_unit: PriceUnit::Major,
        }
    }
}

impl SriLankaConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JapanConfig {
    pub base_url: String,
    pub start_year: i32,
    pub max_workers: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for JapanConfig {
    fn default() -> Self {
        Self {
            base_url: constants::MIMORIN_BASE_URL.to_string(),
            start_year: 2018,
            max_workers: 100,
            max_retries: 2,
            timeout_secs: 20,
        }
    }
}

impl JapanConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Loads `path` (or `boxoffice.toml`) when present, otherwise falls back to defaults.
    /// `BOXOFFICE_OUTPUT_ROOT` overrides the output root either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path).map_err(|e| {
                ScraperError::Config(format!("Failed to read config file '{}': {}", config_path.display(), e))
            })?;
            Self::from_toml(&content)?
        } else if path.is_some() {
            return Err(ScraperError::Config(format!(
                "Config file '{}' does not exist",
                config_path.display()
            )));
        } else {
            Self::default()
        };

        if let Ok(root) = std::env::var("BOXOFFICE_OUTPUT_ROOT") {
            if !root.trim().is_empty() {
                config.output_root = PathBuf::from(root);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.harvest.max_workers == 0 || self.srilanka.max_workers == 0 || self.japan.max_workers == 0 {
            return Err(ScraperError::Config("max_workers must be at least 1".into()));
        }
        if !self.nepal.movie_info_url.contains("{movie_id}") {
            return Err(ScraperError::Config(
                "nepal.movie_info_url must contain a {movie_id} placeholder".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [harvest]
            max_workers = 4

            [srilanka]
            price_unit = "minor"
            "#,
        )
        .unwrap();
        assert_eq!(config.harvest.max_workers, 4);
        assert_eq!(config.harvest.max_retries, 5);
        assert_eq!(config.srilanka.price_unit, PriceUnit::Minor);
        assert_eq!(config.nepal.price_unit, PriceUnit::Minor);
        assert_eq!(config.srilanka.daily_passes, 5);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn movie_info_url_needs_placeholder() {
        let mut config = Config::default();
        config.nepal.movie_info_url = "https://example.com/info".to_string();
        assert!(config.validate().is_err());
    }
}
