use super::balance::Principle;
use crate::tax::Country;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no tax year given")]
    MissingTaxYear,
    #[error("invalid tax year {0}")]
    InvalidTaxYear(i32),
    #[error("fiat currency must not be empty")]
    EmptyFiat,
}

/// Optional settings read from a JSON file; command line flags take precedence
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub tax_year: Option<i32>,
    pub country: Option<Country>,
    pub principle: Option<Principle>,
    pub fiat: Option<String>,
    pub multi_depot: Option<bool>,
    pub calculate_unrealized_gains: Option<bool>,
}

impl ConfigFile {
    pub fn read_json<R: Read>(reader: R) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Immutable evaluation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub tax_year: i32,
    pub country: Country,
    pub principle: Principle,
    /// Home fiat currency, upper case
    pub fiat: String,
    /// Keep a separate balance per platform
    pub multi_depot: bool,
    pub calculate_unrealized_gains: bool,
}

impl Config {
    pub fn new(tax_year: i32) -> Self {
        let country = Country::default();
        Config {
            tax_year,
            country,
            principle: Principle::default(),
            fiat: country.fiat().to_string(),
            multi_depot: false,
            calculate_unrealized_gains: false,
        }
    }

    /// Build from a config file, with `tax_year` overriding the file's year
    pub fn from_file(file: ConfigFile, tax_year: Option<i32>) -> Result<Self, ConfigError> {
        let tax_year = tax_year
            .or(file.tax_year)
            .ok_or(ConfigError::MissingTaxYear)?;
        let mut config = Config::new(tax_year);
        if let Some(country) = file.country {
            config.country = country;
            config.fiat = country.fiat().to_string();
        }
        if let Some(fiat) = file.fiat {
            config.fiat = fiat.trim().to_uppercase();
        }
        config.principle = file.principle.unwrap_or_default();
        config.multi_depot = file.multi_depot.unwrap_or(false);
        config.calculate_unrealized_gains = file.calculate_unrealized_gains.unwrap_or(false);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tax_year <= 0 {
            return Err(ConfigError::InvalidTaxYear(self.tax_year));
        }
        if self.fiat.trim().is_empty() {
            return Err(ConfigError::EmptyFiat);
        }
        Ok(())
    }

    pub fn is_fiat(&self, coin: &str) -> bool {
        coin.eq_ignore_ascii_case(&self.fiat)
    }

    /// Last second of the tax year, or `evaluated_at` while the year is still running
    pub fn tax_deadline(&self, evaluated_at: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
        let year_end = Utc
            .with_ymd_and_hms(self.tax_year, 12, 31, 23, 59, 59)
            .single()
            .ok_or(ConfigError::InvalidTaxYear(self.tax_year))?;
        Ok(year_end.min(evaluated_at))
    }
}
