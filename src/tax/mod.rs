pub mod germany;

use crate::core::Evaluator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use germany::Germany;

/// Jurisdiction whose rules drive the evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Country {
    #[default]
    Germany,
}

impl Country {
    /// Default home fiat currency
    pub fn fiat(self) -> &'static str {
        match self {
            Country::Germany => "EUR",
        }
    }

    /// Whether coins acquired at `acquired` and disposed at `disposed` were
    /// held long enough to be exempt from taxation
    pub fn is_long_term(self, acquired: DateTime<Utc>, disposed: DateTime<Utc>) -> bool {
        match self {
            Country::Germany => germany::is_long_term(acquired, disposed),
        }
    }

    /// Select the evaluation strategy for this jurisdiction
    pub fn evaluator(self) -> Box<dyn Evaluator> {
        match self {
            Country::Germany => Box::new(Germany),
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Country::Germany => f.write_str("Germany"),
        }
    }
}

/// Income category a tax event is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TaxationType {
    /// Private disposal gains
    OtherIncome,
    /// Interest earned on fiat
    CapitalIncome,
    /// Lending/staking interest in coins and commissions
    OtherServices,
}

impl TaxationType {
    /// Label used on the German tax return
    pub fn label(self) -> &'static str {
        match self {
            TaxationType::OtherIncome => "Sonstige Einkünfte",
            TaxationType::CapitalIncome => "Einkünfte aus Kapitalvermögen",
            TaxationType::OtherServices => "Einkünfte aus sonstigen Leistungen",
        }
    }
}

impl fmt::Display for TaxationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_parses_from_config() {
        let country: Country = serde_json::from_str("\"germany\"").unwrap();
        assert_eq!(country, Country::Germany);
        assert!(serde_json::from_str::<Country>("\"narnia\"").is_err());
    }

    #[test]
    fn germany_defaults_to_euro() {
        assert_eq!(Country::Germany.fiat(), "EUR");
    }

    #[test]
    fn taxation_type_labels() {
        assert_eq!(TaxationType::OtherIncome.to_string(), "Sonstige Einkünfte");
        assert_eq!(
            TaxationType::CapitalIncome.to_string(),
            "Einkünfte aus Kapitalvermögen"
        );
        assert_eq!(
            TaxationType::OtherServices.to_string(),
            "Einkünfte aus sonstigen Leistungen"
        );
    }
}
