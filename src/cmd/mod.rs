pub mod report;
pub mod schema;
pub mod validate;

use crate::core::{self, Config, ConfigFile, Operation, PriceTable, Principle};
use anyhow::Context;
use clap::Args;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Inputs and settings shared by every evaluating command
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Normalized ledger CSV (utc_time,kind,platform,coin,change,raw_ids)
    #[arg(short, long)]
    pub ledger: PathBuf,

    /// Price CSV (coin,utc_time,price) in the home fiat currency
    #[arg(short, long)]
    pub prices: PathBuf,

    /// Tax year to evaluate (e.g. 2023). Overrides the config file.
    #[arg(short, long)]
    pub year: Option<i32>,

    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Match disposals against the newest coins first
    #[arg(long)]
    pub lifo: bool,

    /// Keep a separate balance for every platform
    #[arg(long)]
    pub multi_depot: bool,

    /// Value remaining coins as if sold at the end of the tax year
    #[arg(long)]
    pub unrealized: bool,
}

impl InputArgs {
    /// Config file settings overridden by command line flags
    pub fn config(&self) -> anyhow::Result<Config> {
        let mut file = match &self.config {
            Some(path) => {
                let reader = BufReader::new(open(path)?);
                ConfigFile::read_json(reader)
                    .with_context(|| format!("Failed to read config {}", path.display()))?
            }
            None => ConfigFile::default(),
        };
        if self.lifo {
            file.principle = Some(Principle::Lifo);
        }
        if self.multi_depot {
            file.multi_depot = Some(true);
        }
        if self.unrealized {
            file.calculate_unrealized_gains = Some(true);
        }
        Ok(Config::from_file(file, self.year)?)
    }

    pub fn read_operations(&self) -> anyhow::Result<Vec<Operation>> {
        let reader = BufReader::new(open(&self.ledger)?);
        core::read_ledger(reader, &self.ledger)
            .with_context(|| format!("Failed to read ledger {}", self.ledger.display()))
    }

    pub fn read_prices(&self, fiat: &str) -> anyhow::Result<PriceTable> {
        let reader = BufReader::new(open(&self.prices)?);
        PriceTable::read_csv(fiat, reader)
            .with_context(|| format!("Failed to read prices {}", self.prices.display()))
    }
}

fn open(path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Fiat value rounded half-to-even to cents
pub fn format_fiat(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
    )
}

/// Coin amount rounded to 8 places, without trailing zeros
pub fn format_amount(amount: Decimal) -> String {
    amount
        .round_dp_with_strategy(8, RoundingStrategy::MidpointNearestEven)
        .normalize()
        .to_string()
}
