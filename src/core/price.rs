use super::balance::SoldCoin;
use super::operation::Operation;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("no {fiat} price for {coin} at or before {utc_time}")]
    MissingPrice {
        coin: String,
        fiat: String,
        utc_time: DateTime<Utc>,
    },
    #[error("negative price {price} for {coin} at {utc_time}")]
    NegativePrice {
        coin: String,
        price: Decimal,
        utc_time: DateTime<Utc>,
    },
    #[error("invalid price row {row}: {message}")]
    InvalidRow { row: usize, message: String },
    #[error("fiat value of {amount} {coin} at {utc_time} is out of range")]
    Overflow {
        coin: String,
        amount: Decimal,
        utc_time: DateTime<Utc>,
    },
}

fn value_of(
    price: Decimal,
    amount: Decimal,
    coin: &str,
    utc_time: DateTime<Utc>,
) -> Result<Decimal, PriceError> {
    price
        .checked_mul(amount)
        .ok_or_else(|| PriceError::Overflow {
            coin: coin.to_string(),
            amount,
            utc_time,
        })
}

/// Fiat valuation of coins at a point in time
pub trait PriceData {
    /// Fiat value of one unit of `coin` at `utc_time`
    fn price(&self, coin: &str, utc_time: DateTime<Utc>) -> Result<Decimal, PriceError>;

    /// Fiat value of everything moved by `op`
    fn get_cost(&self, op: &Operation) -> Result<Decimal, PriceError> {
        let price = self.price(&op.coin, op.utc_time)?;
        value_of(price, op.amount(), &op.coin, op.utc_time)
    }

    /// Fiat value of a consumed lot slice at the time it was acquired
    fn get_sold_cost(&self, sold_coin: &SoldCoin) -> Result<Decimal, PriceError> {
        let origin = &sold_coin.origin;
        let price = self.price(&origin.coin, origin.utc_time)?;
        value_of(price, sold_coin.sold, &origin.coin, origin.utc_time)
    }
}

/// CSV row of a price quote
#[derive(Debug, Clone, Deserialize)]
struct PriceRecord {
    coin: String,
    utc_time: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
}

/// Price quotes per coin, looked up by the latest quote at or before a time
#[derive(Debug, Clone)]
pub struct PriceTable {
    fiat: String,
    quotes: HashMap<String, BTreeMap<DateTime<Utc>, Decimal>>,
}

impl PriceTable {
    pub fn new(fiat: impl Into<String>) -> Self {
        PriceTable {
            fiat: fiat.into().to_uppercase(),
            quotes: HashMap::new(),
        }
    }

    /// Read quotes from CSV with the columns `coin,utc_time,price`
    pub fn read_csv<R: Read>(fiat: impl Into<String>, reader: R) -> Result<Self, PriceError> {
        let mut table = PriceTable::new(fiat);
        let mut rdr = csv::Reader::from_reader(reader);
        for (idx, record) in rdr.deserialize::<PriceRecord>().enumerate() {
            // header is line 1
            let row = idx + 2;
            let record = record.map_err(|e| PriceError::InvalidRow {
                row,
                message: e.to_string(),
            })?;
            table.insert(&record.coin, record.utc_time, record.price)?;
        }
        log::debug!(
            "Loaded {} quotes for {} coin(s)",
            table.quotes.values().map(BTreeMap::len).sum::<usize>(),
            table.quotes.len()
        );
        Ok(table)
    }

    pub fn insert(
        &mut self,
        coin: &str,
        utc_time: DateTime<Utc>,
        price: Decimal,
    ) -> Result<(), PriceError> {
        if price < Decimal::ZERO {
            return Err(PriceError::NegativePrice {
                coin: coin.to_string(),
                price,
                utc_time,
            });
        }
        self.quotes
            .entry(coin.trim().to_uppercase())
            .or_default()
            .insert(utc_time, price);
        Ok(())
    }
}

impl PriceData for PriceTable {
    fn price(&self, coin: &str, utc_time: DateTime<Utc>) -> Result<Decimal, PriceError> {
        let coin = coin.to_uppercase();
        if coin == self.fiat {
            return Ok(Decimal::ONE);
        }
        self.quotes
            .get(&coin)
            .and_then(|quotes| quotes.range(..=utc_time).next_back())
            .map(|(_, price)| *price)
            .ok_or_else(|| PriceError::MissingPrice {
                coin,
                fiat: self.fiat.clone(),
                utc_time,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::tests::{at, op};
    use crate::core::OperationKind;
    use rust_decimal_macros::dec;

    const PRICES: &str = "coin,utc_time,price
BTC,2023-01-01T00:00:00Z,15000
BTC,2023-06-01T00:00:00Z,25000.50
eth,2023-01-01T00:00:00Z,1100
";

    #[test]
    fn lookup_uses_latest_quote_at_or_before() {
        let table = PriceTable::read_csv("EUR", PRICES.as_bytes()).unwrap();
        assert_eq!(table.price("BTC", at(2023, 3, 1)).unwrap(), dec!(15000));
        assert_eq!(table.price("BTC", at(2023, 6, 1)).unwrap(), dec!(25000.50));
        assert_eq!(table.price("btc", at(2024, 1, 1)).unwrap(), dec!(25000.50));
        assert_eq!(table.price("ETH", at(2023, 1, 2)).unwrap(), dec!(1100));
    }

    #[test]
    fn missing_quote_is_an_error() {
        let table = PriceTable::read_csv("EUR", PRICES.as_bytes()).unwrap();
        assert!(matches!(
            table.price("BTC", at(2022, 12, 31)),
            Err(PriceError::MissingPrice { .. })
        ));
        assert!(matches!(
            table.price("DOGE", at(2023, 3, 1)),
            Err(PriceError::MissingPrice { .. })
        ));
    }

    #[test]
    fn fiat_is_worth_one() {
        let table = PriceTable::new("eur");
        assert_eq!(table.price("EUR", at(2023, 3, 1)).unwrap(), Decimal::ONE);
    }

    #[test]
    fn cost_of_operation_and_sold_coin() {
        let table = PriceTable::read_csv("EUR", PRICES.as_bytes()).unwrap();
        let sell = op(OperationKind::Sell, at(2023, 7, 1), "BTC", dec!(-0.5));
        assert_eq!(table.get_cost(&sell).unwrap(), dec!(12500.25));

        let buy = op(OperationKind::Buy, at(2023, 2, 1), "BTC", dec!(2));
        let sold = SoldCoin {
            origin: buy,
            sold: dec!(0.1),
        };
        assert_eq!(table.get_sold_cost(&sold).unwrap(), dec!(1500));
    }

    #[test]
    fn cost_out_of_range_is_an_error() {
        let mut table = PriceTable::new("EUR");
        table.insert("BTC", at(2023, 1, 1), Decimal::MAX).unwrap();
        let sell = op(OperationKind::Sell, at(2023, 7, 1), "BTC", dec!(-2));
        assert!(matches!(
            table.get_cost(&sell),
            Err(PriceError::Overflow { ref coin, .. }) if coin == "BTC"
        ));
    }

    #[test]
    fn invalid_row_reports_line() {
        let csv = "coin,utc_time,price\nBTC,not-a-date,1\n";
        assert!(matches!(
            PriceTable::read_csv("EUR", csv.as_bytes()),
            Err(PriceError::InvalidRow { row: 2, .. })
        ));
    }

    #[test]
    fn negative_price_rejected() {
        let mut table = PriceTable::new("EUR");
        assert!(table.insert("BTC", at(2023, 1, 1), dec!(-1)).is_err());
    }
}
