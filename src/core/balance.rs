use super::operation::{Direction, Operation, OperationKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BalanceError {
    #[error("{kind} of {coin} at {utc_time} does not add a positive amount ({change})")]
    NonPositiveAcquisition {
        kind: OperationKind,
        coin: String,
        change: Decimal,
        utc_time: DateTime<Utc>,
    },
    #[error(
        "insufficient {coin} balance at {utc_time}: {required} required, {available} available \
         (missing acquisitions or unresolved deposits?)"
    )]
    InsufficientBalance {
        coin: String,
        required: Decimal,
        available: Decimal,
        utc_time: DateTime<Utc>,
    },
    #[error("corrupted {coin} balance: not sold {not_sold}, lots hold {lots_total}")]
    Corrupted {
        coin: String,
        not_sold: Decimal,
        lots_total: Decimal,
    },
}

/// Order in which lots are consumed by a disposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Principle {
    /// Oldest acquisition first
    #[default]
    Fifo,
    /// Newest acquisition first
    Lifo,
}

impl fmt::Display for Principle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principle::Fifo => f.write_str("FIFO"),
            Principle::Lifo => f.write_str("LIFO"),
        }
    }
}

/// A slice of a prior acquisition still available for disposals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lot {
    pub origin: Operation,
    pub total: Decimal,
    pub remaining: Decimal,
}

/// Part of a lot consumed by a single disposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoldCoin {
    pub origin: Operation,
    pub sold: Decimal,
}

/// Open acquisition lots of one coin in one evaluation group
#[derive(Debug, Clone)]
pub struct BalanceQueue {
    coin: String,
    principle: Principle,
    /// Ordered by `origin.utc_time`, oldest at the front
    lots: VecDeque<Lot>,
    not_sold: Decimal,
}

impl BalanceQueue {
    pub fn new(coin: impl Into<String>, principle: Principle) -> Self {
        BalanceQueue {
            coin: coin.into(),
            principle,
            lots: VecDeque::new(),
            not_sold: Decimal::ZERO,
        }
    }

    pub fn coin(&self) -> &str {
        &self.coin
    }

    pub fn principle(&self) -> Principle {
        self.principle
    }

    /// Sum of the remaining amount of every open lot
    pub fn not_sold(&self) -> Decimal {
        self.not_sold
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    /// Open a new lot for an acquisition
    pub fn add(&mut self, op: &Operation) -> Result<(), BalanceError> {
        if op.direction() != Direction::Acquisition || op.change <= Decimal::ZERO {
            return Err(BalanceError::NonPositiveAcquisition {
                kind: op.kind,
                coin: op.coin.clone(),
                change: op.change,
                utc_time: op.utc_time,
            });
        }

        // After every lot acquired at or before this time, so equal
        // timestamps keep their booking order.
        let idx = self
            .lots
            .partition_point(|lot| lot.origin.utc_time <= op.utc_time);
        self.lots.insert(
            idx,
            Lot {
                origin: op.clone(),
                total: op.change,
                remaining: op.change,
            },
        );
        self.not_sold += op.change;
        log::debug!(
            "Balance {} ADD {} ({}) at {}. Not sold: {}",
            self.coin,
            op.change,
            op.kind,
            op.utc_time,
            self.not_sold
        );
        Ok(())
    }

    /// Consume `abs(op.change)` coins for a disposal
    pub fn remove(&mut self, op: &Operation) -> Result<Vec<SoldCoin>, BalanceError> {
        self.consume(op.amount(), op.utc_time)
    }

    /// Consume coins for a fee that is not itself a disposal with a gain
    #[allow(dead_code)]
    pub fn remove_fee(
        &mut self,
        amount: Decimal,
        utc_time: DateTime<Utc>,
    ) -> Result<Vec<SoldCoin>, BalanceError> {
        self.consume(amount.abs(), utc_time)
    }

    fn consume(
        &mut self,
        amount: Decimal,
        utc_time: DateTime<Utc>,
    ) -> Result<Vec<SoldCoin>, BalanceError> {
        if amount > self.not_sold {
            return Err(BalanceError::InsufficientBalance {
                coin: self.coin.clone(),
                required: amount,
                available: self.not_sold,
                utc_time,
            });
        }

        let mut sold_coins = Vec::new();
        let mut needed = amount;
        while needed > Decimal::ZERO {
            let lot = match self.principle {
                Principle::Fifo => self.lots.front_mut(),
                Principle::Lifo => self.lots.back_mut(),
            };
            // not_sold covers `needed`, so a lot is always left here
            let Some(lot) = lot else { break };

            let sold = lot.remaining.min(needed);
            lot.remaining -= sold;
            needed -= sold;
            sold_coins.push(SoldCoin {
                origin: lot.origin.clone(),
                sold,
            });

            if lot.remaining.is_zero() {
                match self.principle {
                    Principle::Fifo => self.lots.pop_front(),
                    Principle::Lifo => self.lots.pop_back(),
                };
            }
        }
        self.not_sold -= amount;

        log::debug!(
            "Balance {} REMOVE {} at {} from {} lot(s). Not sold: {}",
            self.coin,
            amount,
            utc_time,
            sold_coins.len(),
            self.not_sold
        );
        Ok(sold_coins)
    }

    /// Check the accounting invariants of the queue
    pub fn sanity_check(&self) -> Result<(), BalanceError> {
        let lots_total: Decimal = self.lots.iter().map(|lot| lot.remaining).sum();
        let lot_out_of_range = self
            .lots
            .iter()
            .any(|lot| lot.remaining < Decimal::ZERO || lot.remaining > lot.total);

        if self.not_sold < Decimal::ZERO || lot_out_of_range || lots_total != self.not_sold {
            return Err(BalanceError::Corrupted {
                coin: self.coin.clone(),
                not_sold: self.not_sold,
                lots_total,
            });
        }
        Ok(())
    }
}
