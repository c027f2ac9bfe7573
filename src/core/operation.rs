use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("unknown operation kind: {0}")]
    UnknownKind(String),
    #[error("{kind} of {coin} must not have a zero change")]
    ZeroChange { kind: OperationKind, coin: String },
    #[error("{kind} of {coin} has change {change}, expected a {expected} amount")]
    SignMismatch {
        kind: OperationKind,
        coin: String,
        change: Decimal,
        expected: &'static str,
    },
}

/// Whether an operation brings coins into the balance or takes them out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Acquisition,
    Disposal,
}

/// Kind of a ledger entry
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum OperationKind {
    Buy,
    Sell,
    Fee,
    Deposit,
    Withdrawal,
    Airdrop,
    Commission,
    CoinLend,
    CoinLendEnd,
    /// Cold staking or proof of stake (not mining)
    Staking,
    StakingEnd,
    CoinLendInterest,
    StakingInterest,
}

impl OperationKind {
    pub const ALL: [OperationKind; 13] = [
        OperationKind::Buy,
        OperationKind::Sell,
        OperationKind::Fee,
        OperationKind::Deposit,
        OperationKind::Withdrawal,
        OperationKind::Airdrop,
        OperationKind::Commission,
        OperationKind::CoinLend,
        OperationKind::CoinLendEnd,
        OperationKind::Staking,
        OperationKind::StakingEnd,
        OperationKind::CoinLendInterest,
        OperationKind::StakingInterest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Buy => "Buy",
            OperationKind::Sell => "Sell",
            OperationKind::Fee => "Fee",
            OperationKind::Deposit => "Deposit",
            OperationKind::Withdrawal => "Withdrawal",
            OperationKind::Airdrop => "Airdrop",
            OperationKind::Commission => "Commission",
            OperationKind::CoinLend => "CoinLend",
            OperationKind::CoinLendEnd => "CoinLendEnd",
            OperationKind::Staking => "Staking",
            OperationKind::StakingEnd => "StakingEnd",
            OperationKind::CoinLendInterest => "CoinLendInterest",
            OperationKind::StakingInterest => "StakingInterest",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            OperationKind::Buy
            | OperationKind::CoinLendEnd
            | OperationKind::StakingEnd
            | OperationKind::CoinLendInterest
            | OperationKind::StakingInterest
            | OperationKind::Airdrop
            | OperationKind::Commission
            | OperationKind::Deposit => Direction::Acquisition,
            OperationKind::Fee
            | OperationKind::CoinLend
            | OperationKind::Staking
            | OperationKind::Sell
            | OperationKind::Withdrawal => Direction::Disposal,
        }
    }

    /// Coins that were received as income rather than bought
    pub fn is_income_origin(self) -> bool {
        matches!(
            self,
            OperationKind::Airdrop
                | OperationKind::CoinLendInterest
                | OperationKind::StakingInterest
                | OperationKind::Commission
        )
    }

    /// Booking order for operations sharing a timestamp.
    ///
    /// Everything that adds to a balance comes before anything that takes
    /// from it.
    fn booking_rank(self) -> u8 {
        match self {
            OperationKind::CoinLendEnd => 0,
            OperationKind::StakingEnd => 1,
            OperationKind::Buy => 2,
            OperationKind::CoinLendInterest => 3,
            OperationKind::StakingInterest => 4,
            OperationKind::Airdrop => 5,
            OperationKind::Commission => 6,
            OperationKind::Deposit => 7,
            OperationKind::Fee => 8,
            OperationKind::CoinLend => 9,
            OperationKind::Staking => 10,
            OperationKind::Sell => 11,
            OperationKind::Withdrawal => 12,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        OperationKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| OperationError::UnknownKind(s.to_string()))
    }
}

/// A normalized ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub utc_time: DateTime<Utc>,
    pub platform: String,
    pub coin: String,
    /// Positive when coins were acquired, negative when disposed
    pub change: Decimal,
    /// Rows in the source file this operation was built from
    pub raw_ids: Vec<usize>,
    pub source_file: PathBuf,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        utc_time: DateTime<Utc>,
        platform: impl Into<String>,
        coin: impl Into<String>,
        change: Decimal,
        raw_ids: Vec<usize>,
        source_file: impl Into<PathBuf>,
    ) -> Result<Self, OperationError> {
        let coin = coin.into();
        if change.is_zero() {
            return Err(OperationError::ZeroChange { kind, coin });
        }
        let expected = match kind.direction() {
            Direction::Acquisition if change.is_sign_negative() => Some("positive"),
            Direction::Disposal if change.is_sign_positive() => Some("negative"),
            _ => None,
        };
        if let Some(expected) = expected {
            return Err(OperationError::SignMismatch {
                kind,
                coin,
                change,
                expected,
            });
        }

        Ok(Operation {
            kind,
            utc_time,
            platform: platform.into(),
            coin,
            change,
            raw_ids,
            source_file: source_file.into(),
        })
    }

    /// Absolute amount of coins moved
    pub fn amount(&self) -> Decimal {
        self.change.abs()
    }

    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }
}

/// Sort operations by time, booking acquisitions before disposals when the
/// timestamps are equal. The sort is stable.
pub fn sort_operations(operations: &mut [Operation]) {
    operations.sort_by(booking_order);
}

fn booking_order(a: &Operation, b: &Operation) -> Ordering {
    a.utc_time
        .cmp(&b.utc_time)
        .then_with(|| a.kind.booking_rank().cmp(&b.kind.booking_rank()))
}
