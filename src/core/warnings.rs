use super::operation::{Operation, OperationKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Data-quality issues that do not stop an evaluation but may skew its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Warning {
    /// Coins arrived from outside the ledger; their acquisition is unknown.
    UnresolvedDeposit {
        platform: String,
        coin: String,
        amount: Decimal,
        utc_time: DateTime<Utc>,
    },
    /// Coins left the ledger; later balances on this platform are too high.
    UnresolvedWithdrawal {
        platform: String,
        coin: String,
        amount: Decimal,
        utc_time: DateTime<Utc>,
    },
}

impl Warning {
    /// Warning for a non-fiat deposit or withdrawal that was skipped
    pub fn unresolved_transfer(op: &Operation) -> Self {
        let platform = op.platform.clone();
        let coin = op.coin.clone();
        let amount = op.amount();
        let utc_time = op.utc_time;
        match op.kind {
            OperationKind::Withdrawal => Warning::UnresolvedWithdrawal {
                platform,
                coin,
                amount,
                utc_time,
            },
            _ => Warning::UnresolvedDeposit {
                platform,
                coin,
                amount,
                utc_time,
            },
        }
    }

    pub fn is_unresolved_transfer(&self) -> bool {
        matches!(
            self,
            Warning::UnresolvedDeposit { .. } | Warning::UnresolvedWithdrawal { .. }
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnresolvedDeposit {
                platform,
                coin,
                amount,
                utc_time,
            } => write!(
                f,
                "Unresolved deposit of {amount} {coin} to {platform} at {utc_time}; \
                 the coins' acquisition is unknown"
            ),
            Warning::UnresolvedWithdrawal {
                platform,
                coin,
                amount,
                utc_time,
            } => write!(
                f,
                "Unresolved withdrawal of {amount} {coin} from {platform} at {utc_time}; \
                 the coins are still counted as held"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::tests::{at, op};
    use rust_decimal_macros::dec;

    #[test]
    fn withdrawal_warning_carries_the_transfer() {
        let withdrawal = op(OperationKind::Withdrawal, at(2023, 2, 1), "BTC", dec!(-0.5));
        let warning = Warning::unresolved_transfer(&withdrawal);
        assert_eq!(
            warning,
            Warning::UnresolvedWithdrawal {
                platform: "kraken".to_string(),
                coin: "BTC".to_string(),
                amount: dec!(0.5),
                utc_time: at(2023, 2, 1),
            }
        );
        assert!(warning.to_string().starts_with("Unresolved withdrawal of 0.5 BTC from kraken"));
    }

    #[test]
    fn serializes_with_type_tag() {
        let deposit = op(OperationKind::Deposit, at(2023, 2, 1), "ETH", dec!(2));
        let json = serde_json::to_value(Warning::unresolved_transfer(&deposit)).unwrap();
        assert_eq!(json["type"], "UnresolvedDeposit");
        assert_eq!(json["coin"], "ETH");
    }
}
