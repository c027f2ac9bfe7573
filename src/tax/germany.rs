use super::TaxationType;
use crate::core::{
    BalanceQueue, Context, EvaluationError, Evaluator, Operation, OperationKind, TaxEvent,
    Transition, Warning,
};
use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;

/// Private disposals are exempt after a holding period of more than one year
pub fn is_long_term(acquired: DateTime<Utc>, disposed: DateTime<Utc>) -> bool {
    match acquired.checked_add_months(Months::new(12)) {
        Some(threshold) => threshold < disposed,
        None => false,
    }
}

/// Share of `sell_value` for `sold` of `amount` coins. Multiplying first keeps the
/// result exact, dividing first keeps it in range when the product overflows.
fn sell_value_share(sold: Decimal, sell_value: Decimal, amount: Decimal) -> Decimal {
    sold.checked_mul(sell_value)
        .and_then(|product| product.checked_div(amount))
        .unwrap_or_else(|| sold / amount * sell_value)
}

/// German private disposal rules (§ 23 EStG) with income taxed on receipt
pub struct Germany;

impl Germany {
    /// Income from lending, staking or commissions, taxed at its value on receipt
    fn income(
        &self,
        ctx: &Context<'_>,
        balance: &mut BalanceQueue,
        op: &Operation,
        taxation_type: TaxationType,
    ) -> Result<Transition, EvaluationError> {
        balance.add(op)?;
        if !ctx.in_tax_year(op) {
            return Ok(Transition::none());
        }
        let value = ctx.prices.get_cost(op)?;
        Ok(Transition::event(Some(TaxEvent::income(
            taxation_type,
            op.clone(),
            value,
        ))))
    }
}

impl Evaluator for Germany {
    fn apply(
        &self,
        ctx: &Context<'_>,
        balance: &mut BalanceQueue,
        op: &Operation,
    ) -> Result<Transition, EvaluationError> {
        match op.kind {
            OperationKind::Buy | OperationKind::Airdrop => {
                balance.add(op)?;
                Ok(Transition::none())
            }
            OperationKind::Sell => Ok(Transition::event(
                self.evaluate_sell(ctx, balance, op, false)?,
            )),
            OperationKind::CoinLend
            | OperationKind::CoinLendEnd
            | OperationKind::Staking
            | OperationKind::StakingEnd => Ok(Transition::none()),
            OperationKind::CoinLendInterest => {
                let taxation_type = if ctx.is_fiat(&op.coin) {
                    TaxationType::CapitalIncome
                } else {
                    TaxationType::OtherServices
                };
                self.income(ctx, balance, op, taxation_type)
            }
            OperationKind::StakingInterest => {
                if ctx.is_fiat(&op.coin) {
                    return Err(EvaluationError::FiatStaking {
                        coin: op.coin.clone(),
                        utc_time: op.utc_time,
                    });
                }
                self.income(ctx, balance, op, TaxationType::OtherServices)
            }
            OperationKind::Commission => {
                self.income(ctx, balance, op, TaxationType::OtherServices)
            }
            OperationKind::Deposit if ctx.is_fiat(&op.coin) => {
                balance.add(op)?;
                Ok(Transition::none())
            }
            OperationKind::Withdrawal if ctx.is_fiat(&op.coin) => {
                balance.remove(op)?;
                Ok(Transition::none())
            }
            OperationKind::Deposit | OperationKind::Withdrawal => {
                let warning = Warning::unresolved_transfer(op);
                log::warn!("{}", warning);
                Ok(Transition::warn(warning))
            }
            OperationKind::Fee => Err(EvaluationError::StandaloneFee {
                coin: op.coin.clone(),
                utc_time: op.utc_time,
            }),
        }
    }

    fn evaluate_sell(
        &self,
        ctx: &Context<'_>,
        balance: &mut BalanceQueue,
        op: &Operation,
        force: bool,
    ) -> Result<Option<TaxEvent>, EvaluationError> {
        let sold_coins = balance.remove(op)?;

        if ctx.is_fiat(&op.coin) || (!ctx.in_tax_year(op) && !force) {
            return Ok(None);
        }

        let sell_value = ctx.prices.get_cost(op)?;
        let amount = op.amount();
        let unrealized = ctx.config.calculate_unrealized_gains;
        let mut taxed_gain = Decimal::ZERO;
        let mut real_gain = Decimal::ZERO;

        for sc in &sold_coins {
            let exempt_income = sc.origin.kind.is_income_origin() && !ctx.is_fiat(&sc.origin.coin);
            let is_taxable = !ctx.is_long_term(sc.origin.utc_time, op.utc_time) && !exempt_income;

            // Pricing old lots is skipped when nothing would use the result
            if !is_taxable && !unrealized {
                continue;
            }
            let partial_sell_value = sell_value_share(sc.sold, sell_value, amount);
            let gain = partial_sell_value - ctx.prices.get_sold_cost(sc)?;
            if is_taxable {
                taxed_gain += gain;
            }
            if unrealized {
                real_gain += gain;
            }
        }

        let remark = sold_coins
            .iter()
            .map(|sc| {
                format!(
                    "{} from {} ({})",
                    sc.sold.normalize(),
                    sc.origin.utc_time.format("%Y-%m-%d %H:%M:%S"),
                    sc.origin.kind
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        log::debug!(
            "{} {} {} at {}: sell value {}, taxed gain {}",
            op.kind,
            amount,
            op.coin,
            op.utc_time,
            sell_value,
            taxed_gain
        );

        Ok(Some(TaxEvent {
            taxation_type: TaxationType::OtherIncome,
            taxed_gain,
            op: op.clone(),
            sell_value,
            real_gain,
            remark,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::tests::{at, op};
    use crate::core::{BalanceError, Config, PriceTable, Principle};
    use rust_decimal_macros::dec;

    fn config(unrealized: bool) -> Config {
        let mut config = Config::new(2023);
        config.calculate_unrealized_gains = unrealized;
        config
    }

    fn prices() -> PriceTable {
        let mut table = PriceTable::new("EUR");
        table.insert("BTC", at(2021, 1, 1), dec!(20)).unwrap();
        table.insert("BTC", at(2023, 1, 1), dec!(100)).unwrap();
        table.insert("BTC", at(2023, 6, 1), dec!(150)).unwrap();
        table.insert("ETH", at(2023, 1, 1), dec!(10)).unwrap();
        table
    }

    fn run(config: &Config, ops: &[Operation]) -> Result<Vec<Transition>, EvaluationError> {
        run_with(config, &prices(), ops)
    }

    fn run_with(
        config: &Config,
        prices: &PriceTable,
        ops: &[Operation],
    ) -> Result<Vec<Transition>, EvaluationError> {
        let ctx = Context {
            config,
            prices,
            deadline: at(2023, 12, 31),
        };
        let mut balance = BalanceQueue::new(ops[0].coin.clone(), config.principle);
        ops.iter()
            .map(|op| Germany.apply(&ctx, &mut balance, op))
            .collect()
    }

    fn events(transitions: Vec<Transition>) -> Vec<TaxEvent> {
        transitions.into_iter().filter_map(|t| t.tax_event).collect()
    }

    #[test]
    fn long_term_needs_more_than_a_year() {
        assert!(!is_long_term(at(2022, 3, 1), at(2023, 3, 1)));
        assert!(is_long_term(at(2022, 3, 1), at(2023, 3, 2)));
        assert!(!is_long_term(at(2023, 1, 1), at(2023, 6, 1)));
    }

    #[test]
    fn short_term_sell_is_taxed() {
        let events = events(
            run(
                &config(false),
                &[
                    op(OperationKind::Buy, at(2023, 1, 1), "BTC", dec!(1)),
                    op(OperationKind::Sell, at(2023, 6, 1), "BTC", dec!(-1)),
                ],
            )
            .unwrap(),
        );
        assert_eq!(events.len(), 1);
        let tx = &events[0];
        assert_eq!(tx.taxation_type, TaxationType::OtherIncome);
        assert_eq!(tx.taxed_gain, dec!(50));
        assert_eq!(tx.sell_value, dec!(150));
        assert_eq!(tx.remark, "1 from 2023-01-01 12:00:00 (Buy)");
    }

    #[test]
    fn long_term_sell_is_exempt_but_tracked() {
        let events = events(
            run(
                &config(true),
                &[
                    op(OperationKind::Buy, at(2021, 1, 1), "BTC", dec!(1)),
                    op(OperationKind::Sell, at(2023, 6, 1), "BTC", dec!(-1)),
                ],
            )
            .unwrap(),
        );
        assert_eq!(events[0].taxed_gain, dec!(0));
        assert_eq!(events[0].real_gain, dec!(130));
        assert!(events[0].taxed_gain <= events[0].real_gain);
    }

    #[test]
    fn partial_sell_splits_value_across_lots() {
        let events = events(
            run(
                &config(true),
                &[
                    op(OperationKind::Buy, at(2021, 1, 1), "BTC", dec!(1)),
                    op(OperationKind::Buy, at(2023, 1, 1), "BTC", dec!(1)),
                    op(OperationKind::Sell, at(2023, 6, 1), "BTC", dec!(-1.5)),
                ],
            )
            .unwrap(),
        );
        let tx = &events[0];
        assert_eq!(tx.sell_value, dec!(225));
        // only the half coin from 2023 is short-term: 75 - 50
        assert_eq!(tx.taxed_gain, dec!(25));
        // plus 150 - 20 from the old lot
        assert_eq!(tx.real_gain, dec!(155));
    }

    #[test]
    fn sell_outside_tax_year_has_no_event() {
        let transitions = run(
            &config(false),
            &[
                op(OperationKind::Buy, at(2021, 1, 1), "BTC", dec!(1)),
                op(OperationKind::Sell, at(2022, 1, 1), "BTC", dec!(-0.5)),
            ],
        )
        .unwrap();
        assert!(events(transitions).is_empty());
    }

    #[test]
    fn airdropped_coins_are_exempt_on_disposal() {
        let events = events(
            run(
                &config(false),
                &[
                    op(OperationKind::Airdrop, at(2023, 1, 1), "BTC", dec!(1)),
                    op(OperationKind::Sell, at(2023, 6, 1), "BTC", dec!(-1)),
                ],
            )
            .unwrap(),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].taxed_gain, dec!(0));
    }

    #[test]
    fn interest_is_income_on_receipt() {
        let events = events(
            run(
                &config(false),
                &[
                    op(OperationKind::CoinLendInterest, at(2023, 1, 1), "ETH", dec!(2)),
                    op(OperationKind::StakingInterest, at(2023, 2, 1), "ETH", dec!(1)),
                    op(OperationKind::Commission, at(2023, 3, 1), "ETH", dec!(3)),
                ],
            )
            .unwrap(),
        );
        let gains: Vec<_> = events
            .iter()
            .map(|tx| (tx.taxation_type, tx.taxed_gain, tx.sell_value))
            .collect();
        assert_eq!(
            gains,
            vec![
                (TaxationType::OtherServices, dec!(20), dec!(0)),
                (TaxationType::OtherServices, dec!(10), dec!(0)),
                (TaxationType::OtherServices, dec!(30), dec!(0)),
            ]
        );
    }

    #[test]
    fn fiat_interest_is_capital_income() {
        let events = events(
            run(
                &config(false),
                &[op(OperationKind::CoinLendInterest, at(2023, 1, 1), "EUR", dec!(5))],
            )
            .unwrap(),
        );
        assert_eq!(events[0].taxation_type, TaxationType::CapitalIncome);
        assert_eq!(events[0].taxed_gain, dec!(5));
    }

    #[test]
    fn fiat_staking_is_rejected() {
        let err = run(
            &config(false),
            &[op(OperationKind::StakingInterest, at(2023, 1, 1), "EUR", dec!(5))],
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::FiatStaking { .. }));
    }

    #[test]
    fn standalone_fee_is_fatal() {
        let err = run(
            &config(false),
            &[
                op(OperationKind::Buy, at(2023, 1, 1), "BTC", dec!(1)),
                op(OperationKind::Fee, at(2023, 1, 2), "BTC", dec!(-0.1)),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::StandaloneFee { .. }));
    }

    #[test]
    fn crypto_transfers_are_skipped_with_a_warning() {
        let transitions = run(
            &config(false),
            &[
                op(OperationKind::Deposit, at(2023, 1, 1), "BTC", dec!(1)),
                op(OperationKind::Withdrawal, at(2023, 1, 2), "BTC", dec!(-1)),
            ],
        )
        .unwrap();
        assert!(transitions.iter().all(|t| t.tax_event.is_none()));
        assert!(transitions.iter().all(|t| t.warning.is_some()));
    }

    #[test]
    fn fiat_transfers_move_the_balance() {
        let ops = [
            op(OperationKind::Deposit, at(2023, 1, 1), "EUR", dec!(100)),
            op(OperationKind::Withdrawal, at(2023, 1, 2), "EUR", dec!(-100)),
            op(OperationKind::Withdrawal, at(2023, 1, 3), "EUR", dec!(-1)),
        ];
        let err = run(&config(false), &ops).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Balance(BalanceError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn custody_changes_are_no_ops() {
        let transitions = run(
            &config(false),
            &[
                op(OperationKind::Buy, at(2023, 1, 1), "BTC", dec!(1)),
                op(OperationKind::Staking, at(2023, 1, 2), "BTC", dec!(-1)),
                op(OperationKind::StakingEnd, at(2023, 1, 3), "BTC", dec!(1)),
                op(OperationKind::CoinLend, at(2023, 1, 4), "BTC", dec!(-1)),
                op(OperationKind::CoinLendEnd, at(2023, 1, 5), "BTC", dec!(1)),
            ],
        )
        .unwrap();
        assert!(transitions.iter().all(|t| *t == Transition::none()));
    }

    #[test]
    fn income_before_tax_year_adds_lots_without_events() {
        let transitions = run(
            &config(false),
            &[
                op(OperationKind::CoinLendInterest, at(2022, 6, 1), "ETH", dec!(1)),
                op(OperationKind::StakingInterest, at(2022, 7, 1), "ETH", dec!(1)),
                op(OperationKind::Commission, at(2022, 8, 1), "ETH", dec!(1)),
                op(OperationKind::Sell, at(2023, 6, 1), "ETH", dec!(-3)),
            ],
        )
        .unwrap();
        assert!(transitions[..3].iter().all(|t| *t == Transition::none()));

        // the sell is covered by the three income lots, which are exempt
        let events = events(transitions);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op.kind, OperationKind::Sell);
        assert_eq!(events[0].sell_value, dec!(30));
        assert_eq!(events[0].taxed_gain, dec!(0));
    }

    #[test]
    fn lifo_sell_uses_newest_lot() {
        let ops = [
            op(OperationKind::Buy, at(2021, 1, 1), "BTC", dec!(1)),
            op(OperationKind::Buy, at(2023, 1, 1), "BTC", dec!(1)),
            op(OperationKind::Sell, at(2023, 6, 1), "BTC", dec!(-1)),
        ];

        let mut lifo = config(false);
        lifo.principle = Principle::Lifo;
        let events = events(run(&lifo, &ops).unwrap());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sell_value, dec!(150));
        assert_eq!(events[0].taxed_gain, dec!(50));
        assert_eq!(events[0].remark, "1 from 2023-01-01 12:00:00 (Buy)");

        // the same ledger under FIFO sells the long-held coin
        let fifo = self::events(run(&config(false), &ops).unwrap());
        assert_eq!(fifo[0].taxed_gain, dec!(0));
        assert_eq!(fifo[0].remark, "1 from 2021-01-01 12:00:00 (Buy)");
    }

    #[test]
    fn huge_sell_value_does_not_overflow() {
        let amount = Decimal::from(100_000_000_000_000i64);
        let mut prices = PriceTable::new("EUR");
        prices.insert("BTC", at(2023, 1, 1), dec!(1)).unwrap();
        prices.insert("BTC", at(2023, 6, 1), amount).unwrap();

        let events = events(
            run_with(
                &config(false),
                &prices,
                &[
                    op(OperationKind::Buy, at(2023, 1, 1), "BTC", amount),
                    op(OperationKind::Sell, at(2023, 6, 1), "BTC", -amount),
                ],
            )
            .unwrap(),
        );
        let sell_value = Decimal::from_i128_with_scale(10i128.pow(28), 0);
        assert_eq!(events[0].sell_value, sell_value);
        assert_eq!(events[0].taxed_gain, sell_value - amount);
    }

    #[test]
    fn sell_value_share_is_exact_when_in_range() {
        assert_eq!(sell_value_share(dec!(1), dec!(100), dec!(3)), dec!(100) / dec!(3));
        assert_eq!(sell_value_share(dec!(0.5), dec!(225), dec!(1.5)), dec!(75));
    }
}
