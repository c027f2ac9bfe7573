use super::balance::{BalanceError, BalanceQueue};
use super::config::{Config, ConfigError};
use super::operation::{sort_operations, Operation, OperationError, OperationKind};
use super::price::{PriceData, PriceError};
use super::warnings::Warning;
use crate::tax::TaxationType;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("{kind} of {coin} at {utc_time} happens after tax year {tax_year}")]
    AfterTaxYear {
        kind: OperationKind,
        coin: String,
        utc_time: DateTime<Utc>,
        tax_year: i32,
    },
    #[error("standalone fee of {coin} at {utc_time}; fees must belong to a buy or sell")]
    StandaloneFee {
        coin: String,
        utc_time: DateTime<Utc>,
    },
    #[error("staking interest in fiat {coin} at {utc_time}; fiat cannot be staked")]
    FiatStaking {
        coin: String,
        utc_time: DateTime<Utc>,
    },
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error(transparent)]
    Price(#[from] PriceError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("evaluating {group}: {source}")]
    Group {
        group: String,
        #[source]
        source: Box<EvaluationError>,
    },
}

/// A computed taxable (or informational) outcome of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxEvent {
    pub taxation_type: TaxationType,
    pub taxed_gain: Decimal,
    /// The sell or income operation that triggered the event
    pub op: Operation,
    /// Fiat value of the disposal (zero for income)
    pub sell_value: Decimal,
    /// Gain before exemptions
    pub real_gain: Decimal,
    pub remark: String,
}

impl TaxEvent {
    /// Income taxed at its full fiat value on receipt
    pub fn income(taxation_type: TaxationType, op: Operation, value: Decimal) -> Self {
        TaxEvent {
            taxation_type,
            taxed_gain: value,
            op,
            sell_value: Decimal::ZERO,
            real_gain: value,
            remark: String::new(),
        }
    }
}

/// Outcome of applying one operation to a balance
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub tax_event: Option<TaxEvent>,
    pub warning: Option<Warning>,
}

impl Transition {
    pub fn none() -> Self {
        Transition::default()
    }

    pub fn event(tax_event: Option<TaxEvent>) -> Self {
        Transition {
            tax_event,
            warning: None,
        }
    }

    pub fn warn(warning: Warning) -> Self {
        Transition {
            tax_event: None,
            warning: Some(warning),
        }
    }
}

/// Everything an evaluator reads besides the balance itself
pub struct Context<'a> {
    pub config: &'a Config,
    pub prices: &'a dyn PriceData,
    /// Date of the virtual sell of all remaining coins
    pub deadline: DateTime<Utc>,
}

impl Context<'_> {
    pub fn in_tax_year(&self, op: &Operation) -> bool {
        op.utc_time.year() == self.config.tax_year
    }

    pub fn is_fiat(&self, coin: &str) -> bool {
        self.config.is_fiat(coin)
    }

    pub fn is_long_term(&self, acquired: DateTime<Utc>, disposed: DateTime<Utc>) -> bool {
        self.config.country.is_long_term(acquired, disposed)
    }
}

/// Result of evaluating one (platform, coin) group
#[derive(Debug, Default)]
pub struct GroupEvaluation {
    pub tax_events: Vec<TaxEvent>,
    pub virtual_tax_event: Option<TaxEvent>,
    pub warnings: Vec<Warning>,
}

/// Jurisdiction specific taxation rules
pub trait Evaluator {
    /// Apply a single operation to the group's balance
    fn apply(
        &self,
        ctx: &Context<'_>,
        balance: &mut BalanceQueue,
        op: &Operation,
    ) -> Result<Transition, EvaluationError>;

    /// Remove a disposal from the balance and compute its gain.
    ///
    /// `force` reports the event even outside the tax year.
    fn evaluate_sell(
        &self,
        ctx: &Context<'_>,
        balance: &mut BalanceQueue,
        op: &Operation,
        force: bool,
    ) -> Result<Option<TaxEvent>, EvaluationError>;

    /// Replay the time-ordered operations of one coin against a fresh balance
    fn evaluate(
        &self,
        ctx: &Context<'_>,
        coin: &str,
        operations: &[Operation],
    ) -> Result<GroupEvaluation, EvaluationError> {
        let mut balance = BalanceQueue::new(coin, ctx.config.principle);
        let mut out = GroupEvaluation::default();

        for op in operations {
            let transition = self.apply(ctx, &mut balance, op)?;
            out.tax_events.extend(transition.tax_event);
            out.warnings.extend(transition.warning);
        }

        balance.sanity_check()?;

        let left = balance.not_sold();
        log::debug!(
            "{} ({}): {} left in {} lots",
            balance.coin(),
            balance.principle(),
            left,
            balance.lots().count()
        );
        if ctx.config.calculate_unrealized_gains && left > Decimal::ZERO {
            let platform = operations
                .last()
                .map(|op| op.platform.clone())
                .unwrap_or_default();
            let virtual_sell = Operation::new(
                OperationKind::Sell,
                ctx.deadline,
                platform,
                coin,
                -left,
                Vec::new(),
                "",
            )?;
            out.virtual_tax_event = self.evaluate_sell(ctx, &mut balance, &virtual_sell, true)?;
        }

        Ok(out)
    }
}

/// Totals for the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub taxed_gain_by_type: BTreeMap<TaxationType, Decimal>,
    /// Fiat value of all remaining coins at the deadline
    pub invested: Decimal,
    pub real_gain: Decimal,
    pub virtual_taxed_gain: Decimal,
    pub deadline: DateTime<Utc>,
}

/// Realized and virtual tax events of a whole ledger
#[derive(Debug)]
pub struct Evaluation {
    pub tax_year: i32,
    pub fiat: String,
    pub deadline: DateTime<Utc>,
    /// Grouped by (platform, coin), not by time
    pub tax_events: Vec<TaxEvent>,
    pub virtual_tax_events: Vec<TaxEvent>,
    pub warnings: Vec<Warning>,
}

impl Evaluation {
    /// Realized events in time order
    pub fn sorted_tax_events(&self) -> Vec<&TaxEvent> {
        let mut events: Vec<_> = self.tax_events.iter().collect();
        events.sort_by_key(|tx| tx.op.utc_time);
        events
    }

    /// False when transfers were skipped and the figures may be off
    pub fn is_complete(&self) -> bool {
        self.warnings.iter().all(|w| !w.is_unresolved_transfer())
    }

    pub fn summary(&self) -> Summary {
        let mut taxed_gain_by_type = BTreeMap::new();
        for tx in &self.tax_events {
            *taxed_gain_by_type
                .entry(tx.taxation_type)
                .or_insert(Decimal::ZERO) += tx.taxed_gain;
        }
        Summary {
            taxed_gain_by_type,
            invested: self.virtual_tax_events.iter().map(|tx| tx.sell_value).sum(),
            real_gain: self.virtual_tax_events.iter().map(|tx| tx.real_gain).sum(),
            virtual_taxed_gain: self.virtual_tax_events.iter().map(|tx| tx.taxed_gain).sum(),
            deadline: self.deadline,
        }
    }
}

/// Drives the jurisdiction's evaluator over every (platform, coin) group
pub struct Taxman<'a> {
    config: Config,
    prices: &'a dyn PriceData,
    evaluator: Box<dyn Evaluator>,
    deadline: DateTime<Utc>,
}

impl<'a> Taxman<'a> {
    pub fn new(
        config: Config,
        prices: &'a dyn PriceData,
        evaluated_at: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let deadline = config.tax_deadline(evaluated_at)?;
        let evaluator = config.country.evaluator();
        Ok(Taxman {
            config,
            prices,
            evaluator,
            deadline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn evaluate_taxation(&self, operations: &[Operation]) -> Result<Evaluation, EvaluationError> {
        log::info!(
            "Evaluating {} operations for {} ({}, {})",
            operations.len(),
            self.config.tax_year,
            self.config.country,
            self.config.principle
        );

        if let Some(op) = operations
            .iter()
            .find(|op| op.utc_time.year() > self.config.tax_year)
        {
            return Err(EvaluationError::AfterTaxYear {
                kind: op.kind,
                coin: op.coin.clone(),
                utc_time: op.utc_time,
                tax_year: self.config.tax_year,
            });
        }

        let ctx = Context {
            config: &self.config,
            prices: self.prices,
            deadline: self.deadline,
        };

        let mut evaluation = Evaluation {
            tax_year: self.config.tax_year,
            fiat: self.config.fiat.clone(),
            deadline: self.deadline,
            tax_events: Vec::new(),
            virtual_tax_events: Vec::new(),
            warnings: Vec::new(),
        };

        for ((platform, coin), mut group) in self.group_operations(operations) {
            sort_operations(&mut group);
            let name = match &platform {
                Some(platform) => format!("{coin} on {platform}"),
                None => coin.clone(),
            };
            log::debug!("Evaluating {} ({} operations)", name, group.len());

            let result = self
                .evaluator
                .evaluate(&ctx, &coin, &group)
                .map_err(|e| EvaluationError::Group {
                    group: name,
                    source: Box::new(e),
                })?;
            evaluation.tax_events.extend(result.tax_events);
            evaluation.virtual_tax_events.extend(result.virtual_tax_event);
            evaluation.warnings.extend(result.warnings);
        }

        Ok(evaluation)
    }

    /// Partition by platform when depots are separate, then by coin
    fn group_operations(
        &self,
        operations: &[Operation],
    ) -> BTreeMap<(Option<String>, String), Vec<Operation>> {
        let mut groups: BTreeMap<_, Vec<Operation>> = BTreeMap::new();
        for op in operations {
            let platform = self.config.multi_depot.then(|| op.platform.clone());
            groups
                .entry((platform, op.coin.clone()))
                .or_default()
                .push(op.clone());
        }
        groups
    }
}
