pub mod balance;
pub mod config;
pub mod ledger;
pub mod operation;
pub mod price;
pub mod taxman;
pub mod warnings;

// Flat public surface for domain types and functions.
#[allow(unused_imports)]
pub use balance::{BalanceError, BalanceQueue, Lot, Principle, SoldCoin};
#[allow(unused_imports)]
pub use config::{Config, ConfigError, ConfigFile};
#[allow(unused_imports)]
pub use ledger::{read_ledger, CsvField, LedgerError, OperationRecord};
#[allow(unused_imports)]
pub use operation::{sort_operations, Direction, Operation, OperationError, OperationKind};
#[allow(unused_imports)]
pub use price::{PriceData, PriceError, PriceTable};
#[allow(unused_imports)]
pub use taxman::{
    Context, Evaluation, EvaluationError, Evaluator, GroupEvaluation, Summary, TaxEvent, Taxman,
    Transition,
};
pub use warnings::Warning;
