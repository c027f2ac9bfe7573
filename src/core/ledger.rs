use super::operation::{Operation, OperationError, OperationKind};
use chrono::{DateTime, Utc};
use cointax_derive::CsvSchema;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger row {row}: {source}")]
    Csv {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("ledger row {row}: {source}")]
    Operation {
        row: usize,
        #[source]
        source: OperationError,
    },
    #[error("ledger row {row}: invalid raw id '{value}'")]
    RawId { row: usize, value: String },
    #[error("ledger header is missing the required column '{0}'")]
    MissingColumn(&'static str),
}

/// Description of one column of a CSV input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvField {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// One row of a normalized ledger CSV
#[derive(Debug, Clone, Deserialize, JsonSchema, CsvSchema)]
pub struct OperationRecord {
    /// Time of the operation in RFC 3339, e.g. 2023-01-31T12:00:00Z
    pub utc_time: DateTime<Utc>,
    /// Operation kind, e.g. Buy, Sell, Airdrop, StakingInterest
    #[schemars(with = "OperationKind")]
    pub kind: String,
    /// Exchange or wallet the operation happened on
    pub platform: String,
    /// Coin symbol, case insensitive
    pub coin: String,
    /// Signed amount: positive for acquisitions, negative for disposals
    #[serde(with = "rust_decimal::serde::str")]
    #[schemars(with = "String")]
    pub change: Decimal,
    /// Semicolon separated row ids in the exchange export
    #[serde(default)]
    pub raw_ids: String,
}

impl OperationRecord {
    fn into_operation(self, row: usize, source_file: &Path) -> Result<Operation, LedgerError> {
        let kind = self
            .kind
            .parse::<OperationKind>()
            .map_err(|source| LedgerError::Operation { row, source })?;
        let raw_ids = self
            .raw_ids
            .split(';')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<usize>().map_err(|_| LedgerError::RawId {
                    row,
                    value: id.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Operation::new(
            kind,
            self.utc_time,
            self.platform.trim(),
            self.coin.trim().to_uppercase(),
            self.change,
            raw_ids,
            source_file,
        )
        .map_err(|source| LedgerError::Operation { row, source })
    }
}

/// Read every operation of a normalized ledger CSV, in file order
pub fn read_ledger<R: Read>(
    reader: R,
    source_file: impl AsRef<Path>,
) -> Result<Vec<Operation>, LedgerError> {
    let source_file = source_file.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|source| LedgerError::Csv { row: 1, source })?;
    if let Some(field) = OperationRecord::csv_schema()
        .iter()
        .find(|field| field.required && !headers.iter().any(|h| h == field.name))
    {
        return Err(LedgerError::MissingColumn(field.name));
    }

    let mut operations = Vec::new();
    for (idx, record) in rdr.deserialize::<OperationRecord>().enumerate() {
        let row = idx + 2;
        let record = record.map_err(|source| LedgerError::Csv { row, source })?;
        operations.push(record.into_operation(row, source_file)?);
    }
    log::debug!(
        "Read {} operations from {}",
        operations.len(),
        source_file.display()
    );
    Ok(operations)
}
