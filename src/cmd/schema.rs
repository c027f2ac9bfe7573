//! Schema command - print the expected ledger format

use crate::core::{OperationKind, OperationRecord};
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: json-schema, csv-header or csv-fields
    #[arg(value_enum, default_value = "json-schema")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema of a ledger row
    JsonSchema,
    /// CSV header row with column names
    CsvHeader,
    /// CSV column descriptions
    CsvFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => {
                let schema = schema_for!(OperationRecord);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::CsvHeader => println!("{}", OperationRecord::csv_columns().join(",")),
            SchemaFormat::CsvFields => print_csv_fields(),
        }
        Ok(())
    }
}

fn print_csv_fields() {
    println!("Ledger CSV Format");
    println!("=================");
    println!();
    for field in OperationRecord::csv_schema() {
        let req = if field.required { "required" } else { "optional" };
        println!("{:12} ({:8})  {}", field.name, req, field.description);
    }
    println!();
    let kinds: Vec<&str> = OperationKind::ALL.iter().map(|kind| kind.name()).collect();
    println!("Kinds: {}", kinds.join(", "));
}
