mod cmd;
mod core;
mod tax;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cointax", version, about = "Lot-matching tax calculator for crypto disposals and income")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a ledger and print and export the tax report
    Report(cmd::report::ReportCommand),
    /// Check a ledger for inconsistencies and unresolved transfers
    Validate(cmd::validate::ValidateCommand),
    /// Print the expected ledger input format
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(report) => report.exec(),
        Command::Validate(validate) => validate.exec(),
        Command::Schema(schema) => schema.exec(),
    }
}
