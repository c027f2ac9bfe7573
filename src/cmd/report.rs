//! Report command - evaluate a ledger, print the summary and export the tax events

use crate::cmd::{format_amount, format_fiat, InputArgs};
use crate::core::{Config, Evaluation, TaxEvent, Taxman, Warning};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Highest export revision per tax year
const MAX_REVISION: u32 = 999;

#[derive(Args, Debug)]
pub struct ReportCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Write the detailed tax events to <DIR>/<year>_revNNN.csv
    #[arg(short, long)]
    export_dir: Option<PathBuf>,

    /// Output as JSON instead of formatted tables
    #[arg(long)]
    json: bool,
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let config = self.input.config()?;
        let operations = self.input.read_operations()?;
        let prices = self.input.read_prices(&config.fiat)?;

        let taxman = Taxman::new(config, &prices, Utc::now())?;
        let evaluation = taxman.evaluate_taxation(&operations)?;
        if !evaluation.is_complete() {
            log::warn!(
                "{} unresolved transfer(s); gains may be inaccurate. Run `validate` for details.",
                evaluation.warnings.len()
            );
        }

        if self.json {
            self.print_json(taxman.config(), &evaluation)?;
        } else {
            self.print_summary(taxman.config(), &evaluation);
        }

        if let Some(dir) = &self.export_dir {
            let digest = file_digest(&self.input.ledger)?;
            let path = export_csv(&evaluation, dir, &digest)?;
            log::info!("Saved evaluation in {}", path.display());
        }
        Ok(())
    }

    fn print_summary(&self, config: &Config, evaluation: &Evaluation) {
        let fiat = &evaluation.fiat;
        let summary = evaluation.summary();

        println!();
        println!(
            "TAX EVALUATION {} ({}, {}{})",
            evaluation.tax_year,
            config.country,
            config.principle,
            if config.multi_depot { ", multi-depot" } else { "" }
        );
        println!();

        if evaluation.tax_events.is_empty() {
            println!("No tax events in {}.", evaluation.tax_year);
        } else {
            let rows: Vec<EventRow> = evaluation
                .sorted_tax_events()
                .into_iter()
                .map(EventRow::from)
                .collect();
            print_table(rows, 4..8);
            println!();

            let totals: Vec<TotalRow> = summary
                .taxed_gain_by_type
                .iter()
                .map(|(taxation_type, taxed_gain)| TotalRow {
                    taxation_type: taxation_type.to_string(),
                    taxed_gain: format!("{} {}", format_fiat(*taxed_gain), fiat),
                })
                .collect();
            print_table(totals, 1..2);
        }

        if !evaluation.virtual_tax_events.is_empty() {
            let deadline = summary.deadline.format("%Y-%m-%d %H:%M:%S");
            println!();
            println!("UNREALIZED GAINS (deadline {} UTC)", deadline);
            println!(
                "  Invested: {} {} | Gain if sold: {} {} | Taxed: {} {}",
                format_fiat(summary.invested),
                fiat,
                format_fiat(summary.real_gain),
                fiat,
                format_fiat(summary.virtual_taxed_gain),
                fiat
            );
            println!();

            let mut portfolio: Vec<&TaxEvent> = evaluation.virtual_tax_events.iter().collect();
            portfolio.sort_by(|a, b| b.sell_value.cmp(&a.sell_value));
            let rows: Vec<PortfolioRow> = portfolio.into_iter().map(PortfolioRow::from).collect();
            print_table(rows, 2..6);
        }

        if !evaluation.warnings.is_empty() {
            println!();
            println!("\u{26A0} {} warning(s):", evaluation.warnings.len());
            for warning in &evaluation.warnings {
                println!("  {}", warning);
            }
        }
        println!();
    }

    fn print_json(&self, config: &Config, evaluation: &Evaluation) -> anyhow::Result<()> {
        let summary = evaluation.summary();
        let output = ReportOutput {
            tax_year: evaluation.tax_year,
            country: config.country.to_string(),
            principle: config.principle.to_string(),
            fiat: evaluation.fiat.clone(),
            complete: evaluation.is_complete(),
            taxed_gain_by_type: summary
                .taxed_gain_by_type
                .iter()
                .map(|(taxation_type, taxed_gain)| TypeTotal {
                    taxation_type: taxation_type.label().to_string(),
                    taxed_gain: format_fiat(*taxed_gain),
                })
                .collect(),
            tax_events: evaluation
                .sorted_tax_events()
                .into_iter()
                .map(TaxEventView::from)
                .collect(),
            unrealized: (!evaluation.virtual_tax_events.is_empty()).then(|| UnrealizedView {
                deadline: summary.deadline.to_rfc3339(),
                invested: format_fiat(summary.invested),
                real_gain: format_fiat(summary.real_gain),
                taxed_gain: format_fiat(summary.virtual_taxed_gain),
                portfolio: evaluation
                    .virtual_tax_events
                    .iter()
                    .map(TaxEventView::from)
                    .collect(),
            }),
            warnings: &evaluation.warnings,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

fn print_table<R: Tabled>(rows: Vec<R>, numeric: std::ops::Range<usize>) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(numeric)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
}

/// SHA-256 of a file as lower case hex
pub fn file_digest(path: &Path) -> anyhow::Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// `<year>_revNNN.csv` one past the highest revision already in `dir`
pub fn next_export_path(dir: &Path, tax_year: i32) -> anyhow::Result<PathBuf> {
    let prefix = format!("{}_rev", tax_year);
    let latest = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let rev = name
                    .to_str()?
                    .strip_prefix(&prefix)?
                    .strip_suffix(".csv")?;
                if rev.len() != 3 {
                    return None;
                }
                rev.parse::<u32>().ok()
            })
            .max()
            .unwrap_or(0),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to list {}", dir.display()))
        }
    };
    if latest >= MAX_REVISION {
        anyhow::bail!(
            "All {} export revisions for {} in {} are taken",
            MAX_REVISION,
            tax_year,
            dir.display()
        );
    }
    Ok(dir.join(format!("{}_rev{:03}.csv", tax_year, latest + 1)))
}

pub fn export_csv(evaluation: &Evaluation, dir: &Path, digest: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = next_export_path(dir, evaluation.tax_year)?;
    let file =
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_export(evaluation, file, digest, Utc::now().date_naive())?;
    Ok(path)
}

/// Metadata rows, header and the realized tax events in time order
pub fn write_export<W: Write>(
    evaluation: &Evaluation,
    writer: W,
    digest: &str,
    updated: NaiveDate,
) -> anyhow::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    let software = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    wtr.write_record(["# software", software.as_str()])?;
    wtr.write_record(["# input sha256", digest])?;
    let updated = updated.format("%Y-%m-%d").to_string();
    wtr.write_record(["# updated", updated.as_str()])?;

    let fiat = &evaluation.fiat;
    wtr.write_record([
        "Date and Time UTC".to_string(),
        "Platform".to_string(),
        "Taxation Type".to_string(),
        format!("Taxed Gain in {}", fiat),
        "Action".to_string(),
        "Amount".to_string(),
        "Asset".to_string(),
        format!("Sell Value in {}", fiat),
        "Remark".to_string(),
    ])?;

    for tx in evaluation.sorted_tax_events() {
        wtr.write_record([
            tx.op.utc_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            tx.op.platform.clone(),
            tx.taxation_type.to_string(),
            tx.taxed_gain.to_string(),
            tx.op.kind.to_string(),
            tx.op.change.to_string(),
            tx.op.coin.clone(),
            tx.sell_value.to_string(),
            tx.remark.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Tabled)]
struct EventRow {
    #[tabled(rename = "Date (UTC)")]
    date: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Taxation Type")]
    taxation_type: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Sell Value")]
    sell_value: String,
    #[tabled(rename = "Taxed Gain")]
    taxed_gain: String,
}

impl From<&TaxEvent> for EventRow {
    fn from(tx: &TaxEvent) -> Self {
        EventRow {
            date: tx.op.utc_time.format("%Y-%m-%d %H:%M").to_string(),
            platform: tx.op.platform.clone(),
            taxation_type: tx.taxation_type.to_string(),
            action: tx.op.kind.to_string(),
            amount: format_amount(tx.op.amount()),
            asset: tx.op.coin.clone(),
            sell_value: format_fiat(tx.sell_value),
            taxed_gain: format_fiat(tx.taxed_gain),
        }
    }
}

#[derive(Debug, Tabled)]
struct TotalRow {
    #[tabled(rename = "Taxation Type")]
    taxation_type: String,
    #[tabled(rename = "Taxed Gain")]
    taxed_gain: String,
}

#[derive(Debug, Tabled)]
struct PortfolioRow {
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Value")]
    sell_value: String,
    #[tabled(rename = "Gain")]
    real_gain: String,
    #[tabled(rename = "Taxed Gain")]
    taxed_gain: String,
}

impl From<&TaxEvent> for PortfolioRow {
    fn from(tx: &TaxEvent) -> Self {
        PortfolioRow {
            platform: tx.op.platform.clone(),
            asset: tx.op.coin.clone(),
            amount: format_amount(tx.op.amount()),
            sell_value: format_fiat(tx.sell_value),
            real_gain: format_fiat(tx.real_gain),
            taxed_gain: format_fiat(tx.taxed_gain),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportOutput<'a> {
    tax_year: i32,
    country: String,
    principle: String,
    fiat: String,
    complete: bool,
    taxed_gain_by_type: Vec<TypeTotal>,
    tax_events: Vec<TaxEventView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unrealized: Option<UnrealizedView>,
    warnings: &'a [Warning],
}

#[derive(Debug, Serialize)]
struct TypeTotal {
    taxation_type: String,
    taxed_gain: String,
}

#[derive(Debug, Serialize)]
struct UnrealizedView {
    deadline: String,
    invested: String,
    real_gain: String,
    taxed_gain: String,
    portfolio: Vec<TaxEventView>,
}

#[derive(Debug, Serialize)]
struct TaxEventView {
    utc_time: String,
    platform: String,
    taxation_type: String,
    action: String,
    coin: String,
    change: String,
    sell_value: String,
    taxed_gain: String,
    real_gain: String,
    remark: String,
}

impl From<&TaxEvent> for TaxEventView {
    fn from(tx: &TaxEvent) -> Self {
        TaxEventView {
            utc_time: tx.op.utc_time.to_rfc3339(),
            platform: tx.op.platform.clone(),
            taxation_type: tx.taxation_type.label().to_string(),
            action: tx.op.kind.to_string(),
            coin: tx.op.coin.clone(),
            change: tx.op.change.to_string(),
            sell_value: format_fiat(tx.sell_value),
            taxed_gain: format_fiat(tx.taxed_gain),
            real_gain: format_fiat(tx.real_gain),
            remark: tx.remark.clone(),
        }
    }
}
