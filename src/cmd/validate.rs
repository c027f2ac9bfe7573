//! Validate command - surface data quality issues without generating full reports

use crate::cmd::{format_amount, InputArgs};
use crate::core::{Taxman, Warning};
use chrono::Utc;
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// A validation issue for output
#[derive(Debug, Clone, Serialize)]
struct ValidationIssue {
    #[serde(rename = "type")]
    issue_type: &'static str,
    utc_time: String,
    platform: String,
    coin: String,
    amount: String,
    message: String,
}

impl From<&Warning> for ValidationIssue {
    fn from(warning: &Warning) -> Self {
        let (issue_type, platform, coin, amount, utc_time) = match warning {
            Warning::UnresolvedDeposit {
                platform,
                coin,
                amount,
                utc_time,
            } => ("UnresolvedDeposit", platform, coin, amount, utc_time),
            Warning::UnresolvedWithdrawal {
                platform,
                coin,
                amount,
                utc_time,
            } => ("UnresolvedWithdrawal", platform, coin, amount, utc_time),
        };
        ValidationIssue {
            issue_type,
            utc_time: utc_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            platform: platform.clone(),
            coin: coin.clone(),
            amount: format_amount(*amount),
            message: warning.to_string(),
        }
    }
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput {
    tax_year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    fatal: Option<String>,
    issue_count: usize,
    issues: Vec<ValidationIssue>,
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let config = self.input.config()?;
        let tax_year = config.tax_year;
        let operations = self.input.read_operations()?;
        let prices = self.input.read_prices(&config.fiat)?;

        let taxman = Taxman::new(config, &prices, Utc::now())?;
        let (fatal, issues) = match taxman.evaluate_taxation(&operations) {
            Ok(evaluation) => (
                None,
                evaluation
                    .warnings
                    .iter()
                    .map(ValidationIssue::from)
                    .collect::<Vec<_>>(),
            ),
            Err(err) => (Some(format!("{:#}", anyhow::Error::from(err))), Vec::new()),
        };

        let output = ValidationOutput {
            tax_year,
            fatal,
            issue_count: issues.len(),
            issues,
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(&output);
        }

        // Exit with code 1 if issues found
        if output.fatal.is_some() || !output.issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn print_text(output: &ValidationOutput) {
    println!();
    println!("VALIDATION RESULTS ({})", output.tax_year);
    println!();

    if let Some(fatal) = &output.fatal {
        println!("\u{2717} Evaluation failed:");
        println!("  {}", fatal);
        println!();
    }

    if output.issues.is_empty() {
        if output.fatal.is_none() {
            println!("\u{2713} No issues found.");
        }
        return;
    }

    println!("\u{26A0} {} issue(s) found:", output.issues.len());
    println!();
    for (i, issue) in output.issues.iter().enumerate() {
        println!(
            "  {}. [{}] {} {} {} on {}",
            i + 1,
            issue.issue_type,
            issue.utc_time,
            issue.amount,
            issue.coin,
            issue.platform
        );
        println!("     {}", issue.message);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::tests::{at, op};
    use crate::core::OperationKind;
    use rust_decimal_macros::dec;

    #[test]
    fn issue_from_warning() {
        let deposit = op(OperationKind::Deposit, at(2023, 4, 2), "ETH", dec!(1.25));
        let issue = ValidationIssue::from(&Warning::unresolved_transfer(&deposit));
        assert_eq!(issue.issue_type, "UnresolvedDeposit");
        assert_eq!(issue.utc_time, "2023-04-02 12:00:00");
        assert_eq!(issue.platform, "kraken");
        assert_eq!(issue.amount, "1.25");
        assert!(issue.message.contains("1.25 ETH"));
    }
}
