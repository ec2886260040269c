// Operator Interface - the synchronous decision points a run blocks on
// Hosts plug in a terminal prompt or a canned policy for batch and test runs

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::{self, Write};
use std::str::FromStr;

use crate::db::Transaction;
use crate::resolver::{DiscrepancyClass, Disposition};
use crate::timeline::Period;

// ============================================================================
// OPERATOR TRAIT
// ============================================================================

pub trait Operator {
    /// Blocking decision point for a period whose delta no subset explains.
    /// The run suspends until one of the three dispositions is chosen.
    fn request_disposition(
        &mut self,
        period: &Period,
        residual: Decimal,
        class: &DiscrepancyClass,
    ) -> Result<Disposition>;

    /// Seed balance for an account with no observation on or before its
    /// earliest transaction. Returns the caller-chosen anchor date and the
    /// closing balance as of that date.
    fn request_initial_balance(
        &mut self,
        account: &str,
        earliest: NaiveDate,
        earliest_transactions: &[Transaction],
    ) -> Result<(NaiveDate, Decimal)>;
}

// ============================================================================
// TERMINAL OPERATOR
// ============================================================================

/// Blocking stdin/stdout prompts
pub struct TerminalOperator;

impl TerminalOperator {
    fn read_line(prompt: &str) -> Result<String> {
        print!("{}", prompt);
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .context("Failed to read operator input")?;
        Ok(input.trim().to_string())
    }

    fn read_money(prompt: &str) -> Result<Decimal> {
        loop {
            let input = Self::read_line(prompt)?;
            match parse_money(&input) {
                Ok(amount) => return Ok(amount),
                Err(_) => println!("Invalid amount. Example: 1234.56 or $1,234.56"),
            }
        }
    }

    fn read_date(prompt: &str) -> Result<NaiveDate> {
        loop {
            let input = Self::read_line(prompt)?;
            match NaiveDate::parse_from_str(&input, "%Y-%m-%d") {
                Ok(date) => return Ok(date),
                Err(_) => println!("Invalid date format. Please use YYYY-MM-DD."),
            }
        }
    }
}

impl Operator for TerminalOperator {
    fn request_disposition(
        &mut self,
        period: &Period,
        residual: Decimal,
        class: &DiscrepancyClass,
    ) -> Result<Disposition> {
        println!();
        println!("Discrepancy for {}", period.describe());
        println!("Unexplained residual: {} ({})", residual, class.describe());

        loop {
            let input = Self::read_line(
                "(a)ccept the discrepancy, enter a (m)anual adjustment, or (d)efer? (a/m/d): ",
            )?
            .to_lowercase();

            match input.as_str() {
                "a" | "accept" => return Ok(Disposition::Accept),
                "m" | "manual" | "adjust" => {
                    let amount = Self::read_money("Adjusting entry amount: ")?;
                    return Ok(Disposition::Adjust(amount));
                }
                "d" | "defer" => return Ok(Disposition::Defer),
                _ => println!("Please answer a, m, or d."),
            }
        }
    }

    fn request_initial_balance(
        &mut self,
        account: &str,
        earliest: NaiveDate,
        earliest_transactions: &[Transaction],
    ) -> Result<(NaiveDate, Decimal)> {
        let day_before = earliest.pred_opt().unwrap_or(earliest);

        println!();
        println!(
            "Account {} needs a starting balance. Earliest transactions are on {}:",
            account, earliest
        );
        for tx in earliest_transactions {
            println!(
                "  - {} | {} | {} | {}",
                tx.date, tx.merchant, tx.amount, tx.statement
            );
        }

        let answer = Self::read_line(&format!(
            "Can you provide the closing balance for {} as of {}? (yes/no): ",
            account, day_before
        ))?
        .to_lowercase();

        let anchor = if answer == "y" || answer == "yes" {
            day_before
        } else {
            Self::read_date("Closing balance date you can provide (YYYY-MM-DD): ")?
        };

        let balance = Self::read_money(&format!(
            "Closing balance for {} as of {}: ",
            account, anchor
        ))?;

        Ok((anchor, balance))
    }
}

/// Parse an operator-entered amount, tolerating "$" and thousands separators
pub fn parse_money(input: &str) -> Result<Decimal> {
    let cleaned = input.trim().replace(['$', ','], "");
    Decimal::from_str(&cleaned).map_err(|e| anyhow!("Invalid amount {:?}: {}", input, e))
}

// ============================================================================
// POLICY OPERATOR
// ============================================================================

/// Pre-supplied decisions for batch and test runs: every disposition request
/// gets the same answer, seed balances come from a lookup table, and the
/// prompt counter lets callers assert that no interaction happened.
pub struct PolicyOperator {
    disposition: Disposition,
    seed_balances: HashMap<String, (NaiveDate, Decimal)>,
    pub prompts: usize,
}

impl PolicyOperator {
    pub fn new(disposition: Disposition) -> Self {
        PolicyOperator {
            disposition,
            seed_balances: HashMap::new(),
            prompts: 0,
        }
    }

    /// Leave every discrepancy for a later run
    pub fn defer_all() -> Self {
        Self::new(Disposition::Defer)
    }

    /// Record every discrepancy and move on
    pub fn accept_all() -> Self {
        Self::new(Disposition::Accept)
    }

    pub fn with_seed_balance(
        mut self,
        account: &str,
        date: NaiveDate,
        balance: Decimal,
    ) -> Self {
        self.seed_balances
            .insert(account.to_string(), (date, balance));
        self
    }
}

impl Operator for PolicyOperator {
    fn request_disposition(
        &mut self,
        _period: &Period,
        _residual: Decimal,
        _class: &DiscrepancyClass,
    ) -> Result<Disposition> {
        self.prompts += 1;
        Ok(self.disposition.clone())
    }

    fn request_initial_balance(
        &mut self,
        account: &str,
        _earliest: NaiveDate,
        _earliest_transactions: &[Transaction],
    ) -> Result<(NaiveDate, Decimal)> {
        self.prompts += 1;
        self.seed_balances
            .get(account)
            .copied()
            .ok_or_else(|| anyhow!("No seed balance configured for account {}", account))
    }
}

// ============================================================================
// TESTS
// ============================================================================
