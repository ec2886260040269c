// Balance Timeline - ordered observations per logical account and the
// periods between them; the account alias rule is applied here by summing
// member-account balances per date

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db::{self, BalanceObservation};

/// Quantize a monetary value to the cent (export data may carry arbitrary
/// extra decimal places; deltas and residuals are always compared at cents)
pub fn quantize_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// ============================================================================
// PERIOD
// ============================================================================

/// The span between two consecutive balance observations of one logical
/// account, and the unit of reconciliation work. Not persisted.
#[derive(Debug, Clone)]
pub struct Period {
    pub account: String,
    pub start: BalanceObservation,
    pub end: BalanceObservation,
}

impl Period {
    /// The balance change this period's transactions must explain
    pub fn target(&self) -> Decimal {
        quantize_cents(self.end.balance - self.start.balance)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {}..{} (target {})",
            self.account,
            self.start.date,
            self.end.date,
            self.target()
        )
    }
}

// ============================================================================
// TIMELINE CONSTRUCTION
// ============================================================================

/// Observations for a logical account at or after `min_date`: every member
/// account's balances are fetched and summed per date, yielding one combined
/// observation per date under the canonical name. The minimum reconciliation
/// date is the account's frontier: the observation on that date anchors the
/// first open period, and settled history before it never reloads.
pub fn collect_observations(
    conn: &Connection,
    config: &Config,
    canonical: &str,
    known_accounts: &[String],
    min_date: Option<NaiveDate>,
) -> Result<Vec<BalanceObservation>> {
    let members = config.member_accounts(canonical, known_accounts);

    let mut by_date: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for member in &members {
        for observation in db::get_observations(conn, member, min_date)? {
            *by_date.entry(observation.date).or_insert(Decimal::ZERO) += observation.balance;
        }
    }

    Ok(by_date
        .into_iter()
        .map(|(date, balance)| BalanceObservation {
            account: canonical.to_string(),
            date,
            balance,
        })
        .collect())
}

/// Periods between consecutive observations. Duplicate dates are merged
/// before this point (at most one observation per date), so every period has
/// a strictly positive length.
pub fn derive_periods(account: &str, observations: &[BalanceObservation]) -> Vec<Period> {
    observations
        .windows(2)
        .map(|pair| Period {
            account: account.to_string(),
            start: pair[0].clone(),
            end: pair[1].clone(),
        })
        .collect()
}

/// Drop periods that end before the earliest reconcile date. A period
/// straddling the boundary is kept.
pub fn periods_at_or_after(periods: Vec<Period>, earliest: Option<NaiveDate>) -> Vec<Period> {
    match earliest {
        Some(floor) => periods
            .into_iter()
            .filter(|period| period.end.date >= floor)
            .collect(),
        None => periods,
    }
}

/// Full pipeline for one logical account. `min_date` is the account's
/// reconciliation frontier; the configured earliest-reconcile-date then
/// drops any remaining period that ends before it.
pub fn build_periods(
    conn: &Connection,
    config: &Config,
    canonical: &str,
    known_accounts: &[String],
    min_date: Option<NaiveDate>,
) -> Result<Vec<Period>> {
    let observations = collect_observations(conn, config, canonical, known_accounts, min_date)?;
    let periods = derive_periods(canonical, &observations);
    Ok(periods_at_or_after(
        periods,
        config.earliest_reconcile_date,
    ))
}

// ============================================================================
// TESTS
// ============================================================================
