// Discrepancy Resolver - applies match results and walks unexplained
// periods through the operator's disposition

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt;

use crate::candidates::CandidatePool;
use crate::db;
use crate::matcher::{MatchEngine, SearchOutcome};
use crate::prompt::Operator;
use crate::timeline::Period;

// ============================================================================
// PERIOD STATE MACHINE
// ============================================================================

/// pending -> searching -> {matched | discrepancy-open} -> resolved
///
/// `Resolved` is terminal. `DiscrepancyOpen` is re-entered on the next run
/// when the operator deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodState {
    Pending,
    Searching,
    Matched,
    DiscrepancyOpen,
    Resolved,
}

impl fmt::Display for PeriodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodState::Pending => write!(f, "pending"),
            PeriodState::Searching => write!(f, "searching"),
            PeriodState::Matched => write!(f, "matched"),
            PeriodState::DiscrepancyOpen => write!(f, "discrepancy-open"),
            PeriodState::Resolved => write!(f, "resolved"),
        }
    }
}

// ============================================================================
// DISPOSITIONS & CLASSIFICATION
// ============================================================================

/// The three answers an operator may give for an unexplained period
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Record the residual as-is and move on; no transactions change
    Accept,

    /// Synthesize an adjusting entry of this amount and re-run the match
    Adjust(Decimal),

    /// Leave the period unresolved; it is retried on the next run
    Defer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscrepancyDirection {
    /// The balance fell further than the transactions explain
    Shortfall,

    /// The balance rose further than the transactions explain
    Surplus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscrepancySeverity {
    Minor,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscrepancyClass {
    pub direction: DiscrepancyDirection,
    pub severity: DiscrepancySeverity,
}

impl DiscrepancyClass {
    pub fn classify(residual: Decimal, major_threshold: Decimal) -> Self {
        let direction = if residual < Decimal::ZERO {
            DiscrepancyDirection::Shortfall
        } else {
            DiscrepancyDirection::Surplus
        };
        let severity = if residual.abs() >= major_threshold {
            DiscrepancySeverity::Major
        } else {
            DiscrepancySeverity::Minor
        };
        DiscrepancyClass {
            direction,
            severity,
        }
    }

    pub fn describe(&self) -> String {
        let severity = match self.severity {
            DiscrepancySeverity::Minor => "minor",
            DiscrepancySeverity::Major => "major",
        };
        let direction = match self.direction {
            DiscrepancyDirection::Shortfall => "shortfall",
            DiscrepancyDirection::Surplus => "surplus",
        };
        format!("{} {}", severity, direction)
    }
}

// ============================================================================
// PERIOD REPORT
// ============================================================================

/// Per-period outcome surfaced in the run summary
#[derive(Debug, Clone)]
pub struct PeriodReport {
    pub account: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub target: Decimal,
    pub state: PeriodState,
    pub matched: usize,
    pub residual: Option<Decimal>,
    pub approximate: bool,
    pub note: String,
}

impl PeriodReport {
    fn from_period(period: &Period) -> Self {
        PeriodReport {
            account: period.account.clone(),
            start: period.start.date,
            end: period.end.date,
            target: period.target(),
            state: PeriodState::Pending,
            matched: 0,
            residual: None,
            approximate: false,
            note: String::new(),
        }
    }

    /// Skipped-period placeholder (cancellation, or blocked behind an open
    /// discrepancy earlier in the account's timeline)
    pub fn pending(period: &Period, note: &str) -> Self {
        let mut report = Self::from_period(period);
        report.note = note.to_string();
        report
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct Resolver<'a> {
    pub conn: &'a Connection,
    pub engine: &'a MatchEngine,
    pub major_threshold: Decimal,
}

impl<'a> Resolver<'a> {
    /// Consume one period's search outcome. Matched subsets are applied to
    /// the store; discrepancies block on the operator's disposition.
    pub fn resolve(
        &self,
        period: &Period,
        outcome: SearchOutcome,
        operator: &mut dyn Operator,
        consumed: &mut HashSet<i64>,
    ) -> Result<PeriodReport> {
        match outcome {
            SearchOutcome::Matched {
                transaction_ids,
                approximate,
            } => {
                let note = if transaction_ids.is_empty() {
                    "zero delta, nothing to explain".to_string()
                } else if approximate {
                    "matched (best effort)".to_string()
                } else {
                    "matched".to_string()
                };
                self.apply_match(period, transaction_ids, approximate, consumed, note)
            }

            SearchOutcome::Discrepancy {
                residual,
                approximate,
            } => {
                let class = DiscrepancyClass::classify(residual, self.major_threshold);
                match operator.request_disposition(period, residual, &class)? {
                    Disposition::Accept => {
                        let mut report = PeriodReport::from_period(period);
                        report.state = PeriodState::Resolved;
                        report.residual = Some(residual);
                        report.approximate = approximate;
                        report.note = format!("discrepancy accepted ({})", class.describe());
                        Ok(report)
                    }

                    Disposition::Adjust(amount) => {
                        self.adjust_and_rematch(period, amount, consumed)
                    }

                    Disposition::Defer => {
                        let mut report = PeriodReport::from_period(period);
                        report.state = PeriodState::DiscrepancyOpen;
                        report.residual = Some(residual);
                        report.approximate = approximate;
                        report.note = "deferred to a later run".to_string();
                        Ok(report)
                    }
                }
            }
        }
    }

    fn apply_match(
        &self,
        period: &Period,
        transaction_ids: Vec<i64>,
        approximate: bool,
        consumed: &mut HashSet<i64>,
        note: String,
    ) -> Result<PeriodReport> {
        db::mark_reconciled(self.conn, &transaction_ids, Utc::now())?;
        consumed.extend(transaction_ids.iter().copied());

        let mut report = PeriodReport::from_period(period);
        report.state = PeriodState::Resolved;
        report.matched = transaction_ids.len();
        report.approximate = approximate;
        report.note = note;
        Ok(report)
    }

    /// Feed an operator-supplied adjusting entry back through the matcher.
    /// The synthetic transaction lands on the period's end date, inside the
    /// window, so the refreshed pool can pick it up.
    fn adjust_and_rematch(
        &self,
        period: &Period,
        amount: Decimal,
        consumed: &mut HashSet<i64>,
    ) -> Result<PeriodReport> {
        db::insert_adjustment(self.conn, &period.account, period.end.date, amount)?;

        let pool = CandidatePool::load(self.conn, period)?.without(consumed);
        match self.engine.search(period, &pool) {
            SearchOutcome::Matched {
                transaction_ids,
                approximate,
            } => self.apply_match(
                period,
                transaction_ids,
                approximate,
                consumed,
                "matched after manual adjustment".to_string(),
            ),
            SearchOutcome::Discrepancy {
                residual,
                approximate,
            } => {
                let mut report = PeriodReport::from_period(period);
                report.state = PeriodState::DiscrepancyOpen;
                report.residual = Some(residual);
                report.approximate = approximate;
                report.note = "adjustment did not close the gap".to_string();
                Ok(report)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
