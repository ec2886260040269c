// Run Orchestration - immutable snapshots in, parallel search, then
// serialized per-account application in chronological order

use anyhow::Result;
use rusqlite::Connection;
use std::collections::{BTreeSet, HashSet};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::candidates::CandidatePool;
use crate::config::Config;
use crate::db::{self, BalanceObservation};
use crate::matcher::{search_parallel, MatchEngine, SearchJob, SearchOutcome};
use crate::prompt::Operator;
use crate::resolver::{PeriodReport, PeriodState, Resolver};
use crate::timeline;

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug)]
pub struct RunSummary {
    pub periods: Vec<PeriodReport>,
    pub canceled: bool,
    pub seeded_accounts: usize,
}

impl RunSummary {
    pub fn resolved_count(&self) -> usize {
        self.periods
            .iter()
            .filter(|report| report.state == PeriodState::Resolved)
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.periods
            .iter()
            .filter(|report| report.state == PeriodState::DiscrepancyOpen)
            .count()
    }

    /// Console table in the shape of the reconciliation summary the operator
    /// reads at the end of a run
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("\nReconciliation Summary:\n");
        out.push_str(&format!(
            "{:<20} {:<24} {:>12} {:<17} {}\n",
            "Account", "Period", "Target", "State", "Detail"
        ));
        out.push_str(&"=".repeat(100));
        out.push('\n');

        for report in &self.periods {
            let span = format!("{}..{}", report.start, report.end);
            let mut detail = report.note.clone();
            if let Some(residual) = report.residual {
                detail = format!("{} (residual {})", detail, residual);
            }
            if report.approximate {
                detail.push_str(" [best effort]");
            }
            let account: String = report.account.chars().take(19).collect();
            out.push_str(&format!(
                "{:<20} {:<24} {:>12} {:<17} {}\n",
                account,
                span,
                report.target.to_string(),
                report.state.to_string(),
                detail
            ));
        }

        if self.canceled {
            out.push_str("\nRun canceled; unresolved periods stay pending and are safe to resume.\n");
        }

        out
    }
}

// ============================================================================
// INITIAL BALANCE SEEDING
// ============================================================================

/// Every account with transactions needs an observation anchoring its
/// timeline at or before its earliest transaction. Accounts without one get
/// a seed observation from the operator (an imported balance for the day
/// before the earliest transaction satisfies the anchor on its own).
pub fn seed_initial_balances(
    conn: &Connection,
    config: &Config,
    operator: &mut dyn Operator,
) -> Result<usize> {
    let observation_accounts = db::observation_accounts(conn)?;
    let mut seeded = 0;

    for account in db::transaction_accounts(conn)? {
        let earliest = match db::earliest_transaction_date(conn, &account)? {
            Some(date) => date,
            None => continue,
        };

        let members = config.member_accounts(&account, &observation_accounts);
        let cutoff = earliest.succ_opt().unwrap_or(earliest);
        if !members.is_empty() && db::has_observation_before(conn, &members, cutoff)? {
            continue;
        }

        let sample = db::get_unreconciled(conn, &account, earliest, earliest)?;
        let (date, balance) = operator.request_initial_balance(&account, earliest, &sample)?;
        db::insert_observation(
            conn,
            &BalanceObservation {
                account: account.clone(),
                date,
                balance,
            },
        )?;
        seeded += 1;
    }

    Ok(seeded)
}

// ============================================================================
// RECONCILIATION RUN
// ============================================================================

/// One full reconciliation pass.
///
/// Search runs over immutable pool snapshots on the worker pool; results are
/// applied per account in period-chronological order, so a transaction
/// rejected by an earlier period is still available to a later one but never
/// the reverse. A speculative match that lost candidates to an earlier
/// period is re-searched on the reduced pool before application. The cancel
/// flag is honored between periods; anything not yet applied stays pending.
pub fn run(
    conn: &Connection,
    config: &Config,
    operator: &mut dyn Operator,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    let seeded_accounts = seed_initial_balances(conn, config, operator)?;

    let observation_accounts = db::observation_accounts(conn)?;
    let mut canonical: BTreeSet<String> = BTreeSet::new();
    for account in db::transaction_accounts(conn)? {
        canonical.insert(config.canonical_account(&account));
    }
    for account in &observation_accounts {
        canonical.insert(config.canonical_account(account));
    }

    let engine = MatchEngine::from_config(config);

    // Snapshot phase: periods and candidate pools, grouped per account
    let mut jobs: Vec<SearchJob> = Vec::new();
    let mut account_ranges: Vec<(String, Range<usize>)> = Vec::new();
    for account in &canonical {
        let frontier = db::get_frontier(conn, account)?;
        let periods =
            timeline::build_periods(conn, config, account, &observation_accounts, frontier)?;
        let start = jobs.len();
        for period in periods {
            let pool = CandidatePool::load(conn, &period)?;
            jobs.push(SearchJob { period, pool });
        }
        account_ranges.push((account.clone(), start..jobs.len()));
    }

    // Search phase: parallel over independent units, no shared mutable state
    let outcomes = search_parallel(&engine, &jobs, config.workers);

    // Application phase
    let resolver = Resolver {
        conn,
        engine: &engine,
        major_threshold: config.major_discrepancy_threshold,
    };
    let mut consumed: HashSet<i64> = HashSet::new();
    let mut summary = RunSummary {
        periods: Vec::new(),
        canceled: false,
        seeded_accounts,
    };

    for (account, range) in &account_ranges {
        let mut blocked = false;

        for index in range.clone() {
            let job = &jobs[index];

            if summary.canceled || blocked {
                let note = if summary.canceled {
                    "run canceled"
                } else {
                    "blocked behind an open discrepancy"
                };
                summary.periods.push(PeriodReport::pending(&job.period, note));
                continue;
            }

            if cancel.load(Ordering::SeqCst) {
                summary.canceled = true;
                summary
                    .periods
                    .push(PeriodReport::pending(&job.period, "run canceled"));
                continue;
            }

            let mut outcome = outcomes[index].clone();
            if let SearchOutcome::Matched {
                transaction_ids, ..
            } = &outcome
            {
                if transaction_ids.iter().any(|id| consumed.contains(id)) {
                    // An earlier period consumed part of the speculative
                    // subset; re-search on the reduced pool before applying
                    let pool = CandidatePool::load(conn, &job.period)?;
                    outcome = engine.search(&job.period, &pool);
                }
            }

            let report = resolver.resolve(&job.period, outcome, operator, &mut consumed)?;
            if report.state == PeriodState::Resolved {
                db::set_frontier(conn, account, job.period.end.date)?;
            } else {
                // Open discrepancy: later periods of this account wait for
                // the next run so the frontier never jumps an open period
                blocked = true;
            }
            summary.periods.push(report);
        }
    }

    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
