// Candidate Pool - the unreconciled transactions eligible for one period
// An immutable snapshot taken before search dispatch; workers never touch
// the store

use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::db::{self, Transaction};
use crate::timeline::Period;

/// Transactions of the period's account dated inside the inclusive window
/// `[start.date, end.date]` and not yet reconciled, ordered by (date, id).
///
/// The window is inclusive on both ends: posting lag means a boundary-dated
/// transaction can belong to either adjacent period. The matcher resolves
/// that ambiguity: a transaction accepted by one period's search leaves
/// contention for the next.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    transactions: Vec<Transaction>,
}

impl CandidatePool {
    /// Snapshot the pool for a period from the store
    pub fn load(conn: &Connection, period: &Period) -> Result<Self> {
        let transactions =
            db::get_unreconciled(conn, &period.account, period.start.date, period.end.date)?;
        Ok(CandidatePool { transactions })
    }

    /// Build a pool from an already-loaded snapshot (sorted to the pool's
    /// canonical order in case the caller didn't)
    pub fn from_snapshot(mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        transactions.retain(|tx| !tx.reconciled);
        CandidatePool { transactions }
    }

    /// The pool minus transactions already consumed by an earlier period
    pub fn without(&self, consumed: &HashSet<i64>) -> Self {
        CandidatePool {
            transactions: self
                .transactions
                .iter()
                .filter(|tx| !consumed.contains(&tx.id))
                .cloned()
                .collect(),
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Sum of every candidate amount (the most the pool could explain)
    pub fn total(&self) -> Decimal {
        self.transactions.iter().map(|tx| tx.amount).sum()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.transactions.iter().map(|tx| tx.id).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
