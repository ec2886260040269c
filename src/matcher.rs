// Match Engine - subset-sum search over a period's candidate pool
// Exact enumeration by ascending cardinality with branch-and-bound pruning;
// oversized pools degrade to a seeded sampling search tagged best-effort

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::candidates::CandidatePool;
use crate::config::Config;
use crate::db::Transaction;
use crate::timeline::{quantize_cents, Period};

// ============================================================================
// SEARCH OUTCOME
// ============================================================================

/// Result of searching one period. `approximate` marks results produced by
/// the degraded sampling search so downstream never treats them as certain.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// A subset of the pool explains the target delta within tolerance
    Matched {
        transaction_ids: Vec<i64>,
        approximate: bool,
    },

    /// No subset explains the delta; residual = target minus the sum of the
    /// whole pool (the part of the balance change no transaction accounts for)
    Discrepancy {
        residual: Decimal,
        approximate: bool,
    },
}

impl SearchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, SearchOutcome::Matched { .. })
    }

    pub fn is_approximate(&self) -> bool {
        match self {
            SearchOutcome::Matched { approximate, .. } => *approximate,
            SearchOutcome::Discrepancy { approximate, .. } => *approximate,
        }
    }
}

// ============================================================================
// MATCH ENGINE
// ============================================================================

pub struct MatchEngine {
    /// Absolute tolerance on the subset sum (default: one cent)
    pub tolerance: Decimal,

    /// Pools larger than this skip exhaustive enumeration
    pub max_enumeration: usize,

    /// Iteration budget for the sampling fallback
    pub sample_iterations: usize,
}

impl MatchEngine {
    pub fn from_config(config: &Config) -> Self {
        MatchEngine {
            tolerance: config.tolerance,
            max_enumeration: config.max_enumeration,
            sample_iterations: config.sample_iterations,
        }
    }

    /// Search one period's pool for a subset summing to the target delta.
    pub fn search(&self, period: &Period, pool: &CandidatePool) -> SearchOutcome {
        let target = period.target();

        // A zero delta is satisfied by the empty subset; nothing to search
        if target.is_zero() {
            return SearchOutcome::Matched {
                transaction_ids: Vec::new(),
                approximate: false,
            };
        }

        if pool.is_empty() {
            return SearchOutcome::Discrepancy {
                residual: target,
                approximate: false,
            };
        }

        if pool.len() > self.max_enumeration {
            return self.sample_search(period, target, pool);
        }

        match self.exact_search(target, pool) {
            Some(transaction_ids) => SearchOutcome::Matched {
                transaction_ids,
                approximate: false,
            },
            None => SearchOutcome::Discrepancy {
                residual: quantize_cents(target - pool.total()),
                approximate: false,
            },
        }
    }

    // ------------------------------------------------------------------
    // Exhaustive search
    // ------------------------------------------------------------------

    /// Enumerate subsets in ascending cardinality; the first size with any
    /// solution wins (fewest transactions minimizes false positives). Among
    /// equal-size solutions the boundary tie-break picks a single winner.
    fn exact_search(&self, target: Decimal, pool: &CandidatePool) -> Option<Vec<i64>> {
        let txs = pool.transactions();
        let n = txs.len();
        let amounts: Vec<Decimal> = txs.iter().map(|tx| tx.amount).collect();

        // Reachable-range bounds: any completion from index i onward adds a
        // sum between suffix_neg[i] and suffix_pos[i]
        let mut suffix_pos = vec![Decimal::ZERO; n + 1];
        let mut suffix_neg = vec![Decimal::ZERO; n + 1];
        for i in (0..n).rev() {
            suffix_pos[i] = suffix_pos[i + 1]
                + if amounts[i] > Decimal::ZERO {
                    amounts[i]
                } else {
                    Decimal::ZERO
                };
            suffix_neg[i] = suffix_neg[i + 1]
                + if amounts[i] < Decimal::ZERO {
                    amounts[i]
                } else {
                    Decimal::ZERO
                };
        }

        for size in 1..=n {
            let mut best: Option<Vec<usize>> = None;
            let mut stack: Vec<usize> = Vec::with_capacity(size);
            self.enumerate(
                0,
                Decimal::ZERO,
                size,
                target,
                &amounts,
                &suffix_pos,
                &suffix_neg,
                txs,
                &mut stack,
                &mut best,
            );
            if let Some(indices) = best {
                return Some(indices.into_iter().map(|i| txs[i].id).collect());
            }
        }

        None
    }

    #[allow(clippy::too_many_arguments)]
    fn enumerate(
        &self,
        start: usize,
        sum: Decimal,
        size: usize,
        target: Decimal,
        amounts: &[Decimal],
        suffix_pos: &[Decimal],
        suffix_neg: &[Decimal],
        txs: &[Transaction],
        stack: &mut Vec<usize>,
        best: &mut Option<Vec<usize>>,
    ) {
        if stack.len() == size {
            if (sum - target).abs() <= self.tolerance {
                let replace = match best {
                    Some(current) => subset_order(stack, current, txs) == CmpOrdering::Less,
                    None => true,
                };
                if replace {
                    *best = Some(stack.clone());
                }
            }
            return;
        }

        let needed = size - stack.len();
        for i in start..amounts.len() {
            // Not enough candidates left to fill the subset
            if amounts.len() - i < needed {
                break;
            }

            let next = sum + amounts[i];
            // Abandon the branch once even the extreme remaining amounts
            // cannot bring the running sum within tolerance of the target
            if next + suffix_pos[i + 1] < target - self.tolerance {
                continue;
            }
            if next + suffix_neg[i + 1] > target + self.tolerance {
                continue;
            }

            stack.push(i);
            self.enumerate(
                i + 1,
                next,
                size,
                target,
                amounts,
                suffix_pos,
                suffix_neg,
                txs,
                stack,
                best,
            );
            stack.pop();
        }
    }

    // ------------------------------------------------------------------
    // Sampling fallback
    // ------------------------------------------------------------------

    /// Best-effort search for pools too large to enumerate: a cheap scan for
    /// a single exact transaction, then randomized greedy passes under a
    /// fixed iteration budget. Seeded from the period's content so reruns on
    /// unchanged data reproduce the same answer.
    fn sample_search(&self, period: &Period, target: Decimal, pool: &CandidatePool) -> SearchOutcome {
        let txs = pool.transactions();

        for tx in txs {
            if (tx.amount - target).abs() <= self.tolerance {
                return SearchOutcome::Matched {
                    transaction_ids: vec![tx.id],
                    approximate: true,
                };
            }
        }

        let mut rng = StdRng::seed_from_u64(sample_seed(period, pool));
        let mut order: Vec<usize> = (0..txs.len()).collect();

        for _ in 0..self.sample_iterations {
            order.shuffle(&mut rng);

            let mut sum = Decimal::ZERO;
            let mut chosen: Vec<usize> = Vec::new();
            for &i in &order {
                let next = sum + txs[i].amount;
                if (next - target).abs() < (sum - target).abs() {
                    sum = next;
                    chosen.push(i);
                }
            }

            if (sum - target).abs() <= self.tolerance {
                chosen.sort_unstable();
                return SearchOutcome::Matched {
                    transaction_ids: chosen.into_iter().map(|i| txs[i].id).collect(),
                    approximate: true,
                };
            }
        }

        SearchOutcome::Discrepancy {
            residual: quantize_cents(target - pool.total()),
            approximate: true,
        }
    }
}

/// Deterministic total order over equal-size solutions: earlier
/// start-adjacent transaction first, then later end-adjacent transaction,
/// then ascending id sequence. Index sets are ascending over a (date, id)
/// sorted pool, so the first element carries the earliest date and the last
/// the latest.
fn subset_order(a: &[usize], b: &[usize], txs: &[Transaction]) -> CmpOrdering {
    let a_first = txs[a[0]].date;
    let b_first = txs[b[0]].date;
    let a_last = txs[a[a.len() - 1]].date;
    let b_last = txs[b[b.len() - 1]].date;

    a_first
        .cmp(&b_first)
        .then(b_last.cmp(&a_last))
        .then_with(|| {
            let a_ids: Vec<i64> = a.iter().map(|&i| txs[i].id).collect();
            let b_ids: Vec<i64> = b.iter().map(|&i| txs[i].id).collect();
            a_ids.cmp(&b_ids)
        })
}

/// Seed for the sampling fallback, derived from the period and pool content
fn sample_seed(period: &Period, pool: &CandidatePool) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(period.account.as_bytes());
    hasher.update(period.start.date.to_string());
    hasher.update(period.end.date.to_string());
    hasher.update(period.target().to_string());
    for id in pool.ids() {
        hasher.update(id.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

// ============================================================================
// PARALLEL DISPATCH
// ============================================================================

/// One unit of search work: a period and its immutable pool snapshot
pub struct SearchJob {
    pub period: Period,
    pub pool: CandidatePool,
}

/// Run the searches on a bounded pool of worker threads. Workers pull jobs
/// from a shared counter and report over a channel; results come back in job
/// order regardless of completion order. Searches share no mutable state.
pub fn search_parallel(
    engine: &MatchEngine,
    jobs: &[SearchJob],
    workers: usize,
) -> Vec<SearchOutcome> {
    if jobs.is_empty() {
        return Vec::new();
    }

    let workers = workers.max(1).min(jobs.len());
    if workers == 1 {
        return jobs
            .iter()
            .map(|job| engine.search(&job.period, &job.pool))
            .collect();
    }

    let next = AtomicUsize::new(0);
    let (sender, receiver) = mpsc::channel::<(usize, SearchOutcome)>();

    let mut collected: Vec<(usize, SearchOutcome)> = Vec::with_capacity(jobs.len());
    thread::scope(|scope| {
        for _ in 0..workers {
            let sender = sender.clone();
            let next = &next;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                if index >= jobs.len() {
                    break;
                }
                let job = &jobs[index];
                let outcome = engine.search(&job.period, &job.pool);
                if sender.send((index, outcome)).is_err() {
                    break;
                }
            });
        }
        drop(sender);

        collected.extend(receiver.iter());
    });

    collected.sort_by_key(|(index, _)| *index);
    collected.into_iter().map(|(_, outcome)| outcome).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BalanceObservation;
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    fn dec(text: &str) -> Decimal {
        Decimal::from_str(text).unwrap()
    }

    fn tx(id: i64, day: &str, amount: &str) -> Transaction {
        Transaction {
            id,
            date: date(day),
            merchant: "Test".to_string(),
            category: "Test".to_string(),
            account: "A".to_string(),
            statement: String::new(),
            amount: dec(amount),
            reconciled: false,
            reconcile_date: None,
            import_date: Utc::now(),
        }
    }

    fn period(start_day: &str, start_balance: &str, end_day: &str, end_balance: &str) -> Period {
        Period {
            account: "A".to_string(),
            start: BalanceObservation {
                account: "A".to_string(),
                date: date(start_day),
                balance: dec(start_balance),
            },
            end: BalanceObservation {
                account: "A".to_string(),
                date: date(end_day),
                balance: dec(end_balance),
            },
        }
    }

    fn engine() -> MatchEngine {
        MatchEngine {
            tolerance: dec("0.01"),
            max_enumeration: 30,
            sample_iterations: 200,
        }
    }

    #[test]
    fn test_exact_subset_found() {
        // Observations 100.00 -> 70.00; pool explains -30.00 with two of three
        let p = period("2023-01-01", "100.00", "2023-01-31", "70.00");
        let pool = CandidatePool::from_snapshot(vec![
            tx(1, "2023-01-05", "-20.00"),
            tx(2, "2023-01-10", "-10.00"),
            tx(3, "2023-01-15", "-5.00"),
        ]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Matched {
                transaction_ids: vec![1, 2],
                approximate: false
            }
        );
    }

    #[test]
    fn test_no_subset_raises_discrepancy() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "70.00");
        let pool = CandidatePool::from_snapshot(vec![
            tx(1, "2023-01-05", "-20.00"),
            tx(2, "2023-01-10", "-3.00"),
        ]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Discrepancy {
                residual: dec("-7.00"),
                approximate: false
            }
        );
    }

    #[test]
    fn test_zero_target_matched_empty() {
        let p = period("2023-01-01", "70.00", "2023-01-31", "70.00");
        let pool = CandidatePool::from_snapshot(vec![tx(1, "2023-01-05", "-20.00")]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Matched {
                transaction_ids: vec![],
                approximate: false
            }
        );
    }

    #[test]
    fn test_empty_pool_nonzero_target() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "70.00");
        let pool = CandidatePool::from_snapshot(vec![]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Discrepancy {
                residual: dec("-30.00"),
                approximate: false
            }
        );
    }

    #[test]
    fn test_fewest_transactions_preferred() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "70.00");
        // Both {-30} and {-20, -10} sum to the target; one transaction wins
        let pool = CandidatePool::from_snapshot(vec![
            tx(1, "2023-01-05", "-20.00"),
            tx(2, "2023-01-10", "-10.00"),
            tx(3, "2023-01-15", "-30.00"),
        ]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Matched {
                transaction_ids: vec![3],
                approximate: false
            }
        );
    }

    #[test]
    fn test_boundary_tie_break() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "70.00");
        // Four equal-size solutions sum to -30.00. The winner starts at the
        // earliest candidate and, among those, ends at the latest one.
        let pool = CandidatePool::from_snapshot(vec![
            tx(1, "2023-01-05", "-10.00"),
            tx(2, "2023-01-10", "-20.00"),
            tx(3, "2023-01-20", "-10.00"),
            tx(4, "2023-01-25", "-20.00"),
        ]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Matched {
                transaction_ids: vec![1, 4],
                approximate: false
            }
        );

        // Deterministic across repeated runs on identical data
        let again = engine().search(&p, &pool);
        assert_eq!(outcome, again);
    }

    #[test]
    fn test_mixed_signs_not_pruned_away() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "85.00");
        let pool = CandidatePool::from_snapshot(vec![
            tx(1, "2023-01-05", "10.00"),
            tx(2, "2023-01-10", "-10.00"),
            tx(3, "2023-01-15", "-5.00"),
        ]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Matched {
                transaction_ids: vec![2, 3],
                approximate: false
            }
        );
    }

    #[test]
    fn test_within_tolerance_match() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "70.00");
        // Sums to -29.99; one cent off the -30.00 target, inside tolerance
        let pool = CandidatePool::from_snapshot(vec![tx(1, "2023-01-05", "-29.99")]);

        let outcome = engine().search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Matched {
                transaction_ids: vec![1],
                approximate: false
            }
        );
    }

    #[test]
    fn test_oversized_pool_degrades_to_sampling() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "80.00");
        let small_engine = MatchEngine {
            tolerance: dec("0.01"),
            max_enumeration: 3,
            sample_iterations: 50,
        };

        // Four candidates of -5.00: greedy accumulation reaches -20.00
        let pool = CandidatePool::from_snapshot(vec![
            tx(1, "2023-01-05", "-5.00"),
            tx(2, "2023-01-10", "-5.00"),
            tx(3, "2023-01-15", "-5.00"),
            tx(4, "2023-01-20", "-5.00"),
        ]);

        let outcome = small_engine.search(&p, &pool);
        match &outcome {
            SearchOutcome::Matched {
                transaction_ids,
                approximate,
            } => {
                assert!(*approximate, "degraded result must be tagged");
                assert_eq!(transaction_ids.len(), 4);
            }
            other => panic!("expected approximate match, got {:?}", other),
        }

        // Seeded sampling: identical re-run, identical result
        assert_eq!(outcome, small_engine.search(&p, &pool));
    }

    #[test]
    fn test_oversized_pool_single_exact_scan() {
        let p = period("2023-01-01", "100.00", "2023-01-31", "70.00");
        let small_engine = MatchEngine {
            tolerance: dec("0.01"),
            max_enumeration: 2,
            sample_iterations: 10,
        };

        let pool = CandidatePool::from_snapshot(vec![
            tx(1, "2023-01-05", "-1.00"),
            tx(2, "2023-01-10", "-30.00"),
            tx(3, "2023-01-15", "-2.00"),
        ]);

        let outcome = small_engine.search(&p, &pool);
        assert_eq!(
            outcome,
            SearchOutcome::Matched {
                transaction_ids: vec![2],
                approximate: true
            }
        );
    }

    #[test]
    fn test_parallel_matches_serial() {
        let jobs = vec![
            SearchJob {
                period: period("2023-01-01", "100.00", "2023-01-31", "70.00"),
                pool: CandidatePool::from_snapshot(vec![
                    tx(1, "2023-01-05", "-20.00"),
                    tx(2, "2023-01-10", "-10.00"),
                ]),
            },
            SearchJob {
                period: period("2023-01-31", "70.00", "2023-02-28", "60.00"),
                pool: CandidatePool::from_snapshot(vec![tx(3, "2023-02-10", "-9.00")]),
            },
            SearchJob {
                period: period("2023-02-28", "60.00", "2023-03-31", "60.00"),
                pool: CandidatePool::from_snapshot(vec![]),
            },
        ];

        let eng = engine();
        let serial: Vec<SearchOutcome> = jobs
            .iter()
            .map(|job| eng.search(&job.period, &job.pool))
            .collect();
        let parallel = search_parallel(&eng, &jobs, 2);

        assert_eq!(serial, parallel);
        assert!(parallel[0].is_matched());
        assert!(!parallel[1].is_matched()); // -9.00 cannot explain -10.00
        assert!(parallel[2].is_matched()); // zero target
    }
}
