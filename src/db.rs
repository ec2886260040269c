// Ledger Store - SQLite persistence for transactions and balance observations
// Owns all durable rows; every mutation goes through the update calls below

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;

// ============================================================================
// RECORD TYPES
// ============================================================================

/// A transaction row as exported (CSV column names from the export header)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewTransaction {
    #[serde(rename = "Date")]
    pub date: NaiveDate,

    #[serde(rename = "Merchant")]
    pub merchant: String,

    #[serde(rename = "Category")]
    pub category: String,

    #[serde(rename = "Account")]
    pub account: String,

    #[serde(rename = "Original Statement", default)]
    pub statement: String,

    // Parsed from the raw text so the amount never passes through a float
    #[serde(rename = "Amount", with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl NewTransaction {
    /// Composite natural key for duplicate detection. Exports carry no stable
    /// transaction id, so identity-for-dedup is date+account+amount+statement.
    pub fn dedup_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}",
            self.date, self.account, self.amount, self.statement
        ));
        format!("{:x}", hasher.finalize())
    }
}

/// A balance row as exported
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewBalance {
    #[serde(rename = "Account")]
    pub account: String,

    #[serde(rename = "Date")]
    pub date: NaiveDate,

    #[serde(rename = "Balance", with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

/// A stored transaction. Immutable after import except for the
/// reconciliation fields, which only `mark_reconciled` flips.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    pub merchant: String,
    pub category: String,
    pub account: String,
    pub statement: String,
    pub amount: Decimal,
    pub reconciled: bool,
    pub reconcile_date: Option<DateTime<Utc>>,
    pub import_date: DateTime<Utc>,
}

/// A stored balance snapshot. At most one per (account, date).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceObservation {
    pub account: String,
    pub date: NaiveDate,
    pub balance: Decimal,
}

/// A superseded balance observation reported by `insert_balances`.
/// The previous value is discarded after this report (later import wins).
#[derive(Debug, Clone, Serialize)]
pub struct BalanceConflict {
    pub account: String,
    pub date: NaiveDate,
    pub previous: Decimal,
    pub replacement: Decimal,
}

/// Counts returned by a transaction import
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dedup_hash TEXT UNIQUE NOT NULL,
            transaction_date TEXT NOT NULL,
            merchant TEXT NOT NULL,
            category TEXT NOT NULL,
            account TEXT NOT NULL,
            statement TEXT NOT NULL DEFAULT '',
            amount TEXT NOT NULL,
            reconciled INTEGER NOT NULL DEFAULT 0,
            reconcile_date TEXT,
            import_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS balance_observations (
            account TEXT NOT NULL,
            observed_date TEXT NOT NULL,
            balance TEXT NOT NULL,
            PRIMARY KEY (account, observed_date)
        )",
        [],
    )?;

    // Reconciliation frontier per logical account: periods ending at or
    // before this date are settled and never re-opened
    conn.execute(
        "CREATE TABLE IF NOT EXISTS account_state (
            account TEXT PRIMARY KEY,
            last_reconciled_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_account_date
         ON transactions(account, transaction_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_reconciled ON transactions(reconciled)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// BACKUP ROTATION
// ============================================================================

/// Copy the database file into a sibling backups directory with a timestamped
/// name, pruning the oldest copies beyond `max_backups`. Returns the backup
/// path, or None when there is no database yet.
pub fn backup_database(db_path: &Path, max_backups: usize) -> Result<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }

    let backup_dir = db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("reconciliation_backups");
    fs::create_dir_all(&backup_dir)
        .with_context(|| format!("Failed to create backup directory: {:?}", backup_dir))?;

    let stamp = Utc::now().format("%Y%m%d%H%M%S%f");
    let backup_path = backup_dir.join(format!("reconciliation_backup_{}.db", stamp));
    fs::copy(db_path, &backup_path)
        .with_context(|| format!("Failed to back up database to {:?}", backup_path))?;

    // Prune oldest backups beyond the retention limit
    let mut backups: Vec<PathBuf> = fs::read_dir(&backup_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("reconciliation_backup_"))
                .unwrap_or(false)
        })
        .collect();
    backups.sort();

    if backups.len() > max_backups {
        let excess = backups.len() - max_backups;
        for old in &backups[..excess] {
            fs::remove_file(old)
                .with_context(|| format!("Failed to prune old backup: {:?}", old))?;
        }
    }

    Ok(Some(backup_path))
}

// ============================================================================
// TRANSACTION IMPORT
// ============================================================================

pub fn insert_transactions(conn: &Connection, records: &[NewTransaction]) -> Result<ImportOutcome> {
    let mut outcome = ImportOutcome::default();
    let import_date = Utc::now().to_rfc3339();

    for record in records {
        let hash = record.dedup_hash();

        let result = conn.execute(
            "INSERT INTO transactions (
                dedup_hash, transaction_date, merchant, category, account,
                statement, amount, reconciled, import_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            params![
                hash,
                record.date.to_string(),
                record.merchant,
                record.category,
                record.account,
                record.statement,
                record.amount.to_string(),
                import_date,
            ],
        );

        match result {
            Ok(_) => outcome.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                outcome.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(outcome)
}

// ============================================================================
// BALANCE IMPORT
// ============================================================================

/// Upsert balance observations. A record for an (account, date) that already
/// holds a different balance supersedes it (later import wins) and the
/// replacement is reported in the returned conflict list.
pub fn insert_balances(conn: &Connection, records: &[NewBalance]) -> Result<Vec<BalanceConflict>> {
    let mut conflicts = Vec::new();

    for record in records {
        let existing: Option<String> = conn
            .query_row(
                "SELECT balance FROM balance_observations
                 WHERE account = ?1 AND observed_date = ?2",
                params![record.account, record.date.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if let Some(previous_text) = existing {
            let previous = Decimal::from_str(&previous_text)
                .with_context(|| format!("Corrupt balance value: {}", previous_text))?;
            if previous != record.balance {
                conflicts.push(BalanceConflict {
                    account: record.account.clone(),
                    date: record.date,
                    previous,
                    replacement: record.balance,
                });
            }
        }

        conn.execute(
            "INSERT INTO balance_observations (account, observed_date, balance)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (account, observed_date)
             DO UPDATE SET balance = excluded.balance",
            params![
                record.account,
                record.date.to_string(),
                record.balance.to_string()
            ],
        )?;
    }

    Ok(conflicts)
}

/// Insert a single observation (initial-balance seeding)
pub fn insert_observation(conn: &Connection, observation: &BalanceObservation) -> Result<()> {
    conn.execute(
        "INSERT INTO balance_observations (account, observed_date, balance)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (account, observed_date)
         DO UPDATE SET balance = excluded.balance",
        params![
            observation.account,
            observation.date.to_string(),
            observation.balance.to_string()
        ],
    )?;
    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, transaction_date, merchant, category, account, \
     statement, amount, reconciled, reconcile_date, import_date";

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let date_text: String = row.get(1)?;
    let amount_text: String = row.get(6)?;
    let reconcile_text: Option<String> = row.get(8)?;
    let import_text: String = row.get(9)?;

    Ok(Transaction {
        id: row.get(0)?,
        date: parse_date_sql(&date_text)?,
        merchant: row.get(2)?,
        category: row.get(3)?,
        account: row.get(4)?,
        statement: row.get(5)?,
        amount: parse_decimal_sql(&amount_text)?,
        reconciled: row.get::<_, i64>(7)? != 0,
        reconcile_date: reconcile_text
            .as_deref()
            .map(parse_datetime_sql)
            .transpose()?,
        import_date: parse_datetime_sql(&import_text)?,
    })
}

/// Unreconciled transactions for one account with dates inside the inclusive
/// window, ordered by (date, id) so downstream search is deterministic.
pub fn get_unreconciled(
    conn: &Connection,
    account: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS}
         FROM transactions
         WHERE account = ?1 AND reconciled = 0
           AND transaction_date >= ?2 AND transaction_date <= ?3
         ORDER BY transaction_date, id"
    ))?;

    let transactions = stmt
        .query_map(
            params![account, start.to_string(), end.to_string()],
            row_to_transaction,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    let tx = conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
        params![id],
        row_to_transaction,
    )?;
    Ok(tx)
}

/// Ordered balance observations for one raw account name at or after min_date
pub fn get_observations(
    conn: &Connection,
    account: &str,
    min_date: Option<NaiveDate>,
) -> Result<Vec<BalanceObservation>> {
    let floor = min_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "0000-00-00".to_string());

    let mut stmt = conn.prepare(
        "SELECT account, observed_date, balance
         FROM balance_observations
         WHERE account = ?1 AND observed_date >= ?2
         ORDER BY observed_date",
    )?;

    let observations = stmt
        .query_map(params![account, floor], |row| {
            let date_text: String = row.get(1)?;
            let balance_text: String = row.get(2)?;
            Ok(BalanceObservation {
                account: row.get(0)?,
                date: parse_date_sql(&date_text)?,
                balance: parse_decimal_sql(&balance_text)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(observations)
}

/// Distinct account names appearing in the transactions table
pub fn transaction_accounts(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT account FROM transactions ORDER BY account")?;
    let accounts = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
}

/// Distinct account names appearing in the balance_observations table
pub fn observation_accounts(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT account FROM balance_observations ORDER BY account")?;
    let accounts = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
}

pub fn earliest_transaction_date(conn: &Connection, account: &str) -> Result<Option<NaiveDate>> {
    let date_text: Option<String> = conn.query_row(
        "SELECT MIN(transaction_date) FROM transactions WHERE account = ?1",
        params![account],
        |row| row.get(0),
    )?;

    date_text
        .map(|text| {
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .with_context(|| format!("Corrupt transaction date: {}", text))
        })
        .transpose()
}

/// Whether any of the given accounts has an observation strictly before the date
pub fn has_observation_before(
    conn: &Connection,
    accounts: &[String],
    date: NaiveDate,
) -> Result<bool> {
    for account in accounts {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM balance_observations
             WHERE account = ?1 AND observed_date < ?2",
            params![account, date.to_string()],
            |row| row.get(0),
        )?;
        if count > 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The date up to which an account is reconciled, if it ever was
pub fn get_frontier(conn: &Connection, account: &str) -> Result<Option<NaiveDate>> {
    let date_text: Option<String> = conn
        .query_row(
            "SELECT last_reconciled_date FROM account_state WHERE account = ?1",
            params![account],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    date_text
        .map(|text| {
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .with_context(|| format!("Corrupt frontier date: {}", text))
        })
        .transpose()
}

/// Advance the reconciliation frontier after a period resolves
pub fn set_frontier(conn: &Connection, account: &str, date: NaiveDate) -> Result<()> {
    conn.execute(
        "INSERT INTO account_state (account, last_reconciled_date)
         VALUES (?1, ?2)
         ON CONFLICT (account)
         DO UPDATE SET last_reconciled_date = excluded.last_reconciled_date",
        params![account, date.to_string()],
    )?;
    Ok(())
}

pub fn count_transactions(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// UPDATES
// ============================================================================

/// Flip the reconciled flag on a set of transactions, transactionally. The
/// reconcile timestamp is always at or after the import timestamp because it
/// is taken at call time.
pub fn mark_reconciled(conn: &Connection, ids: &[i64], timestamp: DateTime<Utc>) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    let stamp = timestamp.to_rfc3339();
    let mut updated = 0;
    for id in ids {
        updated += tx.execute(
            "UPDATE transactions SET reconciled = 1, reconcile_date = ?1
             WHERE id = ?2 AND reconciled = 0",
            params![stamp, id],
        )?;
    }
    tx.commit()?;

    Ok(updated)
}

/// Synthesize a zero-provenance adjusting entry supplied by the operator.
/// Returns the new row id.
pub fn insert_adjustment(
    conn: &Connection,
    account: &str,
    date: NaiveDate,
    amount: Decimal,
) -> Result<i64> {
    let now = Utc::now();
    let statement = format!("Manual adjustment entered {}", now.to_rfc3339());
    let record = NewTransaction {
        date,
        merchant: "Manual adjustment".to_string(),
        category: "Adjustment".to_string(),
        account: account.to_string(),
        statement,
        amount,
    };

    conn.execute(
        "INSERT INTO transactions (
            dedup_hash, transaction_date, merchant, category, account,
            statement, amount, reconciled, import_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        params![
            record.dedup_hash(),
            record.date.to_string(),
            record.merchant,
            record.category,
            record.account,
            record.statement,
            record.amount.to_string(),
            now.to_rfc3339(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

// ============================================================================
// SQL VALUE PARSING
// ============================================================================

fn conversion_error(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_date_sql(text: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(conversion_error)
}

fn parse_decimal_sql(text: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(text).map_err(conversion_error)
}

fn parse_datetime_sql(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(conversion_error)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    fn record(day: &str, account: &str, amount: &str, statement: &str) -> NewTransaction {
        NewTransaction {
            date: date(day),
            merchant: "Test Merchant".to_string(),
            category: "Test".to_string(),
            account: account.to_string(),
            statement: statement.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
        }
    }

    #[test]
    fn test_import_dedup_twice() {
        let conn = open();

        let records = vec![
            record("2023-01-05", "Checking", "-45.99", "STARBUCKS #12345"),
            record("2023-01-06", "Checking", "-120.50", "AMAZON PURCHASE"),
        ];

        let first = insert_transactions(&conn, &records).unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.duplicates, 0);

        let second = insert_transactions(&conn, &records).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);

        assert_eq!(count_transactions(&conn).unwrap(), 2);
    }

    #[test]
    fn test_dedup_distinguishes_statement() {
        let conn = open();

        // Same date, account and amount but different statements: two rows
        let records = vec![
            record("2023-01-05", "Checking", "-5.00", "COFFEE A"),
            record("2023-01-05", "Checking", "-5.00", "COFFEE B"),
        ];

        let outcome = insert_transactions(&conn, &records).unwrap();
        assert_eq!(outcome.inserted, 2);
    }

    #[test]
    fn test_balance_conflict_later_wins() {
        let conn = open();

        let first = vec![NewBalance {
            account: "Checking".to_string(),
            date: date("2023-01-31"),
            balance: Decimal::from_str("100.00").unwrap(),
        }];
        let conflicts = insert_balances(&conn, &first).unwrap();
        assert!(conflicts.is_empty());

        let second = vec![NewBalance {
            account: "Checking".to_string(),
            date: date("2023-01-31"),
            balance: Decimal::from_str("95.00").unwrap(),
        }];
        let conflicts = insert_balances(&conn, &second).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].previous, Decimal::from_str("100.00").unwrap());
        assert_eq!(
            conflicts[0].replacement,
            Decimal::from_str("95.00").unwrap()
        );

        // Later import won; still exactly one observation on the date
        let observations = get_observations(&conn, "Checking", None).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].balance, Decimal::from_str("95.00").unwrap());
    }

    #[test]
    fn test_reimport_same_balance_no_conflict() {
        let conn = open();

        let records = vec![NewBalance {
            account: "Checking".to_string(),
            date: date("2023-01-31"),
            balance: Decimal::from_str("100.00").unwrap(),
        }];
        insert_balances(&conn, &records).unwrap();
        let conflicts = insert_balances(&conn, &records).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_unreconciled_window_inclusive() {
        let conn = open();

        let records = vec![
            record("2023-01-01", "Checking", "-10.00", "on start boundary"),
            record("2023-01-15", "Checking", "-20.00", "inside"),
            record("2023-01-31", "Checking", "-30.00", "on end boundary"),
            record("2023-02-01", "Checking", "-40.00", "outside"),
        ];
        insert_transactions(&conn, &records).unwrap();

        let pool =
            get_unreconciled(&conn, "Checking", date("2023-01-01"), date("2023-01-31")).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool[0].date, date("2023-01-01"));
        assert_eq!(pool[2].date, date("2023-01-31"));
    }

    #[test]
    fn test_mark_reconciled_sets_timestamp() {
        let conn = open();

        insert_transactions(&conn, &[record("2023-01-05", "Checking", "-9.99", "x")]).unwrap();
        let pool =
            get_unreconciled(&conn, "Checking", date("2023-01-01"), date("2023-01-31")).unwrap();
        let id = pool[0].id;

        let stamp = Utc::now();
        let updated = mark_reconciled(&conn, &[id], stamp).unwrap();
        assert_eq!(updated, 1);

        let tx = get_transaction(&conn, id).unwrap();
        assert!(tx.reconciled);
        let reconcile_date = tx.reconcile_date.unwrap();
        assert!(reconcile_date >= tx.import_date);

        // Already reconciled: excluded from the pool and not re-flippable
        let pool =
            get_unreconciled(&conn, "Checking", date("2023-01-01"), date("2023-01-31")).unwrap();
        assert!(pool.is_empty());
        assert_eq!(mark_reconciled(&conn, &[id], Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_insert_adjustment() {
        let conn = open();

        let id = insert_adjustment(
            &conn,
            "Checking",
            date("2023-01-20"),
            Decimal::from_str("-7.00").unwrap(),
        )
        .unwrap();

        let tx = get_transaction(&conn, id).unwrap();
        assert_eq!(tx.amount, Decimal::from_str("-7.00").unwrap());
        assert_eq!(tx.merchant, "Manual adjustment");
        assert!(!tx.reconciled);
    }

    #[test]
    fn test_observations_ordered() {
        let conn = open();

        let records = vec![
            NewBalance {
                account: "Checking".to_string(),
                date: date("2023-03-01"),
                balance: Decimal::from_str("50.00").unwrap(),
            },
            NewBalance {
                account: "Checking".to_string(),
                date: date("2023-01-01"),
                balance: Decimal::from_str("100.00").unwrap(),
            },
            NewBalance {
                account: "Checking".to_string(),
                date: date("2023-02-01"),
                balance: Decimal::from_str("75.00").unwrap(),
            },
        ];
        insert_balances(&conn, &records).unwrap();

        let observations = get_observations(&conn, "Checking", Some(date("2023-01-15"))).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].date, date("2023-02-01"));
        assert_eq!(observations[1].date, date("2023-03-01"));
    }

    #[test]
    fn test_frontier_roundtrip() {
        let conn = open();

        assert!(get_frontier(&conn, "Checking").unwrap().is_none());

        set_frontier(&conn, "Checking", date("2023-01-31")).unwrap();
        assert_eq!(
            get_frontier(&conn, "Checking").unwrap(),
            Some(date("2023-01-31"))
        );

        // Advancing overwrites
        set_frontier(&conn, "Checking", date("2023-02-28")).unwrap();
        assert_eq!(
            get_frontier(&conn, "Checking").unwrap(),
            Some(date("2023-02-28"))
        );
    }

    #[test]
    fn test_backup_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ledger.db");

        // No database yet: nothing to back up
        assert!(backup_database(&db_path, 2).unwrap().is_none());

        let conn = Connection::open(&db_path).unwrap();
        setup_database(&conn).unwrap();
        drop(conn);

        for _ in 0..4 {
            assert!(backup_database(&db_path, 2).unwrap().is_some());
        }

        let backup_dir = dir.path().join("reconciliation_backups");
        let count = fs::read_dir(&backup_dir).unwrap().count();
        assert_eq!(count, 2);
    }
}
