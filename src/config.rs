// Run Configuration - single immutable object constructed at startup
// Loaded once from a JSON file and passed explicitly to each component

use anyhow::{Context as AnyhowContext, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// ACCOUNT ALIASING
// ============================================================================

/// Treat several exported accounts as one logical balance.
///
/// Any account whose name contains `member_contains` (case-insensitive) is
/// folded into the account named `canonical`: its transactions are rewritten
/// at import and its balance observations are summed per date when the
/// timeline is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAlias {
    /// Substring identifying member accounts (e.g. "SoFi Vault")
    pub member_contains: String,

    /// Exact name of the account the members fold into (e.g. "SoFi Savings")
    pub canonical: String,
}

impl AccountAlias {
    pub fn applies_to(&self, account: &str) -> bool {
        account
            .to_lowercase()
            .contains(&self.member_contains.to_lowercase())
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the reconciliation database lives
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Where to look for exported CSV files
    #[serde(default = "default_import_dir")]
    pub import_dir: PathBuf,

    /// Transactions and periods entirely before this date are ignored
    #[serde(default)]
    pub earliest_reconcile_date: Option<NaiveDate>,

    /// Absolute amount tolerance for subset matching (default: one cent)
    #[serde(default = "default_tolerance")]
    pub tolerance: Decimal,

    /// Residuals at or above this magnitude classify as major discrepancies
    #[serde(default = "default_major_threshold")]
    pub major_discrepancy_threshold: Decimal,

    /// Accounts to combine into one logical balance
    #[serde(default)]
    pub account_aliases: Vec<AccountAlias>,

    /// Worker threads for the parallel search phase
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Candidate pools larger than this degrade to the sampling search
    #[serde(default = "default_max_enumeration")]
    pub max_enumeration: usize,

    /// Iteration budget for the degraded sampling search
    #[serde(default = "default_sample_iterations")]
    pub sample_iterations: usize,

    /// Dated database backups kept before the oldest are pruned
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reconciliation.db")
}

fn default_import_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_tolerance() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_major_threshold() -> Decimal {
    Decimal::new(1000, 2) // 10.00
}

fn default_workers() -> usize {
    4
}

fn default_max_enumeration() -> usize {
    30
}

fn default_sample_iterations() -> usize {
    2000
}

fn default_max_backups() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: default_db_path(),
            import_dir: default_import_dir(),
            earliest_reconcile_date: None,
            tolerance: default_tolerance(),
            major_discrepancy_threshold: default_major_threshold(),
            account_aliases: Vec::new(),
            workers: default_workers(),
            max_enumeration: default_max_enumeration(),
            sample_iterations: default_sample_iterations(),
            max_backups: default_max_backups(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Map an account name to its canonical identity under the alias rules
    pub fn canonical_account(&self, account: &str) -> String {
        for alias in &self.account_aliases {
            if alias.applies_to(account) {
                return alias.canonical.clone();
            }
        }
        account.to_string()
    }

    /// All raw account names that fold into the given canonical account,
    /// out of a known set of names (the canonical name itself included)
    pub fn member_accounts(&self, canonical: &str, known: &[String]) -> Vec<String> {
        known
            .iter()
            .filter(|name| self.canonical_account(name) == canonical)
            .cloned()
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tolerance, Decimal::new(1, 2));
        assert_eq!(config.max_enumeration, 30);
        assert_eq!(config.workers, 4);
        assert!(config.earliest_reconcile_date.is_none());
    }

    #[test]
    fn test_parse_partial_json() {
        let json = r#"{
            "db_path": "/tmp/ledger.db",
            "earliest_reconcile_date": "2023-01-01",
            "tolerance": "0.01",
            "account_aliases": [
                {"member_contains": "SoFi Vault", "canonical": "SoFi Savings"}
            ]
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(
            config.earliest_reconcile_date,
            Some(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
        );
        // Unspecified fields fall back to defaults
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_backups, 20);
    }

    #[test]
    fn test_canonical_account_alias() {
        let config = Config {
            account_aliases: vec![AccountAlias {
                member_contains: "SoFi Vault".to_string(),
                canonical: "SoFi Savings".to_string(),
            }],
            ..Config::default()
        };

        assert_eq!(
            config.canonical_account("SoFi Vault - Emergency"),
            "SoFi Savings"
        );
        assert_eq!(config.canonical_account("sofi vault trip"), "SoFi Savings");
        assert_eq!(config.canonical_account("BofA Checking"), "BofA Checking");
    }

    #[test]
    fn test_member_accounts() {
        let config = Config {
            account_aliases: vec![AccountAlias {
                member_contains: "SoFi Vault".to_string(),
                canonical: "SoFi Savings".to_string(),
            }],
            ..Config::default()
        };

        let known = vec![
            "SoFi Savings".to_string(),
            "SoFi Vault - Emergency".to_string(),
            "BofA Checking".to_string(),
        ];

        let members = config.member_accounts("SoFi Savings", &known);
        assert_eq!(members.len(), 2);
        assert!(members.contains(&"SoFi Savings".to_string()));
        assert!(members.contains(&"SoFi Vault - Emergency".to_string()));
    }
}
