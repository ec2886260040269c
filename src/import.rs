// CSV Import - typed record streams from exported transaction/balance files
// Discovery picks the newest export matching a pattern; parsing is pure serde

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db::{NewBalance, NewTransaction};

// ============================================================================
// FILE DISCOVERY
// ============================================================================

/// Case-insensitive filename match supporting `*` wildcards
/// (e.g. "transactions*.csv", "*balances*.csv")
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name = name.to_lowercase();
    let pattern = pattern.to_lowercase();

    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return name == pattern;
    }

    if !parts[0].is_empty() && !name.starts_with(parts[0]) {
        return false;
    }
    if !parts[parts.len() - 1].is_empty() && !name.ends_with(parts[parts.len() - 1]) {
        return false;
    }

    // Middle parts must appear in order
    let mut pos = parts[0].len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match name[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    true
}

/// The most recently modified file in `dir` matching `pattern`
pub fn find_latest_export(dir: &Path, pattern: &str) -> Result<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read import directory: {:?}", dir))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if !matches_pattern(&name, pattern) {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let is_newer = match &newest {
            Some((best, _)) => modified > *best,
            None => true,
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }

    newest
        .map(|(_, path)| path)
        .ok_or_else(|| anyhow!("No file matching {} found in {:?}", pattern, dir))
}

// ============================================================================
// PARSING
// ============================================================================

pub fn load_transactions(csv_path: &Path) -> Result<Vec<NewTransaction>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open transaction export: {:?}", csv_path))?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: NewTransaction =
            result.context("Failed to deserialize transaction record")?;
        records.push(record);
    }

    Ok(records)
}

pub fn load_balances(csv_path: &Path) -> Result<Vec<NewBalance>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open balance export: {:?}", csv_path))?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: NewBalance = result.context("Failed to deserialize balance record")?;
        records.push(record);
    }

    Ok(records)
}

// ============================================================================
// PRE-INSERT SHAPING
// ============================================================================

/// Apply the earliest-reconcile-date filter and rewrite aliased account names
/// to their canonical identity before the records reach the store.
pub fn prepare_transactions(
    records: Vec<NewTransaction>,
    config: &Config,
) -> Vec<NewTransaction> {
    records
        .into_iter()
        .filter(|record| match config.earliest_reconcile_date {
            Some(floor) => record.date >= floor,
            None => true,
        })
        .map(|mut record| {
            record.account = config.canonical_account(&record.account);
            record
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
