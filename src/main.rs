use anyhow::Result;
use rusqlite::Connection;
use std::env;
use std::sync::atomic::AtomicBool;

use ledger_reconcile::{
    backup_database, count_transactions, find_latest_export, insert_balances,
    insert_transactions, load_balances, load_transactions, prepare_transactions, runner,
    setup_database, Config, TerminalOperator,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let (import_only, config_path) = match args.get(1).map(String::as_str) {
        Some("import") => (true, args.get(2).cloned()),
        other => (false, other.map(str::to_string)),
    };

    let config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    if import_only {
        run_import(&config)?;
    } else {
        run_import(&config)?;
        run_reconcile(&config)?;
    }

    Ok(())
}

fn run_import(config: &Config) -> Result<()> {
    // Back up before anything mutates
    match backup_database(&config.db_path, config.max_backups)? {
        Some(path) => println!(" - Database backed up to {:?}", path),
        None => println!(" - No database found to back up."),
    }

    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;

    // Transactions
    let tx_path = find_latest_export(&config.import_dir, "*transactions*.csv")?;
    println!(" - Importing transactions from {:?}", tx_path);
    let records = prepare_transactions(load_transactions(&tx_path)?, config);
    let outcome = insert_transactions(&conn, &records)?;
    println!(
        " - {} new transactions added, {} duplicates skipped.",
        outcome.inserted, outcome.duplicates
    );

    // Balances
    let balance_path = find_latest_export(&config.import_dir, "*balances*.csv")?;
    println!(" - Importing balances from {:?}", balance_path);
    let balances = load_balances(&balance_path)?;
    let conflicts = insert_balances(&conn, &balances)?;
    for conflict in &conflicts {
        println!(
            " - Superseded balance for {} on {}: {} -> {}",
            conflict.account, conflict.date, conflict.previous, conflict.replacement
        );
    }

    println!(
        " - Store now holds {} transactions.",
        count_transactions(&conn)?
    );

    Ok(())
}

fn run_reconcile(config: &Config) -> Result<()> {
    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;

    let mut operator = TerminalOperator;
    let cancel = AtomicBool::new(false);

    let summary = runner::run(&conn, config, &mut operator, &cancel)?;
    print!("{}", summary.render());
    println!(
        "\n{} periods resolved, {} discrepancies left open.",
        summary.resolved_count(),
        summary.open_count()
    );

    Ok(())
}
