//! `geosync ledger` – list ledger entries.

use anyhow::Result;
use geosync_core::config::GeosyncConfig;
use geosync_core::ledger::HashLedger;

pub fn run_ledger(cfg: &GeosyncConfig) -> Result<()> {
    let ledger = HashLedger::load(&cfg.ledger_path)?;
    if ledger.is_empty() {
        println!("No verified artifacts in {}.", cfg.ledger_path.display());
        return Ok(());
    }
    println!("{:<40}  {}", "HASH", "IDENTITY");
    for (identity, hash) in ledger.iter() {
        println!("{:<40}  {}", hash, identity);
    }
    Ok(())
}
