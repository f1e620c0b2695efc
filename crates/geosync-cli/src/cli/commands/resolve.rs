//! `geosync resolve` – show published artifacts and the change decision, without downloading.

use anyhow::Result;
use geosync_core::change::{decide, Decision};
use geosync_core::config::GeosyncConfig;
use geosync_core::ledger::HashLedger;
use geosync_core::resolver::{DescriptorResolver, HttpPageResolver};

pub async fn run_resolve(cfg: &GeosyncConfig) -> Result<()> {
    let ledger = HashLedger::load(&cfg.ledger_path)?;
    let resolver = HttpPageResolver::new(&cfg.browser.user_agent, cfg.identity, cfg.checksum);

    for page in &cfg.pages {
        println!("{}", page.url);
        let descriptors = match resolver.resolve(page).await {
            Ok(d) => d,
            Err(e) => {
                println!("  error: {e}");
                continue;
            }
        };
        for d in descriptors {
            let decision = match decide(&d.identity, &d.expected_hash, &ledger) {
                Decision::Skip => "skip",
                Decision::Fetch => "fetch",
            };
            println!("  {:<5} {:<5} {}  {}", decision, d.label, d.expected_hash, d.download_url);
        }
    }
    Ok(())
}
