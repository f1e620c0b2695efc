//! CLI command handlers, one per file.

mod checksum;
mod ledger;
mod resolve;
mod sync;
mod verify;

pub use checksum::run_checksum;
pub use ledger::run_ledger;
pub use resolve::run_resolve;
pub use sync::run_sync;
pub use verify::run_verify;
