pub mod config;
pub mod logging;

pub mod artifact;
pub mod browser;
pub mod change;
pub mod checksum;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod resolver;
pub mod runner;
pub mod verify;

pub use error::{PageError, SyncError};
pub use runner::{RunOutcome, SyncRunner};
