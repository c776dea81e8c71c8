// Transaction lock-state reconstruction
// Lock-mode algebra, per-transaction lock ledger, escalation

pub mod escalation;
pub mod ledger;
pub mod transaction;
pub mod types;

pub use escalation::*;
pub use ledger::*;
pub use transaction::*;
pub use types::*;
