mod account;
mod friend;
mod ledger;
mod money;
mod transaction;

pub use account::*;
pub use friend::*;
pub use ledger::*;
pub use money::*;
pub use transaction::*;
