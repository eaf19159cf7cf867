// Remote mirror of the processed ledger
//
// - Store: path-addressed content store trait
// - GitHub: contents API implementation of the store
// - Manager: ledger reconciliation plus the no-op capability

pub mod github;
pub mod manager;
pub mod store;

pub use github::*;
pub use manager::*;
pub use store::*;
