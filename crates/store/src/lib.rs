//! Postgres-backed stores. `ApplicationStore` owns payments,
//! disbursements, receiver wallets, and custodial transfer requests;
//! `SubmitterStore` owns submitter transactions and channel accounts.
//! They are deliberately two separate connection pools so a dispatcher
//! transaction spanning both stores is visibly two nested transactions,
//! never one.

pub mod application_store;
pub mod error;
pub mod submitter_store;

pub use application_store::ApplicationStore;
pub use error::map_sqlx_error;
pub use submitter_store::SubmitterStore;
