//! Ledger height tracking, the ledger HTTP client, and transaction
//! envelope construction/signing.

pub mod client;
pub mod envelope;
pub mod tracker;

pub use client::{AccountDetail, LedgerClient, LedgerSubmitError, ReqwestLedgerClient, SubmitOutcome};
pub use envelope::{encode_envelope, sign_envelope, signature_base, Operation, SignedEnvelope, TransactionEnvelope};
pub use tracker::{LedgerBounds, LedgerTracker};
