//! The transaction submitter engine (C4): builds, signs, submits, and
//! tracks ledger transactions for one payment at a time, plus the
//! account-creation/change-trust/fund-distribution flows that reuse the
//! same build/sign/submit machinery with a different operation set.

pub mod engine;
pub mod retry;

pub use engine::{SubmitterEngine, SubmitterEngineConfig, PAYMENT_COMPLETED_TOPIC, SUBMITTER_DLQ_TOPIC};
pub use retry::{classify_for_retry, RetryAction};
