//! The custodial provider client and the reconciler that polls it to
//! converge local payment state (C7).

pub mod client;
pub mod reconciler;

pub use client::{CustodialClient, CustodialError, ReqwestCustodialClient, SendPaymentRequest, TransferObject};
pub use reconciler::{CustodialReconciler, ReconcileSummary, ReconcilerConfig};
