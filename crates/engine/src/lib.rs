//! Process wiring: turns [`settings::Settings`] into a running set of
//! components (stores, ledger tracker, signer router, channel pool,
//! submitter workers, dispatcher loop, event consumers, reconciler) all
//! spun up on one [`disb_utilities::TaskScope`], the way the teacher's
//! `engine` binary wires its eth/state-chain observers onto one runtime.

pub mod app;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod settings;

pub use app::App;
