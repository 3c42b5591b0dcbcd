//! Domain model and error taxonomy shared by every component of the
//! disbursement submission core.

pub mod account;
pub mod amount;
pub mod custodial;
pub mod disbursement;
pub mod error;
pub mod payment;
pub mod receiver_wallet;
pub mod submitter_transaction;
pub mod tenant;

pub use account::{
	AccountPlatform, AccountRole, AccountStatus, AccountStorage, AccountTag, AccountType, ChannelAccount,
	TransactionAccount,
};
pub use amount::Amount;
pub use custodial::{CircleTransferRequest, CustodialTransferStatus};
pub use disbursement::{Disbursement, DisbursementStatus};
pub use error::{redact_secret, CoreError};
pub use payment::{Asset, Payment, PaymentStatus, StatusHistoryEntry};
pub use receiver_wallet::{ReceiverWallet, ReceiverWalletStatus};
pub use submitter_transaction::{SubmitterTransaction, SubmitterTransactionState};
pub use tenant::{DistributionPlatform, Organization, Tenant};
