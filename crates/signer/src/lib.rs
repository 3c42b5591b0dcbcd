//! The signer router (C2): maps account type to a signing strategy and
//! dispatches through a closed table rather than subclassing.

pub mod encrypter;
pub mod router;
pub mod strategies;
pub mod strategy;

pub use encrypter::{AesGcmEncrypter, SecretEncrypter};
pub use router::SignerRouter;
pub use strategies::{
	ChannelDbStrategy, DistributionCustodialVaultStrategy, DistributionDbVaultStrategy, DistributionEnvStrategy,
	HostEnvStrategy,
};
pub use strategy::{NewAccount, SigningStrategy};
