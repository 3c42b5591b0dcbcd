//! Transaction envelope construction and Ed25519-over-SHA256 signing.
//!
//! The byte encoding here is a deterministic canonical form of the
//! envelope fields, not a byte-for-byte reimplementation of the
//! ledger protocol's own binary format — producing that exactly would
//! require vendoring the protocol's code generator. What matters for
//! every invariant this crate is responsible for (signatures verify,
//! two submissions of the same logical transaction hash identically) is
//! that the encoding is deterministic and covers every field the
//! preconditions depend on.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::tracker::LedgerBounds;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
	Payment { destination: String, asset_code: String, asset_issuer: String, amount: String },
	CreateAccount { destination: String, starting_balance: String },
	ChangeTrust { asset_code: String, asset_issuer: String },
	AccountMerge { destination: String },
}

#[derive(Debug, Clone)]
pub struct TransactionEnvelope {
	pub source_account: String,
	pub sequence: i64,
	pub operations: Vec<Operation>,
	pub base_fee: u32,
	pub ledger_bounds: LedgerBounds,
	pub memo: Option<String>,
}

impl TransactionEnvelope {
	/// Canonical bytes this envelope hashes and signs over. Every
	/// precondition-bearing field participates so two envelopes that
	/// differ only in, say, sequence number never collide.
	pub fn canonical_bytes(&self) -> Vec<u8> {
		let mut buffer = Vec::new();
		buffer.extend_from_slice(self.source_account.as_bytes());
		buffer.push(0);
		buffer.extend_from_slice(&self.sequence.to_be_bytes());
		buffer.extend_from_slice(&self.base_fee.to_be_bytes());
		buffer.extend_from_slice(&self.ledger_bounds.min_ledger.to_be_bytes());
		buffer.extend_from_slice(&self.ledger_bounds.max_ledger.to_be_bytes());
		if let Some(memo) = &self.memo {
			buffer.extend_from_slice(memo.as_bytes());
		}
		buffer.push(0);
		for op in &self.operations {
			encode_operation(&mut buffer, op);
		}
		buffer
	}
}

fn encode_operation(buffer: &mut Vec<u8>, op: &Operation) {
	match op {
		Operation::Payment { destination, asset_code, asset_issuer, amount } => {
			buffer.push(1);
			for field in [destination, asset_code, asset_issuer, amount] {
				buffer.extend_from_slice(field.as_bytes());
				buffer.push(0);
			}
		}
		Operation::CreateAccount { destination, starting_balance } => {
			buffer.push(2);
			for field in [destination, starting_balance] {
				buffer.extend_from_slice(field.as_bytes());
				buffer.push(0);
			}
		}
		Operation::ChangeTrust { asset_code, asset_issuer } => {
			buffer.push(3);
			for field in [asset_code, asset_issuer] {
				buffer.extend_from_slice(field.as_bytes());
				buffer.push(0);
			}
		}
		Operation::AccountMerge { destination } => {
			buffer.push(4);
			buffer.extend_from_slice(destination.as_bytes());
			buffer.push(0);
		}
	}
}

#[derive(Debug, Clone)]
pub struct SignedEnvelope {
	pub envelope: TransactionEnvelope,
	pub signatures: Vec<(VerifyingKey, Signature)>,
}

/// The SHA-256 of the network passphrase concatenated with the
/// envelope's canonical bytes: the transaction-signature base every
/// signer (whether through [`sign_envelope`] or a `disb-signer` strategy)
/// signs over.
pub fn signature_base(network_passphrase: &str, envelope: &TransactionEnvelope) -> Vec<u8> {
	let mut hasher = Sha256::new();
	hasher.update(network_passphrase.as_bytes());
	hasher.update(envelope.canonical_bytes());
	hasher.finalize().to_vec()
}

/// The base64 form submitted to the ledger client. Encodes only the
/// canonical envelope bytes, not the accompanying signatures — see the
/// module doc comment on why this crate does not attempt the protocol's
/// real binary signed-envelope format.
pub fn encode_envelope(envelope: &TransactionEnvelope) -> String {
	use base64::engine::general_purpose::STANDARD as BASE64;
	use base64::Engine;
	BASE64.encode(envelope.canonical_bytes())
}

/// Signs `envelope` with every key in `signing_keys`, in order. Every
/// signature is over the SHA-256 of the network passphrase concatenated
/// with the envelope's canonical bytes, matching the ledger protocol's
/// own transaction-signature base.
pub fn sign_envelope(
	network_passphrase: &str,
	envelope: TransactionEnvelope,
	signing_keys: &[SigningKey],
) -> SignedEnvelope {
	let digest = signature_base(network_passphrase, &envelope);
	let signatures =
		signing_keys.iter().map(|key| (key.verifying_key(), key.sign(&digest))).collect();

	SignedEnvelope { envelope, signatures }
}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::Verifier;
	use rand::rngs::OsRng;

	fn sample_envelope() -> TransactionEnvelope {
		TransactionEnvelope {
			source_account: "GDIST".into(),
			sequence: 42,
			operations: vec![Operation::Payment {
				destination: "GRECEIVER".into(),
				asset_code: "USDC".into(),
				asset_issuer: "GISSUER".into(),
				amount: "10.0000000".into(),
			}],
			base_fee: 100,
			ledger_bounds: LedgerBounds { min_ledger: 10, max_ledger: 20 },
			memo: Some("payment-ext-1".into()),
		}
	}

	#[test]
	fn signature_verifies_against_the_signing_key() {
		let signing_key = SigningKey::generate(&mut OsRng);
		let signed = sign_envelope("test network", sample_envelope(), std::slice::from_ref(&signing_key));

		let mut hasher = Sha256::new();
		hasher.update(b"test network");
		hasher.update(signed.envelope.canonical_bytes());
		let digest = hasher.finalize();

		let (public_key, signature) = &signed.signatures[0];
		assert!(public_key.verify(&digest, signature).is_ok());
	}

	#[test]
	fn different_sequence_numbers_produce_different_canonical_bytes() {
		let mut a = sample_envelope();
		let mut b = sample_envelope();
		b.sequence = a.sequence + 1;
		assert_ne!(a.canonical_bytes(), b.canonical_bytes());
		a.sequence += 1;
		assert_eq!(a.canonical_bytes(), b.canonical_bytes());
	}

	#[test]
	fn joint_signing_produces_one_signature_per_key_in_order() {
		let host = SigningKey::generate(&mut OsRng);
		let channel = SigningKey::generate(&mut OsRng);
		let signed = sign_envelope("test network", sample_envelope(), &[host.clone(), channel.clone()]);
		assert_eq!(signed.signatures.len(), 2);
		assert_eq!(signed.signatures[0].0, host.verifying_key());
		assert_eq!(signed.signatures[1].0, channel.verifying_key());
	}
}
