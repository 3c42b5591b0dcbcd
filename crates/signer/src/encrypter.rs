//! Symmetric AEAD encryption for account secret material, keyed by an
//! operator-provided passphrase. Plaintext never reaches a log line or
//! error chain; callers pass only the encrypted form onward.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use disb_common::CoreError;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub trait SecretEncrypter: Send + Sync {
	fn encrypt(&self, plaintext: &str) -> Result<String, CoreError>;
	fn decrypt(&self, ciphertext: &str) -> Result<Zeroizing<String>, CoreError>;
}

/// AES-256-GCM keyed by SHA-256 of the operator passphrase. Serialized
/// form is `base64(nonce) ++ ":" ++ base64(ciphertext)`.
pub struct AesGcmEncrypter {
	cipher: Aes256Gcm,
}

impl AesGcmEncrypter {
	pub fn new(passphrase: &str) -> Self {
		let key_bytes = Sha256::digest(passphrase.as_bytes());
		let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
		Self { cipher: Aes256Gcm::new(key) }
	}
}

impl SecretEncrypter for AesGcmEncrypter {
	fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
		let mut nonce_bytes = [0u8; 12];
		rand::thread_rng().fill_bytes(&mut nonce_bytes);
		let nonce = Nonce::from_slice(&nonce_bytes);

		let ciphertext = self
			.cipher
			.encrypt(nonce, plaintext.as_bytes())
			.map_err(|_| CoreError::invariant("failed to encrypt secret material"))?;

		Ok(format!("{}:{}", BASE64.encode(nonce_bytes), BASE64.encode(ciphertext)))
	}

	fn decrypt(&self, ciphertext: &str) -> Result<Zeroizing<String>, CoreError> {
		let (nonce_part, cipher_part) = ciphertext
			.split_once(':')
			.ok_or_else(|| CoreError::invariant("encrypted secret is malformed: missing nonce separator"))?;

		let nonce_bytes = BASE64
			.decode(nonce_part)
			.map_err(|error| CoreError::invariant(format!("encrypted secret has invalid nonce encoding: {error}")))?;
		let cipher_bytes = BASE64
			.decode(cipher_part)
			.map_err(|error| CoreError::invariant(format!("encrypted secret has invalid ciphertext encoding: {error}")))?;

		let nonce = Nonce::from_slice(&nonce_bytes);
		let plaintext = self
			.cipher
			.decrypt(nonce, cipher_bytes.as_ref())
			.map_err(|_| CoreError::invariant("failed to decrypt secret material"))?;

		Ok(Zeroizing::new(
			String::from_utf8(plaintext).map_err(|error| CoreError::invariant(format!("decrypted secret is not valid utf-8: {error}")))?,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_encrypt_and_decrypt() {
		let encrypter = AesGcmEncrypter::new("operator passphrase");
		let ciphertext = encrypter.encrypt("SEED_SECRET").unwrap();
		assert_ne!(ciphertext, "SEED_SECRET");
		let plaintext = encrypter.decrypt(&ciphertext).unwrap();
		assert_eq!(&*plaintext, "SEED_SECRET");
	}

	#[test]
	fn malformed_ciphertext_is_rejected() {
		let encrypter = AesGcmEncrypter::new("operator passphrase");
		assert!(encrypter.decrypt("not-encrypted").is_err());
	}
}
