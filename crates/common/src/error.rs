//! A closed set of error kinds shared across components, rather than one
//! type per call site. Components map lower-level
//! errors (`sqlx::Error`, `reqwest::Error`, ...) onto this enum at their
//! boundary; nothing upstream of that boundary should see the transport
//! error type directly.

use thiserror::Error;

/// Crate-wide error kind. Retryable variants are handled locally by the
/// originating component with backoff; terminal variants are mapped onto
/// status transitions by the caller.
#[derive(Debug, Error)]
pub enum CoreError {
	/// Input failed a precondition. Local, never retried, surfaces to the
	/// caller synchronously.
	#[error("validation failed: {context}")]
	ValidationFailed {
		context: String,
		#[source]
		source: Option<anyhow::Error>,
	},

	/// Ledger/custodial 5xx, 408, 429, or a network I/O failure. Retried
	/// with exponential backoff in the originating component.
	#[error("transient provider error ({context})")]
	TransientProviderError {
		context: String,
		#[source]
		source: anyhow::Error,
	},

	/// A 4xx with a ledger `result_code` in the terminal set, insufficient
	/// balance/trustline, or an invalid signature. The payment is marked
	/// failed; there is no further retry.
	#[error("terminal provider error ({context}): {reason}")]
	TerminalProviderError { context: String, reason: String },

	/// Detected via `tx_bad_seq`. The caller re-fetches the sequence and
	/// rebuilds, bounded by `max_attempts`.
	#[error("sequence contention on {account} (attempt {attempt})")]
	SequenceContention { account: String, attempt: u32 },

	/// No channel account became available within `lease_wait`.
	#[error("pool exhausted: no channel account available within the lease wait window")]
	PoolExhausted,

	/// A second dispatch was attempted for a payment id with a different
	/// shape than the first. The call is refused outright.
	#[error("idempotency violation for {key}: {context}")]
	IdempotencyViolation { key: String, context: String },

	/// An invariant the system depends on was observed broken (e.g. a
	/// mismatch between payments moved to pending and submitter rows
	/// inserted). Logged and surfaced to the observability sink; does not
	/// automatically mutate state.
	#[error("internal invariant broken: {context}")]
	InternalInvariantBroken { context: String },
}

impl CoreError {
	pub fn validation(context: impl Into<String>) -> Self {
		Self::ValidationFailed { context: context.into(), source: None }
	}

	pub fn transient(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
		Self::TransientProviderError { context: context.into(), source: source.into() }
	}

	pub fn terminal(context: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::TerminalProviderError { context: context.into(), reason: reason.into() }
	}

	pub fn invariant(context: impl Into<String>) -> Self {
		Self::InternalInvariantBroken { context: context.into() }
	}

	/// Whether the originating component should retry locally with
	/// backoff rather than surface the error to its caller.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::TransientProviderError { .. } | Self::SequenceContention { .. })
	}
}

/// Truncates a secret to its first 3 characters before it is allowed to
/// appear in a log line or error chain.
pub fn redact_secret(secret: &str) -> String {
	let visible: String = secret.chars().take(3).collect();
	format!("{visible}***")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn redact_keeps_only_three_leading_chars() {
		assert_eq!(redact_secret("SABCDEF1234567890"), "SAB***");
		assert_eq!(redact_secret("ab"), "ab***");
		assert_eq!(redact_secret(""), "***");
	}

	#[test]
	fn retryable_classification() {
		assert!(CoreError::transient("x", anyhow::anyhow!("boom")).is_retryable());
		assert!(CoreError::SequenceContention { account: "A".into(), attempt: 1 }.is_retryable());
		assert!(!CoreError::validation("x").is_retryable());
		assert!(!CoreError::PoolExhausted.is_retryable());
	}
}
