use disb_ledger::LedgerSubmitError;

/// One row of the §4.4 response-classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
	/// Persist success, release the channel account, mark the payment
	/// success.
	Success,
	/// Keep the row `sent`; a later reconciliation pass resolves it.
	KeepSent,
	/// Refresh the channel account's sequence, re-sign, retry.
	RebuildWithFreshSequence,
	/// Increase the fee within policy, re-sign, retry.
	IncreaseFee,
	/// Persist `fatal`, mark the payment failed with a reason.
	Fatal,
	/// Back off exponentially, same attempt.
	BackOffSameAttempt,
	/// Retry up to `max_attempts` with exponential backoff; on
	/// exhaustion mark `error` and emit a DLQ event.
	RetryWithBackoff,
}

pub fn classify_for_retry(error: &LedgerSubmitError) -> RetryAction {
	match error {
		LedgerSubmitError::Timeout => RetryAction::KeepSent,
		LedgerSubmitError::BadSequence => RetryAction::RebuildWithFreshSequence,
		LedgerSubmitError::InsufficientFee => RetryAction::IncreaseFee,
		LedgerSubmitError::InsufficientBalance
		| LedgerSubmitError::TrustlineMissing
		| LedgerSubmitError::OpNoDestination => RetryAction::Fatal,
		LedgerSubmitError::RateLimited => RetryAction::BackOffSameAttempt,
		LedgerSubmitError::Other { .. } | LedgerSubmitError::Transport(_) => RetryAction::RetryWithBackoff,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_errors_classify_as_fatal() {
		assert_eq!(classify_for_retry(&LedgerSubmitError::InsufficientBalance), RetryAction::Fatal);
		assert_eq!(classify_for_retry(&LedgerSubmitError::TrustlineMissing), RetryAction::Fatal);
		assert_eq!(classify_for_retry(&LedgerSubmitError::OpNoDestination), RetryAction::Fatal);
	}

	#[test]
	fn bad_sequence_rebuilds() {
		assert_eq!(classify_for_retry(&LedgerSubmitError::BadSequence), RetryAction::RebuildWithFreshSequence);
	}
}
