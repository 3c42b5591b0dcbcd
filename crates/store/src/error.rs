use disb_common::CoreError;

/// Classifies a database-layer error onto the crate-wide error kind:
/// connection/transport failures are transient, constraint violations
/// are validation failures, everything else is an internal invariant
/// break worth alerting on.
pub fn map_sqlx_error(context: &str, error: sqlx::Error) -> CoreError {
	match &error {
		sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
			CoreError::transient(context.to_string(), error)
		}
		sqlx::Error::Database(db_error) if db_error.is_unique_violation() || db_error.is_check_violation() => {
			CoreError::validation(format!("{context}: {db_error}"))
		}
		sqlx::Error::RowNotFound => CoreError::validation(format!("{context}: row not found")),
		_ => CoreError::invariant(format!("{context}: {error}")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pool_timeout_is_transient() {
		let mapped = map_sqlx_error("leasing", sqlx::Error::PoolTimedOut);
		assert!(mapped.is_retryable());
	}

	#[test]
	fn row_not_found_is_a_validation_failure() {
		let mapped = map_sqlx_error("fetching disbursement", sqlx::Error::RowNotFound);
		assert!(!mapped.is_retryable());
	}
}
