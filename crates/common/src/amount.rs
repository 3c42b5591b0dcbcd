//! Fixed-point payment amount: exactly 7 fractional digits, positive.
//!
//! The 7-digit requirement is a property of the *string representation*,
//! not just of the numeric value, so parsing inspects the literal text
//! rather than relying on `Decimal`'s own scale (which would happily
//! accept "1" or "1.00000000" as equal to "1.0000000").

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const REQUIRED_FRACTIONAL_DIGITS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

impl Amount {
	pub fn parse(raw: &str) -> Result<Self, CoreError> {
		let (_, fractional) = raw.split_once('.').ok_or_else(|| {
			CoreError::validation(format!(
				"amount '{raw}' must have exactly {REQUIRED_FRACTIONAL_DIGITS} fractional digits"
			))
		})?;

		if fractional.len() != REQUIRED_FRACTIONAL_DIGITS || !fractional.bytes().all(|b| b.is_ascii_digit()) {
			return Err(CoreError::validation(format!(
				"amount '{raw}' must have exactly {REQUIRED_FRACTIONAL_DIGITS} fractional digits"
			)));
		}

		let value = Decimal::from_str(raw)
			.map_err(|e| CoreError::validation(format!("amount '{raw}' is not a decimal: {e}")))?;

		if value <= Decimal::ZERO {
			return Err(CoreError::validation(format!("amount '{raw}' must be positive")));
		}

		Ok(Self(value))
	}

	pub fn as_decimal(&self) -> Decimal {
		self.0
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:.*}", REQUIRED_FRACTIONAL_DIGITS, self.0)
	}
}

impl TryFrom<String> for Amount {
	type Error = CoreError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Amount::parse(&value)
	}
}

impl From<Amount> for String {
	fn from(value: Amount) -> Self {
		value.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_zero() {
		assert!(Amount::parse("0").is_err());
		assert!(Amount::parse("0.0000000").is_err());
	}

	#[test]
	fn rejects_eight_fractional_digits() {
		assert!(Amount::parse("1.00000000").is_err());
	}

	#[test]
	fn accepts_seven_fractional_digits() {
		assert_eq!(Amount::parse("1.0000000").unwrap().to_string(), "1.0000000");
		assert_eq!(Amount::parse("10.0000000").unwrap().to_string(), "10.0000000");
	}

	#[test]
	fn rejects_no_decimal_point() {
		assert!(Amount::parse("10").is_err());
	}

	#[test]
	fn rejects_negative() {
		assert!(Amount::parse("-1.0000000").is_err());
	}
}
