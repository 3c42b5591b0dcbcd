use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
	pub handler_id: String,
	pub message: String,
	pub at: DateTime<Utc>,
}

/// A message carries its own processing history so a replay (from the
/// DLQ, or after a cancelled retry) can skip handlers that already
/// succeeded instead of re-running every handler from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
	pub key: String,
	pub topic: String,
	pub payload: serde_json::Value,
	#[serde(default)]
	pub errors: Vec<ErrorRecord>,
	#[serde(default)]
	pub succeeded_handlers: HashSet<String>,
}

impl Message {
	pub fn new(key: impl Into<String>, topic: impl Into<String>, payload: serde_json::Value) -> Self {
		Self { key: key.into(), topic: topic.into(), payload, errors: Vec::new(), succeeded_handlers: HashSet::new() }
	}
}
