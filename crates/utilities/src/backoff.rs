//! Exponential backoff with jitter: delay doubles per attempt up to a
//! hard cap, then a random point in the top half of the window is chosen
//! so that many callers retrying at once do not all wake on the same
//! tick.

use std::time::Duration;

use rand::Rng;

/// A fixed backoff schedule. `initial` is the delay used for the first
/// retry; `max` caps how large the delay is allowed to grow.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
	initial: Duration,
	max: Duration,
}

impl Backoff {
	pub fn new(initial: Duration, max: Duration) -> Self {
		Self { initial, max }
	}

	/// `attempt` is zero-based: the first retry passes `0`.
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let uncapped = self.initial.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
		let capped = uncapped.min(self.max);
		jittered(capped)
	}

	/// True once `attempt` has exhausted the schedule, i.e. even an
	/// unjittered delay would sit at the cap. Callers use this to decide
	/// when a series of transient failures should be treated as
	/// exhausted/poisoned rather than retried again.
	pub fn is_exhausted(&self, attempt: u32) -> bool {
		let uncapped = self.initial.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
		uncapped >= self.max
	}
}

fn jittered(window: Duration) -> Duration {
	let half_millis = window.as_millis() as u64 / 2;
	if half_millis == 0 {
		return window;
	}
	let jitter_millis = rand::thread_rng().gen_range(0..half_millis);
	Duration::from_millis(half_millis + jitter_millis)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn delay_grows_then_caps() {
		let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
		assert!(backoff.delay_for_attempt(0) <= Duration::from_millis(100));
		assert!(backoff.delay_for_attempt(10) <= Duration::from_secs(10));
		assert!(backoff.is_exhausted(10));
		assert!(!backoff.is_exhausted(0));
	}

	#[test]
	fn jitter_stays_within_the_window() {
		let backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(1000));
		for attempt in 0..5 {
			let delay = backoff.delay_for_attempt(attempt);
			assert!(delay <= Duration::from_millis(1000));
		}
	}
}
