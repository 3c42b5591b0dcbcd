use std::sync::Arc;

use chrono::Utc;
use disb_utilities::Backoff;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::handler::Handler;
use crate::message::{ErrorRecord, Message};

/// Governs both the read loop (how hard to retry a failed `receive`) and
/// the per-handler retry loop (how hard to retry a single handler against
/// a single message before it is treated as poisoned).
#[derive(Debug, Clone, Copy)]
pub struct ConsumerConfig {
	pub read_backoff: Backoff,
	pub handler_backoff: Backoff,
}

enum Outcome {
	Done,
	Poisoned,
	Reemit(Message),
}

/// Drives one topic's messages through a fixed list of handlers. Each
/// handler retries independently: one handler poisoning a message does
/// not stop the others from having already succeeded, and a message
/// resumed from the dead-letter topic skips every handler already
/// recorded in `succeeded_handlers`.
pub struct EventConsumer {
	bus: Arc<dyn EventBus>,
	topic: String,
	handlers: Vec<Arc<dyn Handler>>,
	config: ConsumerConfig,
}

impl EventConsumer {
	pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>, handlers: Vec<Arc<dyn Handler>>, config: ConsumerConfig) -> Self {
		Self { bus, topic: topic.into(), handlers, config }
	}

	/// Runs until `cancellation` fires. A message that is mid-retry when
	/// cancellation fires is re-published to its original topic with its
	/// accumulated `succeeded_handlers`/`errors` intact, so the next
	/// consumer to pick it up does not repeat already-succeeded handlers.
	pub async fn run(&self, cancellation: CancellationToken) -> anyhow::Result<()> {
		let mut read_attempt = 0u32;
		loop {
			let received = tokio::select! {
				_ = cancellation.cancelled() => return Ok(()),
				result = self.bus.receive(&self.topic) => result,
			};
			let message = match received {
				Ok(message) => {
					read_attempt = 0;
					message
				}
				Err(err) => {
					tracing::warn!(error = %err, topic = %self.topic, "event read failed, backing off");
					let delay = self.config.read_backoff.delay_for_attempt(read_attempt);
					read_attempt = read_attempt.saturating_add(1);
					tokio::select! {
						_ = cancellation.cancelled() => return Ok(()),
						_ = tokio::time::sleep(delay) => {}
					}
					continue;
				}
			};

			match self.process(message, &cancellation).await {
				Outcome::Done | Outcome::Poisoned => {}
				Outcome::Reemit(message) => {
					if let Err(err) = self.bus.publish(message).await {
						tracing::error!(error = %err, "failed to re-emit message interrupted by shutdown");
					}
					return Ok(());
				}
			}
		}
	}

	async fn process(&self, mut message: Message, cancellation: &CancellationToken) -> Outcome {
		for handler in &self.handlers {
			if message.succeeded_handlers.contains(handler.id()) {
				continue;
			}

			let mut attempt = 0u32;
			loop {
				if cancellation.is_cancelled() {
					return Outcome::Reemit(message);
				}

				match handler.handle(&message).await {
					Ok(()) => {
						message.succeeded_handlers.insert(handler.id().to_string());
						break;
					}
					Err(err) => {
						tracing::warn!(error = %err, handler_id = handler.id(), key = %message.key, "handler failed");
						message.errors.push(ErrorRecord { handler_id: handler.id().to_string(), message: err.to_string(), at: Utc::now() });

						if self.config.handler_backoff.is_exhausted(attempt) {
							self.publish_to_dlq(message).await;
							return Outcome::Poisoned;
						}

						let delay = self.config.handler_backoff.delay_for_attempt(attempt);
						attempt = attempt.saturating_add(1);
						tokio::select! {
							_ = cancellation.cancelled() => return Outcome::Reemit(message),
							_ = tokio::time::sleep(delay) => {}
						}
					}
				}
			}
		}

		Outcome::Done
	}

	async fn publish_to_dlq(&self, mut message: Message) {
		let dlq_topic = format!("{}.dlq", self.topic);
		tracing::error!(key = %message.key, original_topic = %self.topic, dlq_topic = %dlq_topic, "handler exhausted retries, moving message to dead-letter topic");
		message.topic = dlq_topic;
		if let Err(err) = self.bus.publish(message).await {
			tracing::error!(error = %err, "failed to publish poisoned message to dead-letter topic");
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use async_trait::async_trait;
	use serde_json::json;

	use super::*;
	use crate::bus::InProcessEventBus;

	struct CountingHandler {
		id: &'static str,
		fail_times: usize,
		attempts: AtomicUsize,
	}

	#[async_trait]
	impl Handler for CountingHandler {
		fn id(&self) -> &str {
			self.id
		}

		async fn handle(&self, _message: &Message) -> anyhow::Result<()> {
			let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
			if attempt < self.fail_times {
				anyhow::bail!("simulated failure {attempt}");
			}
			Ok(())
		}
	}

	fn fast_config() -> ConsumerConfig {
		ConsumerConfig {
			read_backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
			handler_backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
		}
	}

	#[tokio::test]
	async fn handler_succeeding_after_retries_is_recorded_as_succeeded() {
		let bus = Arc::new(InProcessEventBus::new());
		bus.publish(Message::new("k1", "topic-a", json!({}))).await.unwrap();

		let handler = Arc::new(CountingHandler { id: "h1", fail_times: 2, attempts: AtomicUsize::new(0) });
		let consumer = EventConsumer::new(bus.clone() as Arc<dyn EventBus>, "topic-a", vec![handler.clone() as Arc<dyn Handler>], fast_config());

		let cancellation = CancellationToken::new();
		let child = cancellation.child_token();
		let handle = tokio::spawn(async move { consumer.run(child).await });
		tokio::time::sleep(Duration::from_millis(50)).await;
		cancellation.cancel();
		handle.await.unwrap().unwrap();

		assert!(handler.attempts.load(Ordering::SeqCst) >= 3);
	}

	#[tokio::test]
	async fn handler_that_never_succeeds_is_moved_to_the_dead_letter_topic() {
		let bus = Arc::new(InProcessEventBus::new());
		bus.publish(Message::new("k1", "topic-b", json!({}))).await.unwrap();

		let handler = Arc::new(CountingHandler { id: "h1", fail_times: usize::MAX, attempts: AtomicUsize::new(0) });
		let consumer = EventConsumer::new(bus.clone() as Arc<dyn EventBus>, "topic-b", vec![handler as Arc<dyn Handler>], fast_config());

		let cancellation = CancellationToken::new();
		let child = cancellation.child_token();
		let handle = tokio::spawn(async move { consumer.run(child).await });

		let dlq_message = tokio::time::timeout(Duration::from_secs(1), bus.receive("topic-b.dlq")).await.unwrap().unwrap();
		assert_eq!(dlq_message.key, "k1");
		assert!(!dlq_message.errors.is_empty());

		cancellation.cancel();
		handle.await.unwrap().unwrap();
	}
}
