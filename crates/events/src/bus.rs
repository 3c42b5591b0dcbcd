use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::message::Message;

/// A topic-addressed queue of [`Message`]s. Implementations only need to
/// guarantee at-least-once delivery within a topic; ordering across
/// topics is not specified.
#[async_trait]
pub trait EventBus: Send + Sync {
	async fn publish(&self, message: Message) -> anyhow::Result<()>;

	/// Blocks until a message is available on `topic`.
	async fn receive(&self, topic: &str) -> anyhow::Result<Message>;
}

/// An in-process bus backed by one unbounded mpsc channel per topic.
/// Topics are created lazily on first publish or receive.
pub struct InProcessEventBus {
	topics: Mutex<HashMap<String, Arc<Topic>>>,
}

struct Topic {
	sender: mpsc::UnboundedSender<Message>,
	receiver: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl InProcessEventBus {
	pub fn new() -> Self {
		Self { topics: Mutex::new(HashMap::new()) }
	}

	async fn topic(&self, name: &str) -> Arc<Topic> {
		let mut topics = self.topics.lock().await;
		if let Some(topic) = topics.get(name) {
			return Arc::clone(topic);
		}
		let (sender, receiver) = mpsc::unbounded_channel();
		let topic = Arc::new(Topic { sender, receiver: Mutex::new(receiver) });
		topics.insert(name.to_string(), Arc::clone(&topic));
		topic
	}
}

impl Default for InProcessEventBus {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl EventBus for InProcessEventBus {
	async fn publish(&self, message: Message) -> anyhow::Result<()> {
		let topic = self.topic(&message.topic).await;
		topic.sender.send(message).map_err(|_| anyhow::anyhow!("event bus topic receiver dropped"))?;
		Ok(())
	}

	async fn receive(&self, topic: &str) -> anyhow::Result<Message> {
		let topic = self.topic(topic).await;
		let mut receiver = topic.receiver.lock().await;
		receiver.recv().await.ok_or_else(|| anyhow::anyhow!("event bus topic sender dropped"))
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn publish_then_receive_round_trips() {
		let bus = InProcessEventBus::new();
		bus.publish(Message::new("k1", "payment-completed", json!({"payment_id": "p1"}))).await.unwrap();
		let received = bus.receive("payment-completed").await.unwrap();
		assert_eq!(received.key, "k1");
		assert_eq!(received.payload["payment_id"], "p1");
	}

	#[tokio::test]
	async fn topics_are_independent() {
		let bus = InProcessEventBus::new();
		bus.publish(Message::new("k1", "topic-a", json!({}))).await.unwrap();
		let (tx, rx) = tokio::sync::oneshot::channel();
		tokio::spawn(async move {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			let _ = tx.send(());
		});
		rx.await.unwrap();
		assert!(tokio::time::timeout(std::time::Duration::from_millis(20), bus.receive("topic-b")).await.is_err());
	}
}
