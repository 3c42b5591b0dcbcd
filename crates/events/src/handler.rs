use async_trait::async_trait;

use crate::message::Message;

/// One independently-retried unit of work against a message. A topic may
/// have several handlers registered; each tracks its own success/failure
/// and retry schedule so a slow or failing handler never blocks the
/// others from completing.
#[async_trait]
pub trait Handler: Send + Sync {
	/// Stable identity used as the key into `Message::succeeded_handlers`
	/// and into the DLQ error history. Must not change across deploys or
	/// replayed messages silently lose their completed-handler bookkeeping.
	fn id(&self) -> &str;

	async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}
