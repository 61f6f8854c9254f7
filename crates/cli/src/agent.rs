use std::time::Duration;

use futures::StreamExt;
use mirrorchat_store::{
    ChangeBatch, ChangeKind, FieldFilter, MemoryStore, MessagePatch, MessageStatus, MessageStore,
    StoreResult, SubscriptionQuery,
};
use snafu::{Snafu, ensure};

use crate::settings::CliSettings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReplyError {
    #[snafu(display("message has {chars} characters, limit is {limit}"))]
    TooLong {
        stage: &'static str,
        chars: usize,
        limit: usize,
    },
}

/// Local stand-in for the reply agent: answers every pending message with an echo.
pub struct EchoAgent {
    store: MemoryStore,
    collection: String,
    order_key: String,
    delay: Duration,
    prefix: String,
    max_input_chars: usize,
}

impl EchoAgent {
    pub fn new(store: MemoryStore, settings: &CliSettings) -> Self {
        Self {
            store,
            collection: settings.widget.collection.clone(),
            order_key: settings.widget.order_key.clone(),
            delay: Duration::from_millis(settings.agent_delay_ms),
            prefix: settings.echo_prefix.clone(),
            max_input_chars: settings.max_input_chars,
        }
    }

    pub fn compose_reply(&self, text: &str) -> Result<String, ReplyError> {
        let chars = text.chars().count();
        ensure!(
            chars <= self.max_input_chars,
            TooLongSnafu {
                stage: "echo-compose-reply",
                chars,
                limit: self.max_input_chars,
            }
        );
        Ok(format!("{}{}", self.prefix, text))
    }

    /// Watches pending records until the store drops the subscription.
    pub async fn run(self) -> StoreResult<()> {
        let query = SubscriptionQuery::new(self.collection.clone())
            .with_filter(FieldFilter::new("status", MessageStatus::Pending.as_str()))
            .ordered_by(self.order_key.clone());
        let mut pending = self.store.subscribe(query)?;

        tracing::info!(collection = %self.collection, "echo agent watching pending messages");
        while let Some(batch) = pending.next().await {
            let answered = self.handle_batch(&batch).await;
            tracing::debug!(events = batch.len(), answered, "handled pending batch");
        }
        Ok(())
    }

    /// Answers every pending record in the batch and returns how many were written.
    pub async fn handle_batch(&self, batch: &ChangeBatch) -> usize {
        let mut answered = 0;
        for event in batch {
            if event.kind == ChangeKind::Removed
                || event.snapshot.message_status() != Some(MessageStatus::Pending)
            {
                continue;
            }

            let text = event.snapshot.text().trim();
            if text.is_empty() {
                tracing::debug!(id = %event.id, "skipping blank pending message");
                continue;
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let patch = match self.compose_reply(text) {
                Ok(reply) => MessagePatch::replied(reply),
                Err(error) => {
                    tracing::warn!(id = %event.id, error = %error, "reply generation failed");
                    MessagePatch::failed(error.to_string())
                }
            };

            match self.store.update(&self.collection, &event.id, &patch) {
                Ok(_) => answered += 1,
                Err(error) => {
                    tracing::warn!(id = %event.id, error = %error, "could not write reply");
                }
            }
        }
        answered
    }
}

#[cfg(test)]
mod tests {
    use mirrorchat_store::{ChangeEvent, NewMessage, Timestamp};

    use super::*;

    fn agent(store: &MemoryStore) -> EchoAgent {
        let settings = CliSettings {
            agent_delay_ms: 0,
            max_input_chars: 8,
            ..CliSettings::default()
        };
        EchoAgent::new(store.clone(), &settings)
    }

    #[test]
    fn replies_are_prefixed_and_bounded() {
        let store = MemoryStore::new();
        let agent = agent(&store);

        assert_eq!(agent.compose_reply("hi").unwrap(), "echo: hi");
        assert!(agent.compose_reply("far too long").is_err());
    }

    #[tokio::test]
    async fn pending_messages_are_answered_once() {
        let store = MemoryStore::new();
        let agent = agent(&store);
        let id = store
            .insert_now("messages", NewMessage::user(" hi ", Timestamp::from_millis(1)))
            .unwrap();
        let blank = store
            .insert_now("messages", NewMessage::user("  ", Timestamp::from_millis(2)))
            .unwrap();

        let query = SubscriptionQuery::new("messages")
            .with_filter(FieldFilter::new("status", "pending"));
        let mut pending = store.subscribe(query).unwrap();
        let initial = pending.next().await.unwrap();

        assert_eq!(agent.handle_batch(&initial).await, 1);

        let answered = store.get("messages", &id).unwrap();
        assert_eq!(answered.reply(), "echo: hi");
        assert_eq!(answered.status(), "replied");
        assert_eq!(answered.role(), "assistant");
        assert_eq!(store.get("messages", &blank).unwrap().status(), "pending");

        // The answered record left the filter and is reported as removed.
        let removed = pending.next().await.unwrap();
        assert_eq!(removed.events()[0].kind, ChangeKind::Removed);
        assert_eq!(agent.handle_batch(&removed).await, 0);
    }

    #[tokio::test]
    async fn oversized_messages_are_marked_failed() {
        let store = MemoryStore::new();
        let agent = agent(&store);
        let id = store
            .insert_now(
                "messages",
                NewMessage::user("far too long", Timestamp::from_millis(1)),
            )
            .unwrap();

        let batch = ChangeBatch::single(ChangeEvent::added(
            id.clone(),
            store.get("messages", &id).unwrap(),
        ));
        agent.handle_batch(&batch).await;

        let snapshot = store.get("messages", &id).unwrap();
        assert_eq!(snapshot.status(), "error");
        assert!(
            snapshot
                .error_message
                .as_deref()
                .unwrap()
                .contains("limit is 8")
        );
        assert_eq!(snapshot.reply(), "");
    }
}
