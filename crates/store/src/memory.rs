use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::mpsc;
use snafu::{OptionExt, ensure};

use super::change::{ChangeBatch, ChangeEvent, ChangeKind, compare_by_key};
use super::error::{NotFoundSnafu, RejectedSnafu, StoreResult};
use super::ids::DocumentId;
use super::query::SubscriptionQuery;
use super::types::{MessagePatch, MessageSnapshot, NewMessage};
use super::{BoxFuture, ChangeStream, MessageStore};

#[derive(Debug, Clone)]
struct Document {
    id: DocumentId,
    snapshot: MessageSnapshot,
}

struct Subscriber {
    query: SubscriptionQuery,
    sender: mpsc::UnboundedSender<ChangeBatch>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Document>>,
    subscribers: Vec<Subscriber>,
}

/// In-process document store with live-query subscriptions.
///
/// Documents keep creation order. Subscriptions receive an initial batch with every matching
/// document as `added`, then one batch per write. A write that moves a document into or out of a
/// subscriber's filter is reported as `added` or `removed` respectively.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record synchronously and notifies subscribers.
    pub fn insert_now(&self, collection: &str, record: NewMessage) -> StoreResult<DocumentId> {
        ensure!(
            !collection.trim().is_empty(),
            RejectedSnafu {
                stage: "memory-insert-validate",
                details: "collection name is blank".to_string(),
            }
        );

        let id = DocumentId::new_v7();
        let snapshot = record.into_snapshot();
        let mut state = self.lock();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                snapshot: snapshot.clone(),
            });
        broadcast(&mut state, collection, &id, None, Some(&snapshot));

        tracing::debug!(collection, id = %id, "inserted record");
        Ok(id)
    }

    /// Applies a partial update and returns the resulting snapshot.
    pub fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: &MessagePatch,
    ) -> StoreResult<MessageSnapshot> {
        let mut state = self.lock();
        let document = find_document_mut(&mut state, collection, id, "memory-update-find")?;
        let before = document.snapshot.clone();
        document.snapshot.apply(patch);
        let after = document.snapshot.clone();
        broadcast(&mut state, collection, id, Some(&before), Some(&after));

        tracing::debug!(collection, id = %id, "updated record");
        Ok(after)
    }

    pub fn delete(&self, collection: &str, id: &DocumentId) -> StoreResult<()> {
        let mut state = self.lock();
        let documents = state
            .collections
            .get_mut(collection)
            .context(NotFoundSnafu {
                stage: "memory-delete-collection",
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let index = documents
            .iter()
            .position(|document| &document.id == id)
            .context(NotFoundSnafu {
                stage: "memory-delete-find",
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let removed = documents.remove(index);
        broadcast(&mut state, collection, id, Some(&removed.snapshot), None);
        Ok(())
    }

    /// Re-sends the current snapshot as `modified`, as a client does after a reconnect.
    pub fn redeliver(&self, collection: &str, id: &DocumentId) -> StoreResult<()> {
        let mut state = self.lock();
        let snapshot = find_document_mut(&mut state, collection, id, "memory-redeliver-find")?
            .snapshot
            .clone();
        broadcast(&mut state, collection, id, Some(&snapshot), Some(&snapshot));
        Ok(())
    }

    pub fn get(&self, collection: &str, id: &DocumentId) -> Option<MessageSnapshot> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|document| &document.id == id))
            .map(|document| document.snapshot.clone())
    }

    pub fn documents(&self, collection: &str) -> Vec<(DocumentId, MessageSnapshot)> {
        self.lock()
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|document| (document.id.clone(), document.snapshot.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of subscriptions whose receiver is still alive.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state
            .subscribers
            .retain(|subscriber| !subscriber.sender.is_closed());
        state.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageStore for MemoryStore {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        record: NewMessage,
    ) -> BoxFuture<'a, StoreResult<DocumentId>> {
        let result = self.insert_now(collection, record);
        Box::pin(async move { result })
    }

    fn subscribe(&self, query: SubscriptionQuery) -> StoreResult<ChangeStream> {
        let (sender, receiver) = mpsc::unbounded();
        let mut state = self.lock();

        let mut initial = state
            .collections
            .get(&query.collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| query.matches(&document.snapshot))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        initial.sort_by(|left, right| {
            compare_by_key(&left.snapshot, &right.snapshot, &query.order_key)
        });

        if !initial.is_empty() {
            let batch = initial
                .into_iter()
                .map(|document| ChangeEvent::added(document.id, document.snapshot))
                .collect::<ChangeBatch>();
            let _ = sender.unbounded_send(batch);
        }

        tracing::debug!(collection = %query.collection, "registered subscription");
        state.subscribers.push(Subscriber { query, sender });
        Ok(Box::pin(receiver))
    }
}

fn find_document_mut<'a>(
    state: &'a mut MemoryState,
    collection: &str,
    id: &DocumentId,
    stage: &'static str,
) -> StoreResult<&'a mut Document> {
    state
        .collections
        .get_mut(collection)
        .and_then(|documents| documents.iter_mut().find(|document| &document.id == id))
        .context(NotFoundSnafu {
            stage,
            collection: collection.to_string(),
            id: id.to_string(),
        })
}

fn broadcast(
    state: &mut MemoryState,
    collection: &str,
    id: &DocumentId,
    before: Option<&MessageSnapshot>,
    after: Option<&MessageSnapshot>,
) {
    state.subscribers.retain(|subscriber| {
        if subscriber.query.collection != collection {
            return !subscriber.sender.is_closed();
        }

        let matched_before = before.is_some_and(|snapshot| subscriber.query.matches(snapshot));
        let matches_now = after.is_some_and(|snapshot| subscriber.query.matches(snapshot));
        let event = match (matched_before, matches_now, before, after) {
            (false, true, _, Some(snapshot)) => {
                ChangeEvent::new(ChangeKind::Added, id.clone(), snapshot.clone())
            }
            (true, true, _, Some(snapshot)) => {
                ChangeEvent::new(ChangeKind::Modified, id.clone(), snapshot.clone())
            }
            (true, false, Some(previous), _) => {
                let snapshot = after.unwrap_or(previous);
                ChangeEvent::new(ChangeKind::Removed, id.clone(), snapshot.clone())
            }
            _ => return !subscriber.sender.is_closed(),
        };

        subscriber
            .sender
            .unbounded_send(ChangeBatch::single(event))
            .is_ok()
    });
}
