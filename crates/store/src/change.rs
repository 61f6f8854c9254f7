use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::ids::DocumentId;
use super::types::{DEFAULT_ORDER_KEY, MessageSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One record-level notification from a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: DocumentId,
    #[serde(default, alias = "data")]
    pub snapshot: MessageSnapshot,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, id: DocumentId, snapshot: MessageSnapshot) -> Self {
        Self { kind, id, snapshot }
    }

    pub fn added(id: DocumentId, snapshot: MessageSnapshot) -> Self {
        Self::new(ChangeKind::Added, id, snapshot)
    }

    pub fn modified(id: DocumentId, snapshot: MessageSnapshot) -> Self {
        Self::new(ChangeKind::Modified, id, snapshot)
    }

    pub fn removed(id: DocumentId, snapshot: MessageSnapshot) -> Self {
        Self::new(ChangeKind::Removed, id, snapshot)
    }
}

/// Ordered group of change events delivered together by a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeBatch {
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self { events }
    }

    pub fn single(event: ChangeEvent) -> Self {
        Self {
            events: vec![event],
        }
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }

    /// Stable sort by the subscription's ordering key.
    ///
    /// Events missing the key keep their relative order after every keyed event.
    pub fn sort_by_order_key(&mut self, order_key: &str) {
        self.events
            .sort_by(|left, right| compare_by_key(&left.snapshot, &right.snapshot, order_key));
    }
}

impl FromIterator<ChangeEvent> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = ChangeEvent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ChangeBatch {
    type Item = ChangeEvent;
    type IntoIter = std::vec::IntoIter<ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeBatch {
    type Item = &'a ChangeEvent;
    type IntoIter = std::slice::Iter<'a, ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

pub(crate) fn compare_by_key(
    left: &MessageSnapshot,
    right: &MessageSnapshot,
    order_key: &str,
) -> Ordering {
    if order_key == DEFAULT_ORDER_KEY {
        return missing_last(left.timestamp, right.timestamp);
    }

    missing_last(left.field(order_key), right.field(order_key))
}

fn missing_last<T: Ord>(left: Option<T>, right: Option<T>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
