pub mod change;
pub mod error;
pub mod ids;
#[cfg(feature = "memory")]
pub mod memory;
pub mod query;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

pub use change::{ChangeBatch, ChangeEvent, ChangeKind};
pub use error::{StoreError, StoreResult};
pub use ids::DocumentId;
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use query::{FieldFilter, SubscriptionQuery};
pub use types::{
    DEFAULT_COLLECTION, DEFAULT_ORDER_KEY, MessagePatch, MessageRole, MessageSnapshot,
    MessageStatus, NewMessage, Timestamp,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Live sequence of change batches for one subscription.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeBatch> + Send + 'static>>;

/// Contract a real-time document store client must satisfy for the chat widget.
///
/// Subscriptions deliver every state transition of a record at least once. Duplicates are
/// allowed; consumers are responsible for idempotence.
pub trait MessageStore: Send + Sync {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        record: NewMessage,
    ) -> BoxFuture<'a, StoreResult<DocumentId>>;

    fn subscribe(&self, query: SubscriptionQuery) -> StoreResult<ChangeStream>;

    /// Whether batches arrive ascending by the query's order key.
    ///
    /// Consumers reorder each batch locally when this returns `false`.
    fn delivers_in_order(&self) -> bool {
        true
    }
}
