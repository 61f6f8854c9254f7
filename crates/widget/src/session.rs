use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use futures::stream::FuturesUnordered;
use mirrorchat_store::{
    BoxFuture, ChangeBatch, ChangeStream, DocumentId, MessageStore, StoreError, StoreResult,
    Timestamp,
};
use snafu::ResultExt;
use tokio::sync::mpsc;

use crate::compose::{Composer, PendingSend, SendOutcome};
use crate::error::{SubscribeSnafu, WidgetError, WidgetResult};
use crate::reconciler::{BatchReport, Reconciler};
use crate::settings::WidgetSettings;
use crate::view::ViewSurface;

type InFlight = BoxFuture<'static, (PendingSend, StoreResult<DocumentId>)>;

/// Input from the host: typed messages and the request to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Send(String),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Shutdown,
    SubscriptionEnded,
}

/// One widget instance bound to a store subscription.
pub struct ChatSession<V: ViewSurface> {
    store: Arc<dyn MessageStore>,
    reconciler: Reconciler<V>,
    composer: Composer,
    settings: WidgetSettings,
    changes: Option<ChangeStream>,
}

impl<V: ViewSurface> ChatSession<V> {
    /// Subscribes to the configured collection. Nothing is rendered until [`Self::run`] or
    /// [`Self::apply`] consumes batches.
    pub fn open(
        store: Arc<dyn MessageStore>,
        view: V,
        settings: WidgetSettings,
    ) -> WidgetResult<Self> {
        let settings = settings.normalized();
        let changes = store
            .subscribe(settings.query())
            .context(SubscribeSnafu {
                stage: "session-subscribe",
            })?;

        tracing::info!(
            collection = %settings.collection,
            order_key = %settings.order_key,
            in_order = store.delivers_in_order(),
            "opened chat session"
        );

        Ok(Self {
            composer: Composer::new(settings.collection.clone()),
            reconciler: Reconciler::new(view),
            store,
            settings,
            changes: Some(changes),
        })
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    pub fn reconciler(&self) -> &Reconciler<V> {
        &self.reconciler
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn view(&self) -> &V {
        self.reconciler.view()
    }

    pub fn into_view(self) -> V {
        self.reconciler.into_view()
    }

    /// Applies one batch, reordering it first when the store does not guarantee order.
    pub fn apply(&mut self, mut batch: ChangeBatch) -> BatchReport {
        if !self.store.delivers_in_order() {
            batch.sort_by_order_key(&self.settings.order_key);
        }
        self.reconciler.apply_batch(&batch)
    }

    /// Runs the compose path once and waits for the store to acknowledge it.
    pub async fn send(&mut self, text: impl Into<String>) -> SendOutcome {
        self.composer.set_draft(text);
        self.composer.send(self.store.as_ref()).await
    }

    /// Drives the session until shutdown or until the subscription ends.
    ///
    /// `on_batch` is called after every applied batch. Ready batches win over queued commands,
    /// and batches already delivered when shutdown arrives are rendered before returning.
    /// Inserts started by [`SessionCommand::Send`] run concurrently with rendering; on shutdown
    /// the loop waits for them to settle.
    pub async fn run<F>(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut on_batch: F,
    ) -> WidgetResult<SessionExit>
    where
        F: FnMut(&V, &BatchReport),
    {
        let mut changes = self.changes.take().ok_or_else(|| WidgetError::Subscribe {
            stage: "session-run",
            source: StoreError::SubscriptionClosed {
                stage: "session-run",
                collection: self.settings.collection.clone(),
            },
        })?;
        let mut in_flight: FuturesUnordered<InFlight> = FuturesUnordered::new();
        let mut commands_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                batch = changes.next() => match batch {
                    Some(batch) => {
                        let report = self.apply(batch);
                        on_batch(self.reconciler.view(), &report);
                    }
                    None => {
                        tracing::info!(collection = %self.settings.collection, "subscription ended");
                        break SessionExit::SubscriptionEnded;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Send(text)) => {
                        if let Some(send) = self.start_send(text) {
                            in_flight.push(send);
                        }
                    }
                    Some(SessionCommand::Shutdown) => break SessionExit::Shutdown,
                    None => {
                        tracing::debug!("command channel closed");
                        commands_open = false;
                    }
                },
                Some((pending, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.composer.finish(pending, result);
                }
            }
        };

        while let Some((pending, result)) = in_flight.next().await {
            self.composer.finish(pending, result);
        }

        if exit == SessionExit::Shutdown {
            while let Some(Some(batch)) = changes.next().now_or_never() {
                let report = self.apply(batch);
                on_batch(self.reconciler.view(), &report);
            }
            self.changes = Some(changes);
        }
        Ok(exit)
    }

    fn start_send(&mut self, text: String) -> Option<InFlight> {
        self.composer.set_draft(text);
        let Some(pending) = self.composer.begin_send(Timestamp::now()) else {
            tracing::debug!("skipping blank message");
            return None;
        };

        let store = Arc::clone(&self.store);
        Some(Box::pin(async move {
            let result = store
                .insert(&pending.collection, pending.record.clone())
                .await;
            (pending, result)
        }))
    }
}
