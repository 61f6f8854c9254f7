use std::cell::{Ref, RefCell};
use std::collections::VecDeque;

use mirrorchat_store::ChangeBatch;

use crate::reconciler::{BatchReport, Reconciler};
use crate::view::ViewSurface;

/// Reconciler shared with host callbacks that can fire while a batch is still rendering.
///
/// A batch delivered mid-render is queued and applied by the delivery already in progress,
/// after the batch it interrupted. Nothing is dropped and delivery order is kept.
pub struct BatchQueue<V: ViewSurface> {
    reconciler: RefCell<Reconciler<V>>,
    backlog: RefCell<VecDeque<ChangeBatch>>,
}

impl<V: ViewSurface> BatchQueue<V> {
    pub fn new(reconciler: Reconciler<V>) -> Self {
        Self {
            reconciler: RefCell::new(reconciler),
            backlog: RefCell::new(VecDeque::new()),
        }
    }

    /// Applies `batch` and anything queued behind it.
    ///
    /// Returns the combined report of every batch this call applied, or `None` when the batch
    /// was queued for a delivery that is already rendering.
    pub fn deliver(&self, batch: ChangeBatch) -> Option<BatchReport> {
        self.backlog.borrow_mut().push_back(batch);

        let Ok(mut reconciler) = self.reconciler.try_borrow_mut() else {
            tracing::debug!(
                queued = self.backlog.borrow().len(),
                "change batch arrived mid-render; queued"
            );
            return None;
        };

        let mut report = BatchReport::default();
        loop {
            // The backlog borrow must end before rendering, which may queue more batches.
            let next = self.backlog.borrow_mut().pop_front();
            let Some(batch) = next else {
                break;
            };
            report += reconciler.apply_batch(&batch);
        }
        Some(report)
    }

    /// Panics if called from inside a render.
    pub fn reconciler(&self) -> Ref<'_, Reconciler<V>> {
        self.reconciler.borrow()
    }
}
