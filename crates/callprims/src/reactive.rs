use callprims_schema::Schema;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::SubscriptionError;
use crate::subscription::TypedSubscription;

/// Reactive binding over a typed subscription.
///
/// Holds one input and re-runs the subscription's fetch every time the
/// bound collection changes. Each run validates afresh, so repeated runs
/// over unchanged data produce identical results.
pub struct Tracker<SI, SO> {
    subscription: TypedSubscription<SI, SO>,
    input: Value,
    changes: watch::Receiver<u64>,
}

impl<SI, SO> Tracker<SI, SO>
where
    SI: Schema,
    SI::Output: Serialize,
    SO: Schema,
{
    pub(crate) fn new(
        subscription: TypedSubscription<SI, SO>,
        input: Value,
        changes: watch::Receiver<u64>,
    ) -> Self {
        Self {
            subscription,
            input,
            changes,
        }
    }

    /// Fetch now and mark the current collection version as seen.
    pub fn current(&mut self) -> Result<Vec<SO::Output>, SubscriptionError> {
        drop(self.changes.borrow_and_update());
        self.subscription.fetch(&self.input)
    }

    /// Wait for the next collection change, then fetch.
    ///
    /// Returns `None` once the collection is gone and no further changes
    /// can arrive.
    pub async fn changed(&mut self) -> Option<Result<Vec<SO::Output>, SubscriptionError>> {
        self.changes.changed().await.ok()?;
        Some(self.current())
    }

    pub fn subscription(&self) -> &TypedSubscription<SI, SO> {
        &self.subscription
    }
}
