use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::{HostError, Result};

/// Lifecycle of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Requested; no data delivered yet.
    Pending,
    /// Initial data delivered; updates keep flowing.
    Ready,
    /// The publisher or the host failed. Terminal.
    Failed(HostError),
    /// Stopped by the subscriber. Terminal.
    Stopped,
}

impl SubscriptionState {
    /// Failed or stopped; no further data will arrive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Stopped)
    }
}

/// Handle to a live subscription. Clones refer to the same subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    name: String,
    state: watch::Sender<SubscriptionState>,
    task: Mutex<Option<AbortHandle>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, name: &str) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Pending);
        Self {
            inner: Arc::new(HandleInner {
                id,
                name: name.to_string(),
                state,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.borrow(), SubscriptionState::Ready)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(*self.inner.state.borrow(), SubscriptionState::Stopped)
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.state.borrow().is_terminal()
    }

    /// Wait until initial data is delivered, or the subscription fails or stops.
    pub async fn ready(&self) -> Result<()> {
        let mut state = self.inner.state.subscribe();
        let settled = state
            .wait_for(|state| *state != SubscriptionState::Pending)
            .await
            .map_err(|_| HostError::Stopped(self.inner.name.clone()))?;

        match &*settled {
            SubscriptionState::Failed(err) => Err(err.clone()),
            SubscriptionState::Stopped => Err(HostError::Stopped(self.inner.name.clone())),
            SubscriptionState::Pending | SubscriptionState::Ready => Ok(()),
        }
    }

    /// Stop delivering updates. Documents already delivered stay in the cache.
    pub fn stop(&self) {
        self.transition(SubscriptionState::Stopped);
        if let Some(task) = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        tracing::debug!(
            subscription = self.inner.name.as_str(),
            id = self.inner.id,
            "subscription stopped"
        );
    }

    pub(crate) fn attach(&self, task: AbortHandle) {
        if self.is_stopped() {
            task.abort();
            return;
        }
        *self.inner.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    pub(crate) fn mark_ready(&self) {
        self.transition(SubscriptionState::Ready);
    }

    pub(crate) fn fail(&self, err: HostError) {
        tracing::warn!(
            subscription = self.inner.name.as_str(),
            id = self.inner.id,
            error = %err,
            "subscription failed"
        );
        self.transition(SubscriptionState::Failed(err));
    }

    // Terminal states are sticky.
    fn transition(&self, next: SubscriptionState) {
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_resolves_after_mark_ready() {
        let handle = SubscriptionHandle::new(1, "todos.all");
        assert_eq!(handle.state(), SubscriptionState::Pending);

        let waiter = handle.clone();
        let wait = tokio::spawn(async move { waiter.ready().await });
        handle.mark_ready();

        assert_eq!(wait.await.unwrap(), Ok(()));
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn ready_reports_failure() {
        let handle = SubscriptionHandle::new(2, "todos.all");
        handle.fail(HostError::PublicationNotFound("todos.all".into()));

        assert_eq!(
            handle.ready().await,
            Err(HostError::PublicationNotFound("todos.all".into()))
        );
    }

    #[test]
    fn terminal_states_are_sticky() {
        let handle = SubscriptionHandle::new(3, "todos.all");
        handle.stop();
        handle.mark_ready();
        handle.fail(HostError::MissingId);

        assert!(handle.is_stopped());
        assert!(handle.is_terminal());
        assert_eq!(handle.state(), SubscriptionState::Stopped);
    }

    #[tokio::test]
    async fn ready_after_stop_is_an_error() {
        let handle = SubscriptionHandle::new(4, "todos.all");
        handle.stop();
        assert_eq!(
            handle.ready().await,
            Err(HostError::Stopped("todos.all".into()))
        );
    }
}
