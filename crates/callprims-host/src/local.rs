use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::collection::{Cursor, MemoryCollection};
use crate::config::{HostConfig, Role};
use crate::error::{HostError, Result};
use crate::registry::Registry;
use crate::subscription::SubscriptionHandle;
use crate::traits::{
    CallRegistry, CallTransport, HostRole, PublicationRegistry, RawHandler, RawPublisher,
    SubscribeTransport,
};

type SubscriptionKey = (String, String);

/// In-process host.
///
/// Registries are shared between a server-role host and every client
/// connected to it with [`LocalHost::connect_client`]; document caches
/// are per host.
pub struct LocalHost {
    config: HostConfig,
    calls: Arc<Registry<RawHandler>>,
    publications: Arc<Registry<RawPublisher>>,
    collections: Arc<CollectionSet>,
    subscriptions: Mutex<HashMap<SubscriptionKey, SubscriptionHandle>>,
    next_subscription_id: AtomicU64,
}

impl LocalHost {
    /// Create a host with fresh registries.
    pub fn new(config: HostConfig) -> Self {
        Self::with_registries(config, Arc::default(), Arc::default())
    }

    /// Create a server-role host with default config.
    pub fn server() -> Self {
        Self::new(HostConfig::server())
    }

    /// Create a client-role host that reaches this host's registries.
    pub fn connect_client(&self) -> Self {
        self.connect_client_with_config(HostConfig::client())
    }

    /// Create a host with explicit config that reaches this host's registries.
    pub fn connect_client_with_config(&self, config: HostConfig) -> Self {
        Self::with_registries(
            config,
            Arc::clone(&self.calls),
            Arc::clone(&self.publications),
        )
    }

    fn with_registries(
        config: HostConfig,
        calls: Arc<Registry<RawHandler>>,
        publications: Arc<Registry<RawPublisher>>,
    ) -> Self {
        Self {
            config,
            calls,
            publications,
            collections: Arc::default(),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// This host's local collection called `name`, created on first use.
    pub fn collection(&self, name: &str) -> Arc<MemoryCollection> {
        self.collections.get_or_create(name)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Registered call names, sorted.
    pub fn call_names(&self) -> Vec<String> {
        self.calls.names()
    }

    /// Registered publication names, sorted.
    pub fn publication_names(&self) -> Vec<String> {
        self.publications.names()
    }

    /// Number of deduplicated subscriptions that have neither failed nor
    /// been stopped.
    pub fn active_subscriptions(&self) -> usize {
        self.lock_subscriptions()
            .values()
            .filter(|handle| !handle.is_terminal())
            .count()
    }

    fn lock_subscriptions(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SubscriptionKey, SubscriptionHandle>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn start_subscription(&self, name: &str, input: Value) -> SubscriptionHandle {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriptionHandle::new(id, name);

        let Some(publisher) = self.publications.get(name) else {
            handle.fail(HostError::PublicationNotFound(name.to_string()));
            return handle;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                handle.fail(HostError::NoRuntime(name.to_string()));
                return handle;
            }
        };

        let task = runtime.spawn(run_publication(
            publisher,
            input,
            Arc::clone(&self.collections),
            handle.clone(),
        ));
        handle.attach(task.abort_handle());
        tracing::debug!(subscription = name, id, "subscription started");
        handle
    }
}

impl HostRole for LocalHost {
    fn role(&self) -> Role {
        self.config.role
    }
}

impl CallRegistry for LocalHost {
    fn register_call(&self, name: &str, handler: RawHandler) -> Result<()> {
        if !self.calls.insert(name, handler) {
            return Err(HostError::DuplicateCall(name.to_string()));
        }
        tracing::debug!(call = name, "call registered");
        Ok(())
    }
}

#[async_trait]
impl CallTransport for LocalHost {
    async fn invoke(&self, name: &str, input: Value) -> Result<Value> {
        let handler = self
            .calls
            .get(name)
            .ok_or_else(|| HostError::CallNotFound(name.to_string()))?;

        tracing::debug!(call = name, role = ?self.config.role, "invoking call");
        handler(input).await
    }
}

impl PublicationRegistry for LocalHost {
    fn register_publication(&self, name: &str, publisher: RawPublisher) -> Result<()> {
        if !self.publications.insert(name, publisher) {
            return Err(HostError::DuplicatePublication(name.to_string()));
        }
        tracing::debug!(publication = name, "publication registered");
        Ok(())
    }
}

impl SubscribeTransport for LocalHost {
    fn subscribe(&self, name: &str, input: Value) -> SubscriptionHandle {
        if !self.config.dedupe_subscriptions {
            return self.start_subscription(name, input);
        }

        let key = (name.to_string(), input.to_string());
        let mut subscriptions = self.lock_subscriptions();
        if let Some(existing) = subscriptions.get(&key) {
            if !existing.is_terminal() {
                return existing.clone();
            }
        }

        // Failed and stopped handles are restarted on demand, never reused.
        subscriptions.retain(|_, handle| !handle.is_terminal());
        let handle = self.start_subscription(name, input);
        subscriptions.insert(key, handle.clone());
        handle
    }
}

#[derive(Default)]
struct CollectionSet {
    collections: Mutex<HashMap<String, Arc<MemoryCollection>>>,
}

impl CollectionSet {
    fn get_or_create(&self, name: &str) -> Arc<MemoryCollection> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCollection::new(name))),
        )
    }
}

async fn run_publication(
    publisher: RawPublisher,
    input: Value,
    collections: Arc<CollectionSet>,
    handle: SubscriptionHandle,
) {
    let cursor = match publisher(input) {
        Ok(Some(cursor)) => cursor,
        Ok(None) => {
            handle.mark_ready();
            return;
        }
        Err(err) => {
            handle.fail(err);
            return;
        }
    };

    let target = collections.get_or_create(cursor.collection_name());
    if cursor.reads_from(&target) {
        // Subscribing to our own collection: the data is already here.
        handle.mark_ready();
        return;
    }
    if let Err(err) = follow_cursor(&cursor, &target, &handle).await {
        handle.fail(err);
    }
}

/// Mirror the cursor into `target` now and after every source change.
/// Returns when the source collection goes away.
async fn follow_cursor(
    cursor: &Cursor,
    target: &MemoryCollection,
    handle: &SubscriptionHandle,
) -> Result<()> {
    let _claims = PublishedClaims {
        target,
        subscription: handle.id(),
    };
    let mut changes = cursor.watch();

    loop {
        drop(changes.borrow_and_update());
        target.sync_published(handle.id(), cursor.fetch())?;
        handle.mark_ready();

        if changes.changed().await.is_err() {
            return Ok(());
        }
    }
}

/// Releases a subscription's publication claims when its task ends,
/// including when the task is aborted by `stop`.
struct PublishedClaims<'a> {
    target: &'a MemoryCollection,
    subscription: u64,
}

impl Drop for PublishedClaims<'_> {
    fn drop(&mut self) {
        self.target.release(self.subscription);
    }
}
