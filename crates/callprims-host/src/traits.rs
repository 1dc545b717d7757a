use std::sync::Arc;

use async_trait::async_trait;
use futures_core::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;

use crate::collection::{Cursor, Selector};
use crate::config::Role;
use crate::error::Result;
use crate::subscription::SubscriptionHandle;

/// Future returned by a raw call handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Untyped call handler as stored in a call registry.
pub type RawHandler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Untyped publisher as stored in a publication registry.
///
/// Returns a live cursor whose documents are published to subscribers,
/// or `None` when there is nothing to publish.
pub type RawPublisher = Arc<dyn Fn(Value) -> Result<Option<Cursor>> + Send + Sync>;

/// "Is this process the authoritative server?"
pub trait HostRole {
    fn role(&self) -> Role;

    fn is_server(&self) -> bool {
        self.role().is_server()
    }
}

/// Host-side mapping from call name to handler.
pub trait CallRegistry: Send + Sync {
    /// Register a handler. Registering a taken name is an error.
    fn register_call(&self, name: &str, handler: RawHandler) -> Result<()>;
}

/// Asynchronous remote-invocation primitive.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Invoke the handler registered under `name` and wait for its response.
    async fn invoke(&self, name: &str, input: Value) -> Result<Value>;
}

/// Host-side mapping from publication name to publisher.
pub trait PublicationRegistry: Send + Sync {
    /// Register a publisher. Registering a taken name is an error.
    fn register_publication(&self, name: &str, publisher: RawPublisher) -> Result<()>;
}

/// Fire-and-continue subscribe primitive.
pub trait SubscribeTransport: Send + Sync {
    /// Establish (or refresh) a live subscription. Never blocks on data arrival.
    fn subscribe(&self, name: &str, input: Value) -> SubscriptionHandle;
}

/// Local cache of documents kept in sync with a remote source.
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Snapshot of the documents currently matching `selector`.
    fn find(&self, selector: &Selector) -> Vec<Value>;

    /// Change subject: the version ticks on every mutation.
    fn watch(&self) -> watch::Receiver<u64>;
}

/// Everything the typed call factory needs from a host.
pub trait CallHost: HostRole + CallRegistry + CallTransport {}

impl<T: HostRole + CallRegistry + CallTransport + ?Sized> CallHost for T {}

/// Everything the typed subscription factory needs from a host.
pub trait SubscriptionHost: HostRole + PublicationRegistry + SubscribeTransport {}

impl<T: HostRole + PublicationRegistry + SubscribeTransport + ?Sized> SubscriptionHost for T {}
