//! Host collaborators for callprims.
//!
//! The typed factories never talk to a network or a data store directly.
//! They go through the traits in [`traits`]: a role query, a call registry
//! and invoke primitive, a publication registry and subscribe primitive,
//! and a document [`Collection`] with a change subject.
//!
//! [`LocalHost`] implements all of them in-process. A server-role host owns
//! the registries; [`LocalHost::connect_client`] gives a client-role host
//! that shares those registries but keeps its own document cache, so both
//! sides of a deployment can run in one process without a real transport.

pub mod collection;
pub mod config;
pub mod error;
pub mod local;
pub mod registry;
pub mod subscription;
pub mod traits;

pub use collection::{Cursor, MemoryCollection, Selector};
pub use config::{HostConfig, Role};
pub use error::{HostError, Result};
pub use local::LocalHost;
pub use registry::Registry;
pub use subscription::{SubscriptionHandle, SubscriptionState};
pub use traits::{
    CallHost, CallRegistry, CallTransport, Collection, HandlerFuture, HostRole,
    PublicationRegistry, RawHandler, RawPublisher, SubscribeTransport, SubscriptionHost,
};
