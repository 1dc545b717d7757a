//! Schema-validated remote calls and subscriptions.
//!
//! callprims binds a runtime [`Schema`] to an untyped host messaging layer.
//! Two factories do all the work:
//!
//! - [`make_typed_call`] registers a handler (server role only) and returns a
//!   [`TypedCall`] that validates its argument, invokes the host once, and
//!   validates the response.
//! - [`make_typed_subscription`] registers a publisher (server role only) and
//!   returns a [`TypedSubscription`] that validates its argument, subscribes,
//!   and maps the current cache contents through the output schema.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use callprims::host::{HostError, LocalHost};
//! use callprims::schema::Typed;
//! use callprims::{make_typed_call, CallDefinition};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pair {
//!     a: i64,
//!     b: i64,
//! }
//!
//! # async fn run() -> Result<(), callprims::CallError> {
//! let host = Arc::new(LocalHost::server());
//! let add = make_typed_call(
//!     CallDefinition::new("math.add", |pair: Pair| async move {
//!         Ok::<_, HostError>(pair.a + pair.b)
//!     })
//!     .input(Typed::<Pair>::new())
//!     .output(Typed::<i64>::new()),
//!     &host,
//! )?;
//!
//! assert_eq!(add.call(&Pair { a: 5, b: 10 }).await?, 15);
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod error;
pub mod reactive;
pub mod subscription;

#[cfg(feature = "logging")]
pub mod logging;

pub use call::{make_typed_call, CallDefinition, TypedCall};
pub use error::{CallError, Result, SubscriptionError};
pub use reactive::Tracker;
pub use subscription::{make_typed_subscription, SubscriptionDefinition, TypedSubscription};

pub use callprims_schema::Schema;

/// Re-export schema types.
pub mod schema {
    pub use callprims_schema::*;
}

/// Re-export host types.
pub mod host {
    pub use callprims_host::*;
}
