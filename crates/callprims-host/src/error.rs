/// Errors surfaced by the host: registration conflicts and remote failures.
///
/// Remote failures reach callers unmodified, so every variant is `Clone`
/// and carries only owned strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// A call handler is already registered under this name.
    #[error("call {0:?} is already registered")]
    DuplicateCall(String),

    /// A publisher is already registered under this name.
    #[error("publication {0:?} is already registered")]
    DuplicatePublication(String),

    /// No call handler is registered under this name.
    #[error("call {0:?} not found")]
    CallNotFound(String),

    /// No publisher is registered under this name.
    #[error("publication {0:?} not found")]
    PublicationNotFound(String),

    /// A handler or publisher failed.
    #[error("handler failed [{code}]: {reason}")]
    Handler { code: String, reason: String },

    /// A document has no string `_id`.
    #[error("document has no string _id")]
    MissingId,

    /// A document with this `_id` already exists.
    #[error("document {0:?} already exists")]
    DuplicateId(String),

    /// Subscriptions need a running tokio runtime to deliver data.
    #[error("no async runtime available for subscription {0:?}")]
    NoRuntime(String),

    /// The subscription was stopped before it became ready.
    #[error("subscription {0:?} stopped")]
    Stopped(String),
}

impl HostError {
    /// Build a handler failure, the error a handler or publisher reports to its caller.
    pub fn handler(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
