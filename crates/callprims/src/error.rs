use callprims_host::HostError;
use callprims_schema::SchemaError;

/// Errors surfaced by a typed call.
///
/// The three runtime kinds stay distinguishable: input rejected before any
/// host interaction, failure reported by the host, and a response that
/// does not honor the declared output schema.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The argument was rejected by the input schema. Nothing was sent.
    #[error("input rejected by {call}: {source}")]
    InputValidation { call: String, source: SchemaError },

    /// The host's invoke primitive failed, unmodified.
    #[error("call {call} failed: {source}")]
    Remote { call: String, source: HostError },

    /// The response was rejected by the output schema.
    #[error("output of {call} rejected: {source}")]
    OutputValidation { call: String, source: SchemaError },

    /// The handler could not be registered (e.g. the name is taken).
    #[error("failed to register call: {0}")]
    Registration(#[source] HostError),
}

impl CallError {
    /// The host error, when the failure came from the host.
    pub fn remote(&self) -> Option<&HostError> {
        match self {
            Self::Remote { source, .. } | Self::Registration(source) => Some(source),
            _ => None,
        }
    }
}

/// Errors surfaced by a typed subscription.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The argument was rejected by the input schema. Nothing was subscribed.
    #[error("input rejected by {subscription}: {source}")]
    InputValidation {
        subscription: String,
        source: SchemaError,
    },

    /// A cached document was rejected by the output schema.
    #[error("document {index} of {subscription} rejected: {source}")]
    OutputValidation {
        subscription: String,
        index: usize,
        source: SchemaError,
    },

    /// The publisher could not be registered (e.g. the name is taken).
    #[error("failed to register publication: {0}")]
    Registration(#[source] HostError),

    /// The subscription failed on the host side.
    #[error("subscription {subscription} failed: {source}")]
    Remote {
        subscription: String,
        source: HostError,
    },
}

pub type Result<T, E = CallError> = std::result::Result<T, E>;
