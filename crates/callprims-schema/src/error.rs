/// Errors raised while compiling schemas or parsing values through them.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A schema document could not be loaded.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// A schema document could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// The value violates the schema.
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },

    /// The value has the right shape for the schema but not for the target type.
    #[error("value does not decode into the target type: {0}")]
    Decode(#[from] serde_json::Error),

    /// No schema registered under the given name.
    #[error("no schema registered under {0:?}")]
    NoSchema(String),

    /// A schema is already registered under the given name.
    #[error("schema {0:?} is already registered")]
    Duplicate(String),
}

impl SchemaError {
    /// Build a validation failure from any displayable reason.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
