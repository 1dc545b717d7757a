use std::fmt;
use std::future::Future;
use std::sync::Arc;

use callprims_host::{CallHost, CallTransport, HandlerFuture, HostError, RawHandler};
use callprims_schema::{Schema, SchemaError, Unchecked};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CallError, Result};

/// Declaration of a remote call: name, schemas, and the server-side handler.
///
/// Schemas default to [`Unchecked`]; set them with [`input`](Self::input)
/// and [`output`](Self::output).
pub struct CallDefinition<SI, SO, H> {
    name: String,
    input: SI,
    output: SO,
    handler: H,
}

impl<H> CallDefinition<Unchecked, Unchecked, H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            input: Unchecked,
            output: Unchecked,
            handler,
        }
    }
}

impl<SI, SO, H> CallDefinition<SI, SO, H> {
    /// Validate arguments with `schema`.
    pub fn input<S: Schema>(self, schema: S) -> CallDefinition<S, SO, H> {
        CallDefinition {
            name: self.name,
            input: schema,
            output: self.output,
            handler: self.handler,
        }
    }

    /// Validate responses with `schema`.
    pub fn output<S: Schema>(self, schema: S) -> CallDefinition<SI, S, H> {
        CallDefinition {
            name: self.name,
            input: self.input,
            output: schema,
            handler: self.handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Client side of a typed call: validate, invoke, validate.
pub struct TypedCall<SI, SO> {
    name: Arc<str>,
    input: Arc<SI>,
    output: Arc<SO>,
    transport: Arc<dyn CallTransport>,
}

/// Register `definition` with `host` when it plays the server role, and
/// return the client-side caller.
///
/// The caller's input schema is the only input stage. The registered
/// handler decodes the forwarded value without parsing it again, so it
/// receives exactly the value the caller validated, even when the schema
/// transforms its input.
pub fn make_typed_call<SI, SO, H, Fut, Host>(
    definition: CallDefinition<SI, SO, H>,
    host: &Arc<Host>,
) -> Result<TypedCall<SI, SO>>
where
    SI: Schema + 'static,
    SI::Output: DeserializeOwned + Send + 'static,
    SO: Schema + 'static,
    SO::Output: Serialize + Send + 'static,
    H: Fn(SI::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<SO::Output, HostError>> + Send + 'static,
    Host: CallHost + 'static,
{
    let CallDefinition {
        name,
        input,
        output,
        handler,
    } = definition;
    if host.is_server() {
        let raw = raw_handler::<SI, SO, H, Fut>(handler);
        host.register_call(&name, raw)
            .map_err(CallError::Registration)?;
    }

    let transport: Arc<dyn CallTransport> = host.clone();
    Ok(TypedCall {
        name: name.into(),
        input: Arc::new(input),
        output: Arc::new(output),
        transport,
    })
}

fn raw_handler<SI, SO, H, Fut>(handler: H) -> RawHandler
where
    SI: Schema + 'static,
    SI::Output: DeserializeOwned + Send + 'static,
    SO: Schema + 'static,
    SO::Output: Serialize + Send + 'static,
    H: Fn(SI::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<SO::Output, HostError>> + Send + 'static,
{
    Arc::new(move |raw: Value| -> HandlerFuture {
        let invocation = serde_json::from_value::<SI::Output>(raw)
            .map(&handler)
            .map_err(|err| HostError::handler("decode-error", err.to_string()));

        Box::pin(async move {
            let output = invocation?.await?;
            serde_json::to_value(output)
                .map_err(|err| HostError::handler("serialization-error", err.to_string()))
        })
    })
}

impl<SI, SO> TypedCall<SI, SO>
where
    SI: Schema,
    SI::Output: Serialize,
    SO: Schema,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the input stage alone, without touching the host.
    pub fn validate_input<R: Serialize + ?Sized>(&self, raw_input: &R) -> Result<Value> {
        let raw = serde_json::to_value(raw_input).map_err(|err| self.input_error(err.into()))?;
        let validated = self.input.parse(raw).map_err(|err| self.input_error(err))?;
        serde_json::to_value(validated).map_err(|err| self.input_error(err.into()))
    }

    /// Validate `raw_input`, invoke the call once, and validate the response.
    pub async fn call<R: Serialize + ?Sized>(&self, raw_input: &R) -> Result<SO::Output> {
        let validated = self.validate_input(raw_input)?;

        let response = self
            .transport
            .invoke(&self.name, validated)
            .await
            .map_err(|source| CallError::Remote {
                call: self.name.to_string(),
                source,
            })?;

        self.output.parse(response).map_err(|source| {
            tracing::warn!(call = &*self.name, error = %source, "response failed output schema");
            CallError::OutputValidation {
                call: self.name.to_string(),
                source,
            }
        })
    }

    fn input_error(&self, source: SchemaError) -> CallError {
        tracing::debug!(call = &*self.name, error = %source, "input rejected");
        CallError::InputValidation {
            call: self.name.to_string(),
            source,
        }
    }
}

impl<SI, SO> Clone for TypedCall<SI, SO> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            input: Arc::clone(&self.input),
            output: Arc::clone(&self.output),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<SI, SO> fmt::Debug for TypedCall<SI, SO> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCall")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
