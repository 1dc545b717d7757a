use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::SchemaConfig;
use crate::error::{Result, SchemaError};
use crate::validator::{check_value, compile};

/// Parse a raw value into a typed value, or fail.
///
/// Schemas are shared between the client side of a call and the handler
/// registered on the server side, so they must be `Send + Sync`.
pub trait Schema: Send + Sync {
    /// The typed value produced on success.
    type Output;

    /// Parse `raw`, consuming it.
    fn parse(&self, raw: Value) -> Result<Self::Output>;
}

impl<S: Schema + ?Sized> Schema for Arc<S> {
    type Output = S::Output;

    fn parse(&self, raw: Value) -> Result<Self::Output> {
        (**self).parse(raw)
    }
}

/// The absent schema: hands the raw value through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

impl Schema for Unchecked {
    type Output = Value;

    fn parse(&self, raw: Value) -> Result<Value> {
        Ok(raw)
    }
}

/// Decode through `serde` only. Shape is whatever `T`'s `Deserialize` accepts.
pub struct Typed<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Typed<T> {}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typed")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned> Schema for Typed<T> {
    type Output = T;

    fn parse(&self, raw: Value) -> Result<T> {
        Ok(serde_json::from_value(raw)?)
    }
}

/// A compiled JSON Schema document, optionally decoding into `T` once the
/// document accepts the value.
pub struct JsonSchema<T = Value> {
    validator: Arc<Validator>,
    _marker: PhantomData<fn() -> T>,
}

impl JsonSchema<Value> {
    /// Compile a schema document with default config.
    pub fn compile(schema: &Value) -> Result<Self> {
        Self::compile_with_config(schema, &SchemaConfig::default())
    }

    /// Compile a schema document with explicit config.
    pub fn compile_with_config(schema: &Value, config: &SchemaConfig) -> Result<Self> {
        let validator = compile(schema, config)?;
        Ok(Self::from_validator(Arc::new(validator)))
    }

    /// Compile a schema document given as a JSON string.
    pub fn from_json(schema_json: &str) -> Result<Self> {
        let schema: Value = serde_json::from_str(schema_json)
            .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
        Self::compile(&schema)
    }
}

impl<T> JsonSchema<T> {
    pub(crate) fn from_validator(validator: Arc<Validator>) -> Self {
        Self {
            validator,
            _marker: PhantomData,
        }
    }

    /// Keep the same document but decode accepted values into `U`.
    pub fn decoding<U>(self) -> JsonSchema<U> {
        JsonSchema::from_validator(self.validator)
    }

    /// Check a value without decoding it.
    pub fn check(&self, value: &Value) -> Result<()> {
        check_value(&self.validator, value)
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator.is_valid(value)
    }
}

impl<T> Clone for JsonSchema<T> {
    fn clone(&self) -> Self {
        Self::from_validator(Arc::clone(&self.validator))
    }
}

impl<T> fmt::Debug for JsonSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("decodes", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> Schema for JsonSchema<T> {
    type Output = T;

    fn parse(&self, raw: Value) -> Result<T> {
        self.check(&raw)?;
        Ok(serde_json::from_value(raw)?)
    }
}

/// A schema backed by a plain function.
#[derive(Clone)]
pub struct FnSchema<F>(pub F);

impl<F, T> Schema for FnSchema<F>
where
    F: Fn(Value) -> Result<T> + Send + Sync,
{
    type Output = T;

    fn parse(&self, raw: Value) -> Result<T> {
        (self.0)(raw)
    }
}

impl<F> fmt::Debug for FnSchema<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSchema")
    }
}
