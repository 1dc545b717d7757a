//! Schema capability for typed call boundaries.
//!
//! A [`Schema`] turns a raw JSON value into a typed value, or rejects it.
//! Everything that crosses the client/server boundary in callprims passes
//! through one of these on the way in and on the way out.
//!
//! Validators range from [`Unchecked`] (identity, never fails) through
//! [`Typed`] (serde decode) to [`JsonSchema`] (JSON Schema 2020-12 check,
//! then decode). [`SchemaCatalog`] keeps named JSON Schema documents so
//! contracts can live next to the deployment rather than in code.

pub mod catalog;
pub mod config;
pub mod error;
pub mod schema;

mod strict;
mod validator;

pub use catalog::SchemaCatalog;
pub use config::SchemaConfig;
pub use error::{Result, SchemaError};
pub use schema::{FnSchema, JsonSchema, Schema, Typed, Unchecked};
