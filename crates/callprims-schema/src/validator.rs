use jsonschema::Validator;
use serde_json::Value;

use crate::config::SchemaConfig;
use crate::error::{Result, SchemaError};
use crate::strict::close_objects;

// First violation plus a few more is enough to locate a contract mismatch.
const EXTRA_VIOLATIONS: usize = 3;

pub(crate) fn compile(schema: &Value, config: &SchemaConfig) -> Result<Validator> {
    let compiled = if config.strict_mode {
        let mut closed = schema.clone();
        close_objects(&mut closed);
        jsonschema::validator_for(&closed)
    } else {
        jsonschema::validator_for(schema)
    };

    compiled.map_err(|err| SchemaError::CompileFailed(err.to_string()))
}

pub(crate) fn check_value(validator: &Validator, value: &Value) -> Result<()> {
    let mut errors = validator.iter_errors(value);
    let Some(first) = errors.next() else {
        return Ok(());
    };

    let mut message = first.to_string();
    for err in errors.take(EXTRA_VIOLATIONS) {
        message.push_str("; ");
        message.push_str(&err.to_string());
    }
    Err(SchemaError::ValidationFailed { message })
}
