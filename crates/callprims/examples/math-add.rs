//! Minimal typed call — server and client roles in one process.
//!
//! Run with:
//!   cargo run -p callprims --example math-add

use std::sync::Arc;

use callprims::host::{HostError, LocalHost};
use callprims::schema::{JsonSchema, Typed};
use callprims::{make_typed_call, CallDefinition, CallError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Pair {
    a: i64,
    b: i64,
}

const PAIR_SCHEMA: &str = r#"{
    "type": "object",
    "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
    "required": ["a", "b"]
}"#;

fn definition() -> Result<
    CallDefinition<
        JsonSchema<Pair>,
        Typed<i64>,
        impl Fn(Pair) -> std::future::Ready<Result<i64, HostError>> + Send + Sync + 'static,
    >,
    Box<dyn std::error::Error>,
> {
    let input = JsonSchema::from_json(PAIR_SCHEMA)?.decoding::<Pair>();
    Ok(CallDefinition::new("math.add", |pair: Pair| {
        std::future::ready(Ok::<i64, HostError>(pair.a + pair.b))
    })
    .input(input)
    .output(Typed::<i64>::new()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(LocalHost::server());
    let client = Arc::new(server.connect_client());

    // Same definition on both sides; only the server registers it.
    make_typed_call(definition()?, &server)?;
    let add = make_typed_call(definition()?, &client)?;

    let sum = add.call(&Pair { a: 5, b: 10 }).await?;
    eprintln!("math.add(5, 10) = {sum}");

    match add.call(&serde_json::json!({ "a": "five", "b": 10 })).await {
        Err(CallError::InputValidation { source, .. }) => {
            eprintln!("rejected before sending: {source}");
        }
        other => eprintln!("unexpected: {other:?}"),
    }

    Ok(())
}
