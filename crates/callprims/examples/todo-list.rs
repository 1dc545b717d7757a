//! Live todo list — a client cache kept in sync by a typed subscription.
//!
//! Run with:
//!   CALLPRIMS_LOG=debug cargo run -p callprims --example todo-list --features logging

use std::sync::Arc;
use std::time::Duration;

use callprims::host::{Collection, Cursor, HostError, LocalHost, Selector};
use callprims::logging::init_logging_from_env;
use callprims::schema::{JsonSchema, SchemaCatalog, Typed};
use callprims::{
    make_typed_call, make_typed_subscription, CallDefinition, SubscriptionDefinition,
    TypedSubscription,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

const CONTRACTS: &[(&str, &str)] = &[
    (
        "todos.item",
        r#"{
            "type": "object",
            "properties": {
                "_id": { "type": "string" },
                "title": { "type": "string", "minLength": 1 },
                "done": { "type": "boolean" }
            },
            "required": ["_id", "title", "done"]
        }"#,
    ),
    (
        "todos.add.input",
        r#"{
            "type": "object",
            "properties": { "title": { "type": "string", "minLength": 1 } },
            "required": ["title"]
        }"#,
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Todo {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    done: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct NewTodo {
    title: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
}

type TodoList = TypedSubscription<Typed<Filter>, JsonSchema<Todo>>;

fn todo_list(
    host: &Arc<LocalHost>,
    contracts: &SchemaCatalog,
) -> Result<TodoList, Box<dyn std::error::Error>> {
    let todos: Arc<dyn Collection> = host.collection("todos");
    let source = Arc::clone(&todos);
    let list = make_typed_subscription(
        SubscriptionDefinition::new(
            "todos.list",
            todos,
            move |filter: Filter| -> Result<Option<Cursor>, HostError> {
                let selector = match filter.done {
                    Some(done) => Selector::field("done", done),
                    None => Selector::all(),
                };
                Ok(Some(Cursor::new(Arc::clone(&source), selector)))
            },
        )
        .input(Typed::<Filter>::new())
        .output(contracts.schema::<Todo>("todos.item")?),
        host,
    )?;
    Ok(list)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env();

    let contracts = SchemaCatalog::from_embedded(CONTRACTS)?;
    let server = Arc::new(LocalHost::server());
    let client = Arc::new(server.connect_client());

    let store = server.collection("todos");
    let add = make_typed_call(
        CallDefinition::new("todos.add", move |new: NewTodo| {
            let id = format!("t{}", store.len() + 1);
            let result = store
                .insert(json!({ "_id": id, "title": new.title, "done": false }))
                .map(|id| json!(id));
            std::future::ready(result)
        })
        .input(contracts.schema::<NewTodo>("todos.add.input")?),
        &server,
    )?;

    todo_list(&server, &contracts)?;
    let list = todo_list(&client, &contracts)?;
    let mut open = list.track(&Filter { done: Some(false) })?;
    eprintln!("before sync: {} open", open.current()?.len());

    add.call(&NewTodo {
        title: "write docs".into(),
    })
    .await?;
    add.call(&NewTodo {
        title: "ship it".into(),
    })
    .await?;

    while let Ok(Some(update)) =
        tokio::time::timeout(Duration::from_millis(200), open.changed()).await
    {
        for todo in update? {
            eprintln!("open: {} {}", todo.id, todo.title);
        }
    }

    Ok(())
}
