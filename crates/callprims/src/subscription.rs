use std::fmt;
use std::sync::Arc;

use callprims_host::{
    Collection, Cursor, HostError, RawPublisher, Selector, SubscribeTransport, SubscriptionHandle,
    SubscriptionHost,
};
use callprims_schema::{Schema, SchemaError, Unchecked};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SubscriptionError};
use crate::reactive::Tracker;

/// Declaration of a publication: name, schemas, the collection its
/// documents land in, and the server-side publisher.
pub struct SubscriptionDefinition<SI, SO, P> {
    name: String,
    input: SI,
    output: SO,
    collection: Arc<dyn Collection>,
    selector: Selector,
    publisher: P,
}

impl<P> SubscriptionDefinition<Unchecked, Unchecked, P> {
    pub fn new(name: impl Into<String>, collection: Arc<dyn Collection>, publisher: P) -> Self {
        Self {
            name: name.into(),
            input: Unchecked,
            output: Unchecked,
            collection,
            selector: Selector::all(),
            publisher,
        }
    }
}

impl<SI, SO, P> SubscriptionDefinition<SI, SO, P> {
    /// Validate arguments with `schema`.
    pub fn input<S: Schema>(self, schema: S) -> SubscriptionDefinition<S, SO, P> {
        SubscriptionDefinition {
            name: self.name,
            input: schema,
            output: self.output,
            collection: self.collection,
            selector: self.selector,
            publisher: self.publisher,
        }
    }

    /// Validate every cached document with `schema`.
    pub fn output<S: Schema>(self, schema: S) -> SubscriptionDefinition<SI, S, P> {
        SubscriptionDefinition {
            name: self.name,
            input: self.input,
            output: schema,
            collection: self.collection,
            selector: self.selector,
            publisher: self.publisher,
        }
    }

    /// Restrict which cached documents are read back. Defaults to all.
    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Client side of a typed subscription: validate, subscribe, read, validate.
pub struct TypedSubscription<SI, SO> {
    name: Arc<str>,
    input: Arc<SI>,
    output: Arc<SO>,
    collection: Arc<dyn Collection>,
    selector: Selector,
    transport: Arc<dyn SubscribeTransport>,
}

/// Register `definition`'s publisher with `host` when it plays the server
/// role, and return the client-side reader.
///
/// As with calls, the input schema runs on the subscriber side only; the
/// publisher decodes the forwarded value as is.
pub fn make_typed_subscription<SI, SO, P, Host>(
    definition: SubscriptionDefinition<SI, SO, P>,
    host: &Arc<Host>,
) -> Result<TypedSubscription<SI, SO>, SubscriptionError>
where
    SI: Schema + 'static,
    SI::Output: DeserializeOwned,
    SO: Schema + 'static,
    P: Fn(SI::Output) -> std::result::Result<Option<Cursor>, HostError> + Send + Sync + 'static,
    Host: SubscriptionHost + 'static,
{
    let SubscriptionDefinition {
        name,
        input,
        output,
        collection,
        selector,
        publisher,
    } = definition;
    if host.is_server() {
        let raw = raw_publisher::<SI, P>(publisher);
        host.register_publication(&name, raw)
            .map_err(SubscriptionError::Registration)?;
    }

    let transport: Arc<dyn SubscribeTransport> = host.clone();
    Ok(TypedSubscription {
        name: name.into(),
        input: Arc::new(input),
        output: Arc::new(output),
        collection,
        selector,
        transport,
    })
}

fn raw_publisher<SI, P>(publisher: P) -> RawPublisher
where
    SI: Schema + 'static,
    SI::Output: DeserializeOwned,
    P: Fn(SI::Output) -> std::result::Result<Option<Cursor>, HostError> + Send + Sync + 'static,
{
    Arc::new(move |raw: Value| -> callprims_host::Result<Option<Cursor>> {
        let validated = serde_json::from_value::<SI::Output>(raw)
            .map_err(|err| HostError::handler("decode-error", err.to_string()))?;
        publisher(validated)
    })
}

impl<SI, SO> TypedSubscription<SI, SO>
where
    SI: Schema,
    SI::Output: Serialize,
    SO: Schema,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the input stage alone, without touching the host.
    pub fn validate_input<R: Serialize + ?Sized>(
        &self,
        raw_input: &R,
    ) -> Result<Value, SubscriptionError> {
        let raw = serde_json::to_value(raw_input).map_err(|err| self.input_error(err.into()))?;
        let validated = self.input.parse(raw).map_err(|err| self.input_error(err))?;
        serde_json::to_value(validated).map_err(|err| self.input_error(err.into()))
    }

    /// Validate `raw_input` and establish (or refresh) the subscription.
    /// Returns immediately; data arrives in the collection later.
    pub fn subscribe<R: Serialize + ?Sized>(
        &self,
        raw_input: &R,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let validated = self.validate_input(raw_input)?;
        Ok(self.transport.subscribe(&self.name, validated))
    }

    /// Subscribe, then read whatever the collection holds right now.
    ///
    /// The snapshot may be stale or incomplete until the subscription is
    /// ready. A document that fails the output schema fails the whole read.
    pub fn fetch<R: Serialize + ?Sized>(
        &self,
        raw_input: &R,
    ) -> Result<Vec<SO::Output>, SubscriptionError> {
        self.subscribe(raw_input)?;
        self.read()
    }

    /// Subscribe, wait for the initial data, then read.
    pub async fn fetch_ready<R: Serialize + ?Sized>(
        &self,
        raw_input: &R,
    ) -> Result<Vec<SO::Output>, SubscriptionError> {
        let handle = self.subscribe(raw_input)?;
        handle
            .ready()
            .await
            .map_err(|source| SubscriptionError::Remote {
                subscription: self.name.to_string(),
                source,
            })?;
        self.read()
    }

    /// Re-run [`fetch`](Self::fetch) with the same input every time the
    /// collection changes.
    pub fn track<R: Serialize + ?Sized>(
        &self,
        raw_input: &R,
    ) -> Result<Tracker<SI, SO>, SubscriptionError> {
        let raw = serde_json::to_value(raw_input).map_err(|err| self.input_error(err.into()))?;
        Ok(Tracker::new(self.clone(), raw, self.collection.watch()))
    }

    pub(crate) fn read(&self) -> Result<Vec<SO::Output>, SubscriptionError> {
        self.collection
            .find(&self.selector)
            .into_iter()
            .enumerate()
            .map(|(index, document)| {
                self.output.parse(document).map_err(|source| {
                    tracing::warn!(
                        subscription = &*self.name,
                        index,
                        error = %source,
                        "cached document failed output schema"
                    );
                    SubscriptionError::OutputValidation {
                        subscription: self.name.to_string(),
                        index,
                        source,
                    }
                })
            })
            .collect()
    }

    fn input_error(&self, source: SchemaError) -> SubscriptionError {
        tracing::debug!(subscription = &*self.name, error = %source, "input rejected");
        SubscriptionError::InputValidation {
            subscription: self.name.to_string(),
            source,
        }
    }
}

impl<SI, SO> Clone for TypedSubscription<SI, SO> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            input: Arc::clone(&self.input),
            output: Arc::clone(&self.output),
            collection: Arc::clone(&self.collection),
            selector: self.selector.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<SI, SO> fmt::Debug for TypedSubscription<SI, SO> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSubscription")
            .field("name", &self.name)
            .field("collection", &self.collection.name())
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use callprims_host::{LocalHost, MemoryCollection};
    use callprims_schema::{JsonSchema, Typed};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Todo {
        #[serde(rename = "_id")]
        id: String,
        done: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Filter {
        done: Option<bool>,
    }

    fn todo_schema() -> JsonSchema<Todo> {
        JsonSchema::from_json(
            r#"{
                "type": "object",
                "properties": { "_id": { "type": "string" }, "done": { "type": "boolean" } },
                "required": ["_id", "done"]
            }"#,
        )
        .unwrap()
        .decoding()
    }

    fn todos_definition(
        host: &LocalHost,
    ) -> SubscriptionDefinition<
        Typed<Filter>,
        JsonSchema<Todo>,
        impl Fn(Filter) -> std::result::Result<Option<Cursor>, HostError> + Send + Sync + 'static,
    > {
        let source: Arc<dyn Collection> = host.collection("todos");
        let cache: Arc<dyn Collection> = host.collection("todos");
        SubscriptionDefinition::new(
            "todos.list",
            cache,
            move |filter: Filter| -> std::result::Result<Option<Cursor>, HostError> {
                let selector = match filter.done {
                    Some(done) => Selector::field("done", done),
                    None => Selector::all(),
                };
                Ok(Some(Cursor::new(Arc::clone(&source), selector)))
            },
        )
        .input(Typed::<Filter>::new())
        .output(todo_schema())
    }

    #[test]
    fn fetch_maps_current_documents() {
        let host = Arc::new(LocalHost::server());
        host.collection("todos")
            .insert(json!({"_id": "1", "done": false}))
            .unwrap();

        let todos = make_typed_subscription(todos_definition(&host), &host).unwrap();
        let fetched = todos.fetch(&json!({})).unwrap();
        assert_eq!(
            fetched,
            vec![Todo {
                id: "1".into(),
                done: false
            }]
        );
    }

    #[test]
    fn invalid_document_fails_the_whole_fetch() {
        let host = Arc::new(LocalHost::server());
        let cache = host.collection("todos");
        cache.insert(json!({"_id": "1", "done": false})).unwrap();
        cache.insert(json!({"_id": "2", "done": "maybe"})).unwrap();

        let todos = make_typed_subscription(todos_definition(&host), &host).unwrap();
        let err = todos.fetch(&json!({})).unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::OutputValidation { index: 1, .. }
        ));
    }

    #[test]
    fn input_failure_never_subscribes() {
        let host = Arc::new(LocalHost::server());
        let todos = make_typed_subscription(todos_definition(&host), &host).unwrap();

        let err = todos.fetch(&json!({"done": "yes"})).unwrap_err();
        assert!(matches!(err, SubscriptionError::InputValidation { .. }));
        assert_eq!(host.active_subscriptions(), 0);
    }

    #[test]
    fn duplicate_publication_is_a_registration_error() {
        let host = Arc::new(LocalHost::server());
        make_typed_subscription(todos_definition(&host), &host).unwrap();

        let err = make_typed_subscription(todos_definition(&host), &host).unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::Registration(HostError::DuplicatePublication(_))
        ));
    }

    #[test]
    fn omitted_schemas_pass_documents_through() {
        let host = Arc::new(LocalHost::server());
        let cache: Arc<MemoryCollection> = host.collection("notes");
        cache.insert(json!({"_id": "n1", "text": 42})).unwrap();

        let notes = make_typed_subscription(
            SubscriptionDefinition::new(
                "notes.all",
                cache,
                |_: Value| -> std::result::Result<Option<Cursor>, HostError> { Ok(None) },
            ),
            &host,
        )
        .unwrap();

        assert_eq!(
            notes.fetch(&json!(["anything"])).unwrap(),
            vec![json!({"_id": "n1", "text": 42})]
        );
    }

    #[tokio::test]
    async fn client_fetch_is_stale_until_ready() {
        let server = Arc::new(LocalHost::server());
        server
            .collection("todos")
            .insert(json!({"_id": "1", "done": true}))
            .unwrap();
        make_typed_subscription(todos_definition(&server), &server).unwrap();

        let client = Arc::new(server.connect_client());
        let todos = make_typed_subscription(todos_definition(&client), &client).unwrap();

        assert!(todos.fetch(&json!({"done": true})).unwrap().is_empty());
        let ready = todos.fetch_ready(&json!({"done": true})).await.unwrap();
        assert_eq!(
            ready,
            vec![Todo {
                id: "1".into(),
                done: true
            }]
        );
    }

    #[tokio::test]
    async fn unknown_publication_surfaces_on_fetch_ready() {
        let server = Arc::new(LocalHost::server());
        let client = Arc::new(server.connect_client());
        let todos = make_typed_subscription(todos_definition(&client), &client).unwrap();

        let err = todos.fetch_ready(&json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::Remote {
                source: HostError::PublicationNotFound(_),
                ..
            }
        ));
    }

    #[test]
    fn selector_limits_what_is_read_back() {
        let host = Arc::new(LocalHost::server());
        let cache = host.collection("todos");
        cache.insert(json!({"_id": "1", "done": false})).unwrap();
        cache.insert(json!({"_id": "2", "done": true})).unwrap();

        let open = make_typed_subscription(
            todos_definition(&host).selector(Selector::field("done", false)),
            &host,
        )
        .unwrap();
        assert_eq!(open.fetch(&json!({})).unwrap().len(), 1);
    }
}
