//! Mock subschema implementation

use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_compiler::executable::Field;
use apollo_compiler::validation::WithErrors;
use async_trait::async_trait;
use futures::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::BoxError;
use crate::executor::ExecutionParams;
use crate::executor::Executor;
use crate::executor::Subscriber;
use crate::executor::SubscriptionResult;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::value_from_ast;
use crate::selection::SourceKeys;
use crate::selection::collect_fields;
use crate::selection::merged_sub_selection;
use crate::selection::project;
use crate::subschema::SchemaRef;
use crate::subschema::SubschemaConfig;

type RootResolver = Arc<dyn Fn(&Object) -> Result<Value, String> + Send + Sync>;

/// An in-memory subschema.
///
/// Root fields resolve through closures over their coerced arguments. The
/// returned fixtures are keyed by field name and projected onto the request's
/// selection, so aliases and `__typename` behave as a real server's would.
/// Every request received is recorded.
#[derive(Clone)]
pub struct MockSubschema {
    schema: SchemaRef,
    resolvers: IndexMap<String, RootResolver>,
    // using an arc so that clones handed to a subschema config share the records
    calls: Arc<Mutex<Vec<ExecutionParams>>>,
    failure: Option<String>,
}

impl MockSubschema {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            resolvers: IndexMap::new(),
            calls: Default::default(),
            failure: None,
        }
    }

    pub fn parse(sdl: &str) -> Result<Self, WithErrors<Schema>> {
        Ok(Self::new(Arc::new(Schema::parse_and_validate(
            sdl,
            "mock_subschema.graphql",
        )?)))
    }

    /// Resolves the root field `name` with `resolve`.
    pub fn with_root_field<F>(mut self, name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&Object) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.resolvers.insert(name.into(), Arc::new(resolve));
        self
    }

    /// Resolves the root field `name` to `value` whatever its arguments.
    pub fn with_root_value(self, name: impl Into<String>, value: Value) -> Self {
        self.with_root_field(name, move |_| Ok(value.clone()))
    }

    /// Fails every request as a transport error would.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// A subschema configuration executing against this mock.
    pub fn config(&self, name: impl Into<String>) -> SubschemaConfig {
        SubschemaConfig::new(name, self.schema.clone())
            .with_executor(self.clone())
            .with_subscriber(self.clone())
    }

    pub fn calls(&self) -> Vec<ExecutionParams> {
        self.calls.lock().clone()
    }

    /// The queries received so far, serialized.
    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().iter().map(|params| params.query()).collect()
    }

    fn record(&self, params: &ExecutionParams) -> Result<(), BoxError> {
        self.calls.lock().push(params.clone());
        match &self.failure {
            Some(reason) => Err(reason.clone().into()),
            None => Ok(()),
        }
    }

    /// Resolves every root field of the operation, each to its raw fixture.
    fn resolve_root(
        &self,
        params: &ExecutionParams,
    ) -> Result<Vec<(String, Option<Field>, Result<Value, String>)>, BoxError> {
        let operation = params
            .document
            .operations
            .get(params.operation_name.as_deref())
            .map_err(|err| err.message().to_string())?;
        let root_type = operation.selection_set.ty.clone();
        let fields = collect_fields(
            &self.schema,
            &operation.selection_set,
            &params.document.fragments,
            root_type.as_str(),
        );

        let mut resolved = Vec::with_capacity(fields.len());
        for (response_key, nodes) in fields {
            let Some(first) = nodes.first() else {
                continue;
            };
            if first.name.as_str() == "__typename" {
                resolved.push((
                    response_key.to_string(),
                    None,
                    Ok(Value::String(root_type.as_str().into())),
                ));
                continue;
            }
            let value = match self.resolvers.get(first.name.as_str()) {
                Some(resolve) => resolve(&arguments(first, &params.variables)),
                None => Err(format!("no mock for root field '{}'", first.name)),
            };
            let mut field = (**first).clone();
            field.selection_set = merged_sub_selection(&first.selection_set.ty, &nodes);
            resolved.push((response_key.to_string(), Some(field), value));
        }
        Ok(resolved)
    }

    fn response(
        &self,
        params: &ExecutionParams,
        resolved: Vec<(String, Option<Field>, Result<Value, String>)>,
    ) -> Response {
        let mut data = Object::new();
        let mut errors = Vec::new();
        for (response_key, field, value) in resolved {
            let value = match (value, field) {
                (Ok(value), Some(field)) => project(
                    &self.schema,
                    &value,
                    &field.selection_set,
                    &params.document.fragments,
                    SourceKeys::FieldName,
                ),
                (Ok(value), None) => value,
                (Err(message), _) => {
                    errors.push(
                        Error::builder()
                            .message(message)
                            .path(Path::empty().key(response_key.as_str()))
                            .build(),
                    );
                    Value::Null
                }
            };
            data.insert(response_key, value);
        }
        Response::builder()
            .data(Value::Object(data))
            .errors(errors)
            .build()
    }
}

/// Argument values of `field`, with variables substituted and defaults applied.
fn arguments(field: &Field, variables: &Object) -> Object {
    let mut arguments = Object::new();
    for definition in &field.definition.arguments {
        let value = field
            .arguments
            .iter()
            .find(|argument| argument.name == definition.name)
            .map(|argument| value_from_ast(&argument.value, variables))
            .or_else(|| {
                definition
                    .default_value
                    .as_ref()
                    .map(|default| value_from_ast(default, variables))
            });
        if let Some(value) = value {
            arguments.insert(definition.name.as_str(), value);
        }
    }
    arguments
}

#[async_trait]
impl Executor for MockSubschema {
    async fn execute(&self, params: ExecutionParams) -> Result<Response, BoxError> {
        self.record(&params)?;
        let resolved = self.resolve_root(&params)?;
        Ok(self.response(&params, resolved))
    }
}

/// A subscription field's fixture is the list of its events.
#[async_trait]
impl Subscriber for MockSubschema {
    async fn subscribe(&self, params: ExecutionParams) -> Result<SubscriptionResult, BoxError> {
        self.record(&params)?;
        let mut resolved = self.resolve_root(&params)?;
        let Some((response_key, field, events)) = resolved.pop() else {
            return Ok(SubscriptionResult::Single(Response::default()));
        };
        let events = match events {
            Ok(Value::Array(events)) => events,
            other => {
                let response = self.response(&params, vec![(response_key, field, other)]);
                return Ok(SubscriptionResult::Single(response));
            }
        };

        let mock = self.clone();
        let responses = events
            .into_iter()
            .map(move |event| {
                mock.response(
                    &params,
                    vec![(response_key.clone(), field.clone(), Ok(event))],
                )
            })
            .collect::<Vec<_>>();
        Ok(SubscriptionResult::Stream(
            futures::stream::iter(responses).boxed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::ExecutableDocument;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    fn mock() -> MockSubschema {
        MockSubschema::parse(
            "type Query { user(id: ID!): User } type User { id: ID! name: String }",
        )
        .unwrap()
        .with_root_field("user", |args| {
            Ok(json!({"id": args.get("id").cloned().unwrap_or_default(), "name": "Ada"}))
        })
    }

    fn params(mock: &MockSubschema, query: &str, variables: Value) -> ExecutionParams {
        let document =
            ExecutableDocument::parse_and_validate(mock.schema(), query, "query.graphql").unwrap();
        ExecutionParams::builder()
            .document(Arc::new(document))
            .variables(variables.as_object().cloned().unwrap_or_default())
            .build()
    }

    #[tokio::test]
    async fn projects_fixtures_onto_the_selection() {
        let mock = mock();
        let response = mock
            .execute(params(
                &mock,
                "query($id: ID!) { person: user(id: $id) { name __typename } }",
                json!({"id": "1"}),
            ))
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(json!({"person": {"name": "Ada", "__typename": "User"}}))
        );
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn failing_mocks_report_transport_errors() {
        let mock = mock().failing("connection refused");
        let err = mock
            .execute(params(&mock, "{ user(id: 1) { id } }", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(mock.queries().len(), 1);
    }
}
