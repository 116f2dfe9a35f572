//! The narrow interfaces through which delegated requests reach a subschema.
//!
//! An [`Executor`] runs a single request and returns a single [`Response`]; a
//! [`Subscriber`] starts a subscription that may yield a stream of responses.
//! User-data errors belong in [`Response::errors`]. An `Err` means the request
//! could not be carried out at all, such as a transport failure.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::validation::Valid;
use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::BoxError;
use crate::graphql::Response;
use crate::graphql::ResponseStream;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::resolve_info::ResolveInfo;

/// The input handed to an executor or subscriber.
#[derive(Clone)]
#[non_exhaustive]
pub struct ExecutionParams {
    /// The request document, rewritten into the subschema's own shape.
    pub document: Arc<Valid<ExecutableDocument>>,

    /// Name of the operation to run, if the document carries a named one.
    pub operation_name: Option<String>,

    /// Variable values for the operation.
    pub variables: Object,

    /// The ambient context of the request to the composed schema.
    pub context: Context,

    /// Resolver info of the composed-schema field that triggered this request.
    pub info: Option<Arc<ResolveInfo>>,

    /// The root value of the call, the subschema's own unless overridden.
    pub root_value: Option<Value>,

    /// Request extensions.
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl ExecutionParams {
    #[builder(visibility = "pub")]
    fn new(
        document: Arc<Valid<ExecutableDocument>>,
        operation_name: Option<String>,
        variables: Option<Object>,
        context: Option<Context>,
        info: Option<Arc<ResolveInfo>>,
        root_value: Option<Value>,
        extensions: Option<Object>,
    ) -> Self {
        Self {
            document,
            operation_name,
            variables: variables.unwrap_or_default(),
            context: context.unwrap_or_default(),
            info,
            root_value,
            extensions: extensions.unwrap_or_default(),
        }
    }

    /// The document serialized as a GraphQL string, as it would be sent over the wire.
    pub fn query(&self) -> String {
        self.document.serialize().no_indent().to_string()
    }
}

impl fmt::Debug for ExecutionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionParams")
            .field("query", &self.query())
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .finish()
    }
}

/// Runs requests against one subschema, locally or remotely.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, params: ExecutionParams) -> Result<Response, BoxError>;
}

/// The outcome of starting a subscription.
pub enum SubscriptionResult {
    /// The subscriber answered with a single response, usually an error.
    Single(Response),
    /// A long-lived stream of responses.
    Stream(ResponseStream),
}

impl fmt::Debug for SubscriptionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionResult::Single(response) => {
                f.debug_tuple("Single").field(response).finish()
            }
            SubscriptionResult::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// Starts subscriptions against one subschema.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, params: ExecutionParams) -> Result<SubscriptionResult, BoxError>;
}

/// An [`Executor`] backed by a synchronous function.
pub struct SyncExecutor<F> {
    execute: F,
}

impl<F> SyncExecutor<F>
where
    F: Fn(ExecutionParams) -> Result<Response, BoxError> + Send + Sync,
{
    pub fn new(execute: F) -> Self {
        Self { execute }
    }
}

#[async_trait]
impl<F> Executor for SyncExecutor<F>
where
    F: Fn(ExecutionParams) -> Result<Response, BoxError> + Send + Sync,
{
    async fn execute(&self, params: ExecutionParams) -> Result<Response, BoxError> {
        (self.execute)(params)
    }
}

/// An [`Executor`] backed by a function returning a future.
pub struct AsyncExecutor<F> {
    execute: F,
}

impl<F, Fut> AsyncExecutor<F>
where
    F: Fn(ExecutionParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, BoxError>> + Send + 'static,
{
    pub fn new(execute: F) -> Self {
        Self { execute }
    }
}

#[async_trait]
impl<F, Fut> Executor for AsyncExecutor<F>
where
    F: Fn(ExecutionParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, BoxError>> + Send + 'static,
{
    async fn execute(&self, params: ExecutionParams) -> Result<Response, BoxError> {
        (self.execute)(params).await
    }
}

/// A [`Subscriber`] backed by a function returning a future.
pub struct FnSubscriber<F> {
    subscribe: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(ExecutionParams) -> BoxFuture<'static, Result<SubscriptionResult, BoxError>>
        + Send
        + Sync,
{
    pub fn new(subscribe: F) -> Self {
        Self { subscribe }
    }
}

#[async_trait]
impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(ExecutionParams) -> BoxFuture<'static, Result<SubscriptionResult, BoxError>>
        + Send
        + Sync,
{
    async fn subscribe(&self, params: ExecutionParams) -> Result<SubscriptionResult, BoxError> {
        (self.subscribe)(params).await
    }
}
