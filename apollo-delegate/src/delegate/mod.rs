//! Delegating fields of the composed schema to subschemas.
//!
//! One delegated call builds a [`DelegationContext`] and a request rooted at
//! the target field, runs the request through the transform pipeline, validates
//! it against the subschema, executes it and runs the result back through the
//! pipeline. When stitching info is present the merge engine then completes
//! the merged objects of the result.

mod context;
mod request;
mod resolver;

use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::validation::Valid;
pub use context::DelegateOptions;
pub use context::DelegateRequestOptions;
pub use context::DelegationContext;
use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use parking_lot::Mutex;
pub use request::CreateRequest;
pub use request::create_request;
pub use request::create_request_from_info;
pub use resolver::CreateProxyingResolverFn;
pub use resolver::FieldResolver;
pub use resolver::ProxyingResolver;
pub use resolver::ProxyingResolverOptions;
pub use resolver::default_create_proxying_resolver;
use tracing::Instrument;
use tracing::trace;

use crate::error::DelegationError;
use crate::executor::ExecutionParams;
use crate::executor::SubscriptionResult;
use crate::graphql;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::selection::SourceKeys;
use crate::selection::project;
use crate::stitching::MergeScope;
use crate::stitching::resolve_merged_types;
use crate::transform::Transformations;

/// The value of a delegated field with the errors located under it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DelegationResult {
    pub data: Value,
    pub errors: Vec<graphql::Error>,
}

impl DelegationResult {
    pub fn from_error(error: &DelegationError, path: Option<Path>) -> Self {
        Self {
            data: Value::Null,
            errors: vec![error.to_graphql_error(path)],
        }
    }
}

/// Delegates a field to a subschema, from resolver info or explicit options.
pub async fn delegate_to_schema(
    options: DelegateOptions,
) -> Result<DelegationResult, DelegationError> {
    let (delegation, request) = DelegationContext::from_options(options)?;
    execute_delegation(delegation, request).await
}

/// Delegates an already built request to a subschema.
pub async fn delegate_request(
    options: DelegateRequestOptions,
) -> Result<DelegationResult, DelegationError> {
    let (delegation, request) = DelegationContext::from_request(options)?;
    execute_delegation(delegation, request).await
}

fn span(delegation: &DelegationContext) -> tracing::Span {
    tracing::debug_span!(
        "delegate",
        subschema = delegation.subschema.name(),
        field = delegation.field_name.as_str(),
        operation = %delegation.operation,
        depth = delegation.depth,
    )
}

/// Turns `request` into the document the subschema receives.
fn prepare(
    delegation: &DelegationContext,
    request: &Request,
    transformations: &mut Transformations,
) -> Result<ExecutionParams, DelegationError> {
    let transformed = transformations.apply_request(request, delegation)?;
    trace!(query = %transformed.query(), "delegated request");

    let document = if delegation.skip_validation {
        Valid::assume_valid(transformed.document)
    } else {
        // reparsed so that every field is bound to the target schema's definitions
        ExecutableDocument::parse_and_validate(
            &delegation.target_schema,
            transformed.query(),
            "delegated_request.graphql",
        )
        .map_err(|errors| DelegationError::invalid_request(delegation.subschema.name(), errors))?
    };

    Ok(ExecutionParams::builder()
        .document(Arc::new(document))
        .and_operation_name(transformed.operation_name.map(|name| name.to_string()))
        .variables(transformed.variables)
        .context(delegation.context.clone())
        .and_info(delegation.info.clone())
        .and_root_value(
            delegation
                .root_value
                .clone()
                .or_else(|| delegation.subschema.root_value().cloned()),
        )
        .extensions(transformed.extensions)
        .build())
}

/// Extracts the delegated field from a transformed response and relocates its
/// errors under the caller's path.
fn extract(
    delegation: &DelegationContext,
    request: &Request,
    response: Response,
) -> Result<DelegationResult, DelegationError> {
    let response_key = request
        .root_field()
        .map(|field| field.response_key().to_string())
        .unwrap_or_else(|| delegation.field_name.to_string());
    let data = match response.data {
        None | Some(Value::Null) => Value::Null,
        Some(Value::Object(mut data)) => data.remove(response_key.as_str()).unwrap_or_default(),
        Some(_) => {
            return Err(DelegationError::MalformedResponse {
                subschema: delegation.subschema.name().to_string(),
                reason: "data is not an object".to_string(),
            });
        }
    };
    let errors = response
        .errors
        .iter()
        .map(|error| error.relocated(&delegation.path))
        .collect();
    Ok(DelegationResult { data, errors })
}

/// Completes the merged types of a delegated value and projects it onto the
/// caller's selection.
async fn merge(
    delegation: &DelegationContext,
    request: &Request,
    result: DelegationResult,
) -> DelegationResult {
    let Some(stitching_info) = delegation.stitching_info.clone() else {
        return result;
    };
    let Some(root_field) = request.root_field() else {
        return result;
    };
    // merge fetches keep their keys and `__typename` for the engine, which
    // recurses into what they return
    if root_field.selection_set.selections.is_empty() || delegation.is_merge_fetch() {
        return result;
    }

    let mut errors = result.errors;
    let data = if delegation.skip_type_merging {
        result.data
    } else {
        let scope = Arc::new(MergeScope {
            stitching_info: stitching_info.clone(),
            context: delegation.context.clone(),
            info: delegation.info.clone(),
            fragments: request.document.fragments.clone(),
            variable_definitions: request
                .operation()
                .map(|operation| operation.variables.clone())
                .unwrap_or_default(),
            variable_values: request.variables.clone(),
            skip_validation: delegation.skip_validation,
        });
        let (data, merge_errors) = resolve_merged_types(
            scope,
            result.data,
            root_field.selection_set.clone(),
            delegation.subschema.id(),
            delegation.path.clone(),
            delegation.depth,
        )
        .await;
        errors.extend(merge_errors);
        data
    };

    // drops what the transforms added for the merge engine
    let data = project(
        stitching_info.schema(),
        &data,
        &root_field.selection_set,
        &request.document.fragments,
        SourceKeys::ResponseKey,
    );
    DelegationResult { data, errors }
}

/// Runs one delegated call end to end.
pub(crate) fn execute_delegation(
    delegation: DelegationContext,
    request: Request,
) -> BoxFuture<'static, Result<DelegationResult, DelegationError>> {
    let span = span(&delegation);
    async move {
        let mut transformations = delegation.pipeline().begin();
        let params = prepare(&delegation, &request, &mut transformations)?;
        let Some(executor) = delegation.subschema.executor() else {
            return Err(DelegationError::MissingExecutor {
                subschema: delegation.subschema.name().to_string(),
            });
        };
        let response =
            executor
                .execute(params)
                .await
                .map_err(|err| DelegationError::Executor {
                    subschema: delegation.subschema.name().to_string(),
                    reason: err.to_string(),
                })?;
        let response = transformations.apply_result(response, &delegation)?;
        let result = extract(&delegation, &request, response)?;
        Ok(merge(&delegation, &request, result).await)
    }
    .instrument(span)
    .boxed()
}

/// Delegates a subscription field to a subschema.
///
/// Every event goes through the result transforms and the merge engine, like a
/// single response would.
pub async fn delegate_subscription(
    options: DelegateOptions,
) -> Result<BoxStream<'static, DelegationResult>, DelegationError> {
    let (delegation, request) = DelegationContext::from_options(options)?;
    let span = span(&delegation);
    async move {
        let mut transformations = delegation.pipeline().begin();
        let params = prepare(&delegation, &request, &mut transformations)?;
        let Some(subscriber) = delegation.subschema.subscriber() else {
            return Err(DelegationError::MissingSubscriber {
                subschema: delegation.subschema.name().to_string(),
            });
        };
        let subscription =
            subscriber
                .subscribe(params)
                .await
                .map_err(|err| DelegationError::Executor {
                    subschema: delegation.subschema.name().to_string(),
                    reason: err.to_string(),
                })?;

        let delegation = Arc::new(delegation);
        let request = Arc::new(request);
        let transformations = Arc::new(Mutex::new(transformations));
        let events = match subscription {
            SubscriptionResult::Single(response) => futures::stream::once(async { response }).boxed(),
            SubscriptionResult::Stream(stream) => stream,
        };
        Ok(events
            .then(move |response| {
                let delegation = delegation.clone();
                let request = request.clone();
                let transformations = transformations.clone();
                async move {
                    let transformed = transformations.lock().apply_result(response, &delegation);
                    let result = transformed
                        .map_err(DelegationError::from)
                        .and_then(|response| extract(&delegation, &request, response));
                    match result {
                        Ok(result) => merge(&delegation, &request, result).await,
                        Err(error) => {
                            DelegationResult::from_error(&error, Some(delegation.path.clone()))
                        }
                    }
                }
            })
            .boxed())
    }
    .instrument(span)
    .await
}
