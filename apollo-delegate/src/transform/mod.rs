//! Transforms rewrite the schema, the request and the result as they cross a
//! delegation boundary.
//!
//! A [`Transform`] declares which of the three hooks it implements through its
//! [`Capability`] set; the [`TransformPipeline`] never calls a hook whose
//! capability is absent. Request hooks run in pipeline order and result hooks
//! in reverse order, so the last transform to touch the outgoing request is the
//! first to see the incoming result.

mod add_selection_sets;
mod filter_to_schema;
mod rename;

use std::fmt;
use std::sync::Arc;

pub use add_selection_sets::AddSelectionSets;
use displaydoc::Display;
pub use filter_to_schema::FilterToSchema;
pub use rename::RenameObjectFields;
use thiserror::Error;

use crate::delegate::DelegationContext;
use crate::error::DelegationError;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::subschema::SchemaRef;

/// A hook a [`Transform`] implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    SchemaRewrite,
    RequestRewrite,
    ResultRewrite,
}

/// A pluggable rewrite applied at a delegation boundary.
///
/// Hooks default to returning their input unchanged. A hook is only called when
/// [`Transform::capabilities`] lists its capability.
pub trait Transform: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    fn transform_schema(&self, schema: SchemaRef) -> Result<SchemaRef, TransformError> {
        Ok(schema)
    }

    fn transform_request(
        &self,
        request: Request,
        _context: &mut TransformationContext,
        _delegation: &DelegationContext,
    ) -> Result<Request, TransformError> {
        Ok(request)
    }

    fn transform_result(
        &self,
        response: Response,
        _context: &mut TransformationContext,
        _delegation: &DelegationContext,
    ) -> Result<Response, TransformError> {
        Ok(response)
    }
}

fn has(transform: &dyn Transform, capability: Capability) -> bool {
    transform.capabilities().contains(&capability)
}

/// State a transform keeps between the request and result phases of one call.
#[derive(Default, Debug)]
pub struct TransformationContext {
    extensions: http::Extensions,
}

impl TransformationContext {
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions.get_mut()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions.remove()
    }
}

/// One transform paired with its per-call state.
pub struct Transformation {
    pub transform: Arc<dyn Transform>,
    pub context: TransformationContext,
}

impl fmt::Debug for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformation")
            .field("transform", &self.transform.name())
            .field("context", &self.context)
            .finish()
    }
}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
/// transform '{transform}' failed: {source}
pub struct TransformFailure {
    pub transform: String,
    pub source: TransformError,
}

impl From<TransformFailure> for DelegationError {
    fn from(failure: TransformFailure) -> Self {
        DelegationError::Transform {
            transform: failure.transform,
            reason: failure.source.to_string(),
        }
    }
}

/// An ordered composition of transforms.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformPipeline {
    pub fn compose(transforms: impl IntoIterator<Item = Arc<dyn Transform>>) -> Self {
        Self {
            transforms: transforms.into_iter().collect(),
        }
    }

    pub fn transforms(&self) -> &[Arc<dyn Transform>] {
        &self.transforms
    }

    /// Folds the schema hooks left to right.
    pub fn apply_schema(&self, schema: SchemaRef) -> Result<SchemaRef, TransformFailure> {
        self.transforms
            .iter()
            .filter(|transform| has(transform.as_ref(), Capability::SchemaRewrite))
            .try_fold(schema, |schema, transform| {
                transform
                    .transform_schema(schema)
                    .map_err(|source| TransformFailure {
                        transform: transform.name().to_string(),
                        source,
                    })
            })
    }

    /// Starts one application of the pipeline, with fresh per-transform state.
    pub fn begin(&self) -> Transformations {
        Transformations {
            transformations: self
                .transforms
                .iter()
                .map(|transform| Transformation {
                    transform: transform.clone(),
                    context: TransformationContext::default(),
                })
                .collect(),
        }
    }
}

impl fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.transforms.iter().map(|t| t.name()))
            .finish()
    }
}

/// One application of a [`TransformPipeline`], owned by a single delegated call.
#[derive(Debug)]
pub struct Transformations {
    transformations: Vec<Transformation>,
}

impl Transformations {
    /// Folds the request hooks in order. `request` itself is left untouched.
    pub fn apply_request(
        &mut self,
        request: &Request,
        delegation: &DelegationContext,
    ) -> Result<Request, TransformFailure> {
        let mut current = request.clone();
        for Transformation { transform, context } in self.transformations.iter_mut() {
            if !has(transform.as_ref(), Capability::RequestRewrite) {
                continue;
            }
            current = transform
                .transform_request(current, context, delegation)
                .map_err(|source| TransformFailure {
                    transform: transform.name().to_string(),
                    source,
                })?;
        }
        Ok(current)
    }

    /// Folds the result hooks in reverse order.
    pub fn apply_result(
        &mut self,
        response: Response,
        delegation: &DelegationContext,
    ) -> Result<Response, TransformFailure> {
        let mut current = response;
        for Transformation { transform, context } in self.transformations.iter_mut().rev() {
            if !has(transform.as_ref(), Capability::ResultRewrite) {
                continue;
            }
            current = transform
                .transform_result(current, context, delegation)
                .map_err(|source| TransformFailure {
                    transform: transform.name().to_string(),
                    source,
                })?;
        }
        Ok(current)
    }
}
