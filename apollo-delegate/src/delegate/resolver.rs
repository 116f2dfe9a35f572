//! Resolvers that proxy composed-schema fields to a subschema.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::DelegateOptions;
use super::DelegationResult;
use super::delegate_to_schema;
use crate::context::Context;
use crate::graphql::OperationKind;
use crate::json_ext::Object;
use crate::resolve_info::ResolveInfo;
use crate::stitching::StitchingInfo;
use crate::subschema::Subschema;
use crate::transform::Transform;

/// Resolves one field of the composed schema.
///
/// Failures are reported as errors located at the field rather than returned,
/// so sibling fields still resolve.
#[async_trait]
pub trait FieldResolver: Send + Sync {
    async fn resolve(
        &self,
        args: Object,
        context: Context,
        info: Arc<ResolveInfo>,
    ) -> DelegationResult;
}

/// Builds the resolver of a root field proxied to a subschema.
pub type CreateProxyingResolverFn =
    Arc<dyn Fn(ProxyingResolverOptions) -> Arc<dyn FieldResolver> + Send + Sync>;

/// What a proxying resolver is built from.
#[derive(Clone)]
pub struct ProxyingResolverOptions {
    pub subschema: Arc<Subschema>,
    pub transforms: Vec<Arc<dyn Transform>>,
    /// Defaults to the operation of the resolved field.
    pub operation: Option<OperationKind>,
    /// Defaults to the name of the resolved field.
    pub field_name: Option<String>,
    pub stitching_info: Option<Arc<StitchingInfo>>,
}

impl ProxyingResolverOptions {
    pub fn new(subschema: Arc<Subschema>) -> Self {
        Self {
            subschema,
            transforms: Vec::new(),
            operation: None,
            field_name: None,
            stitching_info: None,
        }
    }

    pub fn with_stitching_info(mut self, stitching_info: Arc<StitchingInfo>) -> Self {
        self.stitching_info = Some(stitching_info);
        self
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn with_operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }
}

impl fmt::Debug for ProxyingResolverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyingResolverOptions")
            .field("subschema", &self.subschema.name())
            .field("operation", &self.operation)
            .field("field_name", &self.field_name)
            .finish()
    }
}

/// The default resolver of a root field: delegates it, unchanged, to one subschema.
#[derive(Clone, Debug)]
pub struct ProxyingResolver {
    options: ProxyingResolverOptions,
}

impl ProxyingResolver {
    pub fn new(options: ProxyingResolverOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl FieldResolver for ProxyingResolver {
    async fn resolve(
        &self,
        args: Object,
        context: Context,
        info: Arc<ResolveInfo>,
    ) -> DelegationResult {
        let options = DelegateOptions::builder()
            .subschema(self.options.subschema.clone())
            .and_operation(self.options.operation)
            .and_field_name(self.options.field_name.clone())
            .args(args)
            .context(context)
            .info(info.clone())
            .and_stitching_info(self.options.stitching_info.clone())
            .transforms(self.options.transforms.clone())
            .build();
        delegate_to_schema(options)
            .await
            .unwrap_or_else(|error| DelegationResult::from_error(&error, Some(info.path.clone())))
    }
}

pub fn default_create_proxying_resolver(options: ProxyingResolverOptions) -> Arc<dyn FieldResolver> {
    Arc::new(ProxyingResolver::new(options))
}
