//! Subschema configuration.
//!
//! A [`SubschemaConfig`] describes one backend participating in the composed
//! schema: its schema, how to execute requests against it, the transforms that
//! adapt it, and how its merged types can be re-fetched. Public entry points
//! accept either a config or a bare schema as a [`SchemaOrSubschema`], which is
//! resolved once into a canonical [`Subschema`].

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::validation::Valid;
use async_trait::async_trait;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::context::Context;
use crate::delegate::CreateProxyingResolverFn;
use crate::delegate::DelegationResult;
use crate::delegate::FieldResolver;
use crate::delegate::ProxyingResolverOptions;
use crate::delegate::default_create_proxying_resolver;
use crate::error::CompositionError;
use crate::error::DelegationError;
use crate::executor::Executor;
use crate::executor::Subscriber;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::resolve_info::ResolveInfo;
use crate::transform::Transform;
use crate::transform::TransformPipeline;

/// A validated schema shared across subschemas and calls.
pub type SchemaRef = Arc<Valid<Schema>>;

/// Builds the arguments of a merged-type re-fetch from the partial object
/// fetched so far.
pub type ArgsBuilder = Arc<dyn Fn(&Object) -> Result<Object, String> + Send + Sync>;

/// What a [`MergedTypeResolver`] receives.
#[non_exhaustive]
pub struct MergedTypeResolution {
    /// The partial object fetched so far.
    pub object: Object,
    pub context: Context,
    /// Info of the delegated field the object was found under, if any.
    pub info: Option<Arc<ResolveInfo>>,
    /// The subschema the missing fields are owned by.
    pub subschema: Arc<Subschema>,
    /// The fields to resolve, in the composed schema's terms.
    pub selection_set: SelectionSet,
}

/// Resolves the missing fields of a merged object without default delegation.
///
/// The returned data must be an object keyed by the response keys of
/// [`MergedTypeResolution::selection_set`].
#[async_trait]
pub trait MergedTypeResolver: Send + Sync {
    async fn resolve(
        &self,
        resolution: MergedTypeResolution,
    ) -> Result<DelegationResult, DelegationError>;
}

/// How one subschema lets the engine re-fetch a merged type.
#[derive(Clone, Default)]
pub struct MergedTypeConfig {
    /// Fields an object must carry before it can be re-fetched from this
    /// subschema, such as `{ id }`.
    pub selection_set: Option<String>,
    /// Root query field used as the re-fetch entry point.
    pub field_name: Option<String>,
    /// Builds the entry point's arguments. Defaults to the top-level fields of
    /// [`Self::selection_set`] copied from the partial object.
    pub args: Option<ArgsBuilder>,
    /// Replaces default delegation for this type.
    pub resolve: Option<Arc<dyn MergedTypeResolver>>,
    /// Fields this subschema declares it owns exclusively.
    pub owned_fields: IndexSet<String>,
    /// Fields that need extra data from the object, with the selection they need.
    pub computed_fields: IndexMap<String, String>,
}

impl MergedTypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection_set(mut self, selection_set: impl Into<String>) -> Self {
        self.selection_set = Some(selection_set.into());
        self
    }

    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn args<F>(mut self, args: F) -> Self
    where
        F: Fn(&Object) -> Result<Object, String> + Send + Sync + 'static,
    {
        self.args = Some(Arc::new(args));
        self
    }

    pub fn resolve(mut self, resolver: impl MergedTypeResolver + 'static) -> Self {
        self.resolve = Some(Arc::new(resolver));
        self
    }

    pub fn owned_field(mut self, field: impl Into<String>) -> Self {
        self.owned_fields.insert(field.into());
        self
    }

    pub fn computed_field(
        mut self,
        field: impl Into<String>,
        selection_set: impl Into<String>,
    ) -> Self {
        self.computed_fields
            .insert(field.into(), selection_set.into());
        self
    }

    /// Arguments for re-fetching `object`, using `key_fields` when no builder is configured.
    pub(crate) fn build_args(
        &self,
        object: &Object,
        key_fields: &IndexSet<Name>,
    ) -> Result<Object, String> {
        match &self.args {
            Some(args) => args(object),
            None => Ok(key_fields
                .iter()
                .filter_map(|field| {
                    object
                        .get_key_value(field.as_str())
                        .map(|(key, value)| (key.clone(), value.clone()))
                })
                .collect()),
        }
    }
}

impl fmt::Debug for MergedTypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedTypeConfig")
            .field("selection_set", &self.selection_set)
            .field("field_name", &self.field_name)
            .field("args", &self.args.is_some())
            .field("resolve", &self.resolve.is_some())
            .field("owned_fields", &self.owned_fields)
            .field("computed_fields", &self.computed_fields)
            .finish()
    }
}

/// A registered backend.
#[derive(Clone)]
pub struct SubschemaConfig {
    pub name: String,
    pub schema: Option<SchemaRef>,
    pub root_value: Option<Value>,
    pub executor: Option<Arc<dyn Executor>>,
    pub subscriber: Option<Arc<dyn Subscriber>>,
    pub create_proxying_resolver: Option<CreateProxyingResolverFn>,
    /// Applied in order to the schema and to outgoing requests, in reverse to results.
    pub transforms: Vec<Arc<dyn Transform>>,
    /// Merge policy per type name.
    pub merge: IndexMap<String, MergedTypeConfig>,
}

impl SubschemaConfig {
    pub fn new(name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema: Some(schema),
            root_value: None,
            executor: None,
            subscriber: None,
            create_proxying_resolver: None,
            transforms: Vec::new(),
            merge: IndexMap::new(),
        }
    }

    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn with_subscriber(mut self, subscriber: impl Subscriber + 'static) -> Self {
        self.subscriber = Some(Arc::new(subscriber));
        self
    }

    pub fn with_root_value(mut self, root_value: Value) -> Self {
        self.root_value = Some(root_value);
        self
    }

    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn with_merge(mut self, type_name: impl Into<String>, config: MergedTypeConfig) -> Self {
        self.merge.insert(type_name.into(), config);
        self
    }

    pub fn with_proxying_resolver(mut self, create: CreateProxyingResolverFn) -> Self {
        self.create_proxying_resolver = Some(create);
        self
    }
}

impl fmt::Debug for SubschemaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubschemaConfig")
            .field("name", &self.name)
            .field("has_schema", &self.schema.is_some())
            .field("has_executor", &self.executor.is_some())
            .field("has_subscriber", &self.subscriber.is_some())
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("merge", &self.merge)
            .finish()
    }
}

/// Either a bare schema or a full subschema configuration.
#[derive(Clone, Debug)]
pub enum SchemaOrSubschema {
    Schema(SchemaRef),
    Config(SubschemaConfig),
}

impl From<SchemaRef> for SchemaOrSubschema {
    fn from(schema: SchemaRef) -> Self {
        SchemaOrSubschema::Schema(schema)
    }
}

impl From<Valid<Schema>> for SchemaOrSubschema {
    fn from(schema: Valid<Schema>) -> Self {
        SchemaOrSubschema::Schema(Arc::new(schema))
    }
}

impl From<SubschemaConfig> for SchemaOrSubschema {
    fn from(config: SubschemaConfig) -> Self {
        SchemaOrSubschema::Config(config)
    }
}

/// Returns true if `value` is a subschema configuration carrying a schema.
pub fn is_subschema_config(value: &SchemaOrSubschema) -> bool {
    matches!(value, SchemaOrSubschema::Config(config) if config.schema.is_some())
}

/// Identifies a subschema within one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubschemaId(pub(crate) usize);

/// A registered subschema with its post-transform schema computed.
pub struct Subschema {
    id: SubschemaId,
    name: String,
    schema: SchemaRef,
    transformed_schema: SchemaRef,
    root_value: Option<Value>,
    executor: Option<Arc<dyn Executor>>,
    subscriber: Option<Arc<dyn Subscriber>>,
    create_proxying_resolver: Option<CreateProxyingResolverFn>,
    transforms: Vec<Arc<dyn Transform>>,
    merge: IndexMap<Name, MergedTypeConfig>,
}

impl Subschema {
    /// Resolves `source` into a canonical subschema.
    ///
    /// A bare schema becomes a subschema named after its position, with no
    /// executor, transforms or merge configuration.
    pub(crate) fn canonicalize(
        id: SubschemaId,
        source: SchemaOrSubschema,
    ) -> Result<Self, CompositionError> {
        let config = match source {
            SchemaOrSubschema::Schema(schema) => {
                SubschemaConfig::new(format!("subschema_{}", id.0), schema)
            }
            SchemaOrSubschema::Config(config) => config,
        };
        let Some(schema) = config.schema.clone() else {
            return Err(CompositionError::MissingSchema { name: config.name });
        };

        let transformed_schema = TransformPipeline::compose(config.transforms.clone())
            .apply_schema(schema.clone())
            .map_err(|failure| CompositionError::SchemaTransform {
                transform: failure.transform,
                subschema: config.name.clone(),
                reason: failure.source.to_string(),
            })?;

        let mut merge = IndexMap::with_capacity(config.merge.len());
        for (type_name, merged_type_config) in config.merge {
            let name = Name::new(&type_name).map_err(|err| {
                CompositionError::UnresolvedMergeConfig {
                    type_name: type_name.clone(),
                    subschema: config.name.clone(),
                    reason: err.to_string(),
                }
            })?;
            merge.insert(name, merged_type_config);
        }

        Ok(Self {
            id,
            name: config.name,
            schema,
            transformed_schema,
            root_value: config.root_value,
            executor: config.executor,
            subscriber: config.subscriber,
            create_proxying_resolver: config.create_proxying_resolver,
            transforms: config.transforms,
            merge,
        })
    }

    /// Canonicalizes a subschema that is not part of any registry.
    pub fn standalone(source: impl Into<SchemaOrSubschema>) -> Result<Arc<Self>, CompositionError> {
        Ok(Arc::new(Self::canonicalize(SubschemaId(0), source.into())?))
    }

    pub fn id(&self) -> SubschemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The subschema's own schema, as its executor understands it.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The schema after this subschema's transforms, as the composed schema sees it.
    pub fn transformed_schema(&self) -> &SchemaRef {
        &self.transformed_schema
    }

    pub fn root_value(&self) -> Option<&Value> {
        self.root_value.as_ref()
    }

    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    pub fn subscriber(&self) -> Option<&Arc<dyn Subscriber>> {
        self.subscriber.as_ref()
    }

    pub fn transforms(&self) -> &[Arc<dyn Transform>] {
        &self.transforms
    }

    pub fn merge(&self) -> &IndexMap<Name, MergedTypeConfig> {
        &self.merge
    }

    pub fn merged_type_config(&self, type_name: &str) -> Option<&MergedTypeConfig> {
        self.merge.get(type_name)
    }

    /// A resolver delegating a root field of the composed schema to this subschema.
    ///
    /// Uses the subschema's own factory when one is configured.
    pub fn proxying_resolver(
        self: &Arc<Self>,
        mut options: ProxyingResolverOptions,
    ) -> Arc<dyn FieldResolver> {
        options.subschema = self.clone();
        match &self.create_proxying_resolver {
            Some(create) => create(options),
            None => default_create_proxying_resolver(options),
        }
    }
}

impl fmt::Debug for Subschema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subschema")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
