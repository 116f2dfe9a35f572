use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::SelectionSet;

use super::request::CreateRequest;
use super::request::create_request;
use crate::configuration::Configuration;
use crate::context::Context;
use crate::error::DelegationError;
use crate::graphql::OperationKind;
use crate::graphql::Request;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::resolve_info::ResolveInfo;
use crate::stitching::StitchingInfo;
use crate::subschema::SchemaRef;
use crate::subschema::Subschema;
use crate::transform::AddSelectionSets;
use crate::transform::FilterToSchema;
use crate::transform::Transform;
use crate::transform::TransformPipeline;

/// Everything one delegated call needs to know.
///
/// Built fresh for every call and never modified afterwards; per-transform
/// state lives in [`Transformations`](crate::transform::Transformations).
#[derive(Clone)]
#[non_exhaustive]
pub struct DelegationContext {
    pub subschema: Arc<Subschema>,
    /// The subschema's own schema, which outgoing requests must match.
    pub target_schema: SchemaRef,
    /// The schema after the subschema's transforms, in the caller's terms.
    pub transformed_schema: SchemaRef,
    pub operation: OperationKind,
    pub field_name: Name,
    pub args: Object,
    pub context: Context,
    pub info: Option<Arc<ResolveInfo>>,
    pub stitching_info: Option<Arc<StitchingInfo>>,
    pub return_type: ast::Type,
    /// Caller-supplied transforms followed by the subschema's own.
    pub transforms: Vec<Arc<dyn Transform>>,
    /// Where the delegated field lives in the caller's response.
    pub path: Path,
    /// Handed to the executor instead of the subschema's own root value.
    pub root_value: Option<Value>,
    pub skip_type_merging: bool,
    pub skip_validation: bool,
    /// How many merged-type re-fetches led to this call. Re-fetches return
    /// their raw result to the merge engine instead of the caller's shape.
    pub depth: usize,
}

fn configuration_of(stitching_info: Option<&Arc<StitchingInfo>>) -> Configuration {
    stitching_info
        .map(|stitching_info| stitching_info.configuration().clone())
        .unwrap_or_default()
}

impl DelegationContext {
    pub(crate) fn is_merge_fetch(&self) -> bool {
        self.depth > 0
    }

    /// The full pipeline of one delegated call.
    ///
    /// Merged-type selections are added first, in the caller's terms, and the
    /// request is filtered against the target schema last, closest to the wire.
    pub fn pipeline(&self) -> TransformPipeline {
        let mut transforms: Vec<Arc<dyn Transform>> = Vec::with_capacity(self.transforms.len() + 2);
        if let Some(stitching_info) = &self.stitching_info {
            transforms.push(Arc::new(AddSelectionSets::new(stitching_info.clone())));
        }
        transforms.extend(self.transforms.iter().cloned());
        transforms.push(Arc::new(FilterToSchema::new(self.target_schema.clone())));
        TransformPipeline::compose(transforms)
    }
}

impl fmt::Debug for DelegationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationContext")
            .field("subschema", &self.subschema.name())
            .field("operation", &self.operation)
            .field("field_name", &self.field_name)
            .field("args", &self.args)
            .field("return_type", &self.return_type.to_string())
            .field("path", &self.path)
            .field("skip_type_merging", &self.skip_type_merging)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Options of [`delegate_to_schema`](super::delegate_to_schema).
#[derive(Clone)]
#[non_exhaustive]
pub struct DelegateOptions {
    pub subschema: Arc<Subschema>,
    pub operation: Option<OperationKind>,
    pub field_name: Option<String>,
    pub args: Object,
    pub selection_set: Option<SelectionSet>,
    pub field_nodes: Vec<Node<Field>>,
    pub return_type: Option<ast::Type>,
    pub context: Context,
    pub info: Option<Arc<ResolveInfo>>,
    pub stitching_info: Option<Arc<StitchingInfo>>,
    pub transforms: Vec<Arc<dyn Transform>>,
    /// Overrides the subschema's root value for this call.
    pub root_value: Option<Value>,
    /// The schema the request is written against, when this call sees the
    /// subschema differently from its registered transforms.
    pub transformed_schema: Option<SchemaRef>,
    pub skip_type_merging: Option<bool>,
    pub skip_validation: Option<bool>,
}

#[buildstructor::buildstructor]
impl DelegateOptions {
    #[builder(visibility = "pub")]
    #[allow(clippy::too_many_arguments)] // Used through a builder, not directly
    fn new(
        subschema: Arc<Subschema>,
        operation: Option<OperationKind>,
        field_name: Option<String>,
        args: Option<Object>,
        selection_set: Option<SelectionSet>,
        field_nodes: Vec<Node<Field>>,
        return_type: Option<ast::Type>,
        context: Option<Context>,
        info: Option<Arc<ResolveInfo>>,
        stitching_info: Option<Arc<StitchingInfo>>,
        transforms: Vec<Arc<dyn Transform>>,
        root_value: Option<Value>,
        transformed_schema: Option<SchemaRef>,
        skip_type_merging: Option<bool>,
        skip_validation: Option<bool>,
    ) -> Self {
        Self {
            subschema,
            operation,
            field_name,
            args: args.unwrap_or_default(),
            selection_set,
            field_nodes,
            return_type,
            context: context.unwrap_or_default(),
            info,
            stitching_info,
            transforms,
            root_value,
            transformed_schema,
            skip_type_merging,
            skip_validation,
        }
    }
}

/// Options of [`delegate_request`](super::delegate_request), for callers that
/// already built a [`Request`].
#[derive(Clone)]
#[non_exhaustive]
pub struct DelegateRequestOptions {
    pub subschema: Arc<Subschema>,
    pub request: Request,
    pub field_name: Option<String>,
    pub args: Object,
    pub return_type: Option<ast::Type>,
    pub context: Context,
    pub info: Option<Arc<ResolveInfo>>,
    pub stitching_info: Option<Arc<StitchingInfo>>,
    pub transforms: Vec<Arc<dyn Transform>>,
    pub root_value: Option<Value>,
    pub skip_type_merging: Option<bool>,
    pub skip_validation: Option<bool>,
}

#[buildstructor::buildstructor]
impl DelegateRequestOptions {
    #[builder(visibility = "pub")]
    #[allow(clippy::too_many_arguments)] // Used through a builder, not directly
    fn new(
        subschema: Arc<Subschema>,
        request: Request,
        field_name: Option<String>,
        args: Option<Object>,
        return_type: Option<ast::Type>,
        context: Option<Context>,
        info: Option<Arc<ResolveInfo>>,
        stitching_info: Option<Arc<StitchingInfo>>,
        transforms: Vec<Arc<dyn Transform>>,
        root_value: Option<Value>,
        skip_type_merging: Option<bool>,
        skip_validation: Option<bool>,
    ) -> Self {
        Self {
            subschema,
            request,
            field_name,
            args: args.unwrap_or_default(),
            return_type,
            context: context.unwrap_or_default(),
            info,
            stitching_info,
            transforms,
            root_value,
            skip_type_merging,
            skip_validation,
        }
    }
}

fn parse_name(name: &str) -> Result<Name, DelegationError> {
    Name::new(name).map_err(|err| DelegationError::MalformedRequest {
        reason: err.to_string(),
    })
}

fn effective_transforms(
    global: Vec<Arc<dyn Transform>>,
    subschema: &Subschema,
) -> Vec<Arc<dyn Transform>> {
    let mut transforms = global;
    transforms.extend(subschema.transforms().iter().cloned());
    transforms
}

/// Finds the definition of the target root field in the transformed schema.
fn target_field(
    subschema: &Subschema,
    schema: &SchemaRef,
    operation: OperationKind,
    field_name: &Name,
) -> Result<ast::Type, DelegationError> {
    let Some(root) = schema.root_operation(operation.into()) else {
        return Err(DelegationError::MissingRootType {
            subschema: subschema.name().to_string(),
            operation: operation.to_string(),
        });
    };
    schema
        .type_field(root, field_name)
        .map(|definition| definition.ty.clone())
        .map_err(|_| DelegationError::UnknownField {
            subschema: subschema.name().to_string(),
            type_name: root.to_string(),
            field_name: field_name.to_string(),
        })
}

impl DelegationContext {
    /// Builds the context and the outgoing request of a delegation from
    /// resolver info or explicit options.
    pub(crate) fn from_options(
        options: DelegateOptions,
    ) -> Result<(Self, Request), DelegationError> {
        let DelegateOptions {
            subschema,
            operation,
            field_name,
            args,
            selection_set,
            field_nodes,
            return_type,
            context,
            info,
            stitching_info,
            transforms,
            root_value,
            transformed_schema,
            skip_type_merging,
            skip_validation,
        } = options;
        let transformed_schema =
            transformed_schema.unwrap_or_else(|| subschema.transformed_schema().clone());

        let operation = operation
            .or_else(|| info.as_ref().map(|info| info.operation_kind()))
            .unwrap_or_default();
        let field_name = match (field_name, &info) {
            (Some(field_name), _) => parse_name(&field_name)?,
            (None, Some(info)) => info.field_name.clone(),
            (None, None) => {
                return Err(DelegationError::MalformedRequest {
                    reason: "a target field name or resolver info is required".to_string(),
                });
            }
        };
        let target_type = target_field(&subschema, &transformed_schema, operation, &field_name)?;
        let return_type = return_type
            .or_else(|| info.as_ref().map(|info| info.return_type.clone()))
            .unwrap_or(target_type);

        let field_nodes = if field_nodes.is_empty() {
            info.as_ref()
                .map(|info| info.field_nodes.clone())
                .unwrap_or_default()
        } else {
            field_nodes
        };

        let request = match &info {
            Some(info) => create_request(CreateRequest {
                target_schema: &transformed_schema,
                subschema_name: subschema.name(),
                operation,
                field_name: &field_name,
                args: &args,
                selection_set,
                field_nodes: &field_nodes,
                fragments: &info.fragments,
                variable_definitions: &info.operation.variables,
                variable_values: &info.variable_values,
            })?,
            None => create_request(CreateRequest {
                target_schema: &transformed_schema,
                subschema_name: subschema.name(),
                operation,
                field_name: &field_name,
                args: &args,
                selection_set,
                field_nodes: &field_nodes,
                fragments: &Default::default(),
                variable_definitions: &[],
                variable_values: &Object::new(),
            })?,
        };

        let path = match &info {
            Some(info) => info.path.clone(),
            None => Path::empty().key(
                request
                    .root_field()
                    .map(|field| field.response_key().as_str())
                    .unwrap_or(field_name.as_str()),
            ),
        };
        let configuration = configuration_of(stitching_info.as_ref());

        let delegation = DelegationContext {
            target_schema: subschema.schema().clone(),
            transformed_schema,
            transforms: effective_transforms(transforms, &subschema),
            subschema,
            operation,
            field_name,
            args,
            context,
            info,
            stitching_info,
            return_type,
            path,
            root_value,
            skip_type_merging: skip_type_merging
                .unwrap_or(!configuration.type_merging.enabled),
            skip_validation: skip_validation.unwrap_or(!configuration.validate_requests),
            depth: 0,
        };
        Ok((delegation, request))
    }

    /// Builds the context of a delegation around an already built request.
    pub fn from_request(options: DelegateRequestOptions) -> Result<(Self, Request), DelegationError> {
        let DelegateRequestOptions {
            subschema,
            request,
            field_name,
            args,
            return_type,
            context,
            info,
            stitching_info,
            transforms,
            root_value,
            skip_type_merging,
            skip_validation,
        } = options;

        let operation = request.operation_kind;
        let root_field = request.root_field();
        let field_name = match (field_name, root_field) {
            (Some(field_name), _) => parse_name(&field_name)?,
            (None, Some(field)) => field.name.clone(),
            (None, None) => {
                return Err(DelegationError::UnresolvedReturnType {
                    field_name: request
                        .operation_name
                        .as_ref()
                        .map(|name| name.to_string())
                        .unwrap_or_default(),
                });
            }
        };
        let return_type = match return_type {
            Some(return_type) => return_type,
            None => target_field(
                &subschema,
                subschema.transformed_schema(),
                operation,
                &field_name,
            )?,
        };
        let path = match (&info, request.root_field()) {
            (Some(info), _) => info.path.clone(),
            (None, Some(field)) => Path::empty().key(field.response_key().as_str()),
            (None, None) => Path::empty().key(field_name.as_str()),
        };
        let configuration = configuration_of(stitching_info.as_ref());

        let delegation = DelegationContext {
            target_schema: subschema.schema().clone(),
            transformed_schema: subschema.transformed_schema().clone(),
            transforms: effective_transforms(transforms, &subschema),
            subschema,
            operation,
            field_name,
            args,
            context,
            info,
            stitching_info,
            return_type,
            path,
            root_value,
            skip_type_merging: skip_type_merging
                .unwrap_or(!configuration.type_merging.enabled),
            skip_validation: skip_validation.unwrap_or(!configuration.validate_requests),
            depth: 0,
        };
        Ok((delegation, request))
    }
}
