//! Building the request of a delegated root field.

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::executable;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::FragmentMap;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use indexmap::IndexSet;
use tracing::debug;

use crate::error::DelegationError;
use crate::graphql::OperationKind;
use crate::graphql::Request;
use crate::json_ext::Object;
use crate::resolve_info::ResolveInfo;
use crate::selection::merged_sub_selection;
use crate::selection::referenced_fragments;
use crate::selection::referenced_variables;
use crate::subschema::SchemaRef;

/// Inputs of [`create_request`].
pub struct CreateRequest<'a> {
    /// The schema the request is written against, in the caller's terms.
    pub target_schema: &'a SchemaRef,
    pub subschema_name: &'a str,
    pub operation: OperationKind,
    pub field_name: &'a Name,
    /// Explicit arguments, passed as variables.
    pub args: &'a Object,
    /// Replaces the merged sub-selection of `field_nodes`.
    pub selection_set: Option<SelectionSet>,
    /// The caller's nodes for the delegated field. Their alias, arguments and
    /// directives carry over to the request.
    pub field_nodes: &'a [Node<Field>],
    pub fragments: &'a FragmentMap,
    pub variable_definitions: &'a [Node<ast::VariableDefinition>],
    pub variable_values: &'a Object,
}

/// Builds a single-root-field request for `field_name` on the root type of
/// `operation`.
///
/// Only the fragments and the variables the new operation references are
/// carried over.
pub fn create_request(options: CreateRequest<'_>) -> Result<Request, DelegationError> {
    let CreateRequest {
        target_schema,
        subschema_name,
        operation,
        field_name,
        args,
        selection_set,
        field_nodes,
        fragments,
        variable_definitions,
        variable_values,
    } = options;

    let Some(root_type) = target_schema.root_operation(operation.into()) else {
        return Err(DelegationError::MissingRootType {
            subschema: subschema_name.to_string(),
            operation: operation.to_string(),
        });
    };
    let definition = target_schema
        .type_field(root_type, field_name)
        .map_err(|_| DelegationError::UnknownField {
            subschema: subschema_name.to_string(),
            type_name: root_type.to_string(),
            field_name: field_name.to_string(),
        })?;
    let return_type = definition.ty.inner_named_type().clone();

    let caller = field_nodes.first();
    let alias = caller
        .map(|field| field.response_key().clone())
        .filter(|key| key != field_name);

    let arguments: Vec<Node<ast::Argument>> = caller
        .map(|field| {
            field
                .arguments
                .iter()
                .filter(|argument| {
                    definition.argument_by_name(&argument.name).is_some()
                        && !args.contains_key(argument.name.as_str())
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut field_selection = match selection_set {
        Some(selection_set) => selection_set,
        None => merged_sub_selection(&return_type, field_nodes),
    };
    field_selection.ty = return_type;

    let mut field = Field {
        definition: definition.node.clone(),
        alias,
        name: field_name.clone(),
        arguments,
        directives: caller
            .map(|field| field.directives.clone())
            .unwrap_or_default(),
        selection_set: field_selection,
    };
    let mut root_selection = SelectionSet::new(root_type.clone());
    root_selection
        .selections
        .push(Selection::Field(Node::new(field.clone())));

    let used_fragments = referenced_fragments(&root_selection, fragments);
    let mut taken = referenced_variables(&root_selection, fragments);
    let mut variable_list: Vec<Node<ast::VariableDefinition>> = variable_definitions
        .iter()
        .filter(|definition| taken.contains(&definition.name))
        .cloned()
        .collect();
    let mut variables = Object::new();
    for definition in &variable_list {
        if let Some(value) = variable_values.get(definition.name.as_str()) {
            variables.insert(definition.name.as_str(), value.clone());
        }
    }

    for (index, (name, value)) in args.iter().enumerate() {
        let Some(argument_definition) = definition.argument_by_name(name.as_str()) else {
            debug!(
                argument = name.as_str(),
                field = field_name.as_str(),
                "dropping argument unknown to the target field"
            );
            continue;
        };
        let variable = variable_name(index, name.as_str(), &taken)?;
        taken.insert(variable.clone());
        field.arguments.push(Node::new(ast::Argument {
            name: argument_definition.name.clone(),
            value: Node::new(ast::Value::Variable(variable.clone())),
        }));
        variable_list.push(Node::new(ast::VariableDefinition {
            name: variable.clone(),
            ty: argument_definition.ty.clone(),
            default_value: None,
            directives: Default::default(),
        }));
        variables.insert(variable.as_str(), value.clone());
    }
    root_selection.selections = vec![Selection::Field(Node::new(field))];

    let mut document = ExecutableDocument::new();
    for name in used_fragments {
        if let Some(fragment) = fragments.get(&name) {
            document.fragments.insert(name, fragment.clone());
        }
    }
    document.operations.anonymous = Some(Node::new(executable::Operation {
        operation_type: operation.into(),
        name: None,
        variables: variable_list,
        directives: Default::default(),
        selection_set: root_selection,
    }));

    Ok(Request {
        document,
        variables,
        operation_name: None,
        operation_kind: operation,
        extensions: Object::new(),
    })
}

/// Names the variable of an explicit argument `_v{index}_{argument}`, suffixed
/// until it differs from the variables the request already carries.
fn variable_name(
    index: usize,
    argument: &str,
    taken: &IndexSet<Name>,
) -> Result<Name, DelegationError> {
    let base = format!("_v{index}_{argument}");
    let mut candidate = base.clone();
    let mut suffix = 0;
    while taken.iter().any(|name| name.as_str() == candidate) {
        suffix += 1;
        candidate = format!("{base}_{suffix}");
    }
    Name::new(&candidate).map_err(|err| DelegationError::MalformedRequest {
        reason: err.to_string(),
    })
}

/// Builds the request of a delegation driven by resolver info.
pub fn create_request_from_info(
    target_schema: &SchemaRef,
    subschema_name: &str,
    info: &ResolveInfo,
    field_name: Option<&Name>,
    args: &Object,
) -> Result<Request, DelegationError> {
    create_request(CreateRequest {
        target_schema,
        subschema_name,
        operation: info.operation_kind(),
        field_name: field_name.unwrap_or(&info.field_name),
        args,
        selection_set: None,
        field_nodes: &info.field_nodes,
        fragments: &info.fragments,
        variable_definitions: &info.operation.variables,
        variable_values: &info.variable_values,
    })
}
