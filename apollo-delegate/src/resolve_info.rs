//! Resolver info for fields of the composed schema.

use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::FragmentMap;
use apollo_compiler::executable::Operation;
use apollo_compiler::validation::Valid;

use crate::error::DelegationError;
use crate::graphql::OperationKind;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::value_from_ast;
use crate::selection::collect_fields;

/// What a field resolver knows about the field it is resolving.
#[derive(Clone, Debug)]
pub struct ResolveInfo {
    /// The composed schema.
    pub schema: Arc<Valid<Schema>>,
    /// The type the field is defined on.
    pub parent_type: Name,
    pub field_name: Name,
    /// Every node of the request that selects this field under one response key.
    pub field_nodes: Vec<Node<Field>>,
    pub return_type: ast::Type,
    /// Where the field lives in the response.
    pub path: Path,
    pub fragments: FragmentMap,
    pub operation: Node<Operation>,
    pub variable_values: Object,
}

impl ResolveInfo {
    /// Builds the info of the root field selected under `response_key` by an
    /// operation of `document`.
    pub fn for_root_field(
        schema: Arc<Valid<Schema>>,
        document: &Valid<ExecutableDocument>,
        operation_name: Option<&str>,
        response_key: &str,
        variable_values: Object,
    ) -> Result<Self, DelegationError> {
        let operation = document
            .operations
            .get(operation_name)
            .map_err(|err| DelegationError::MalformedRequest {
                reason: err.message().to_string(),
            })?
            .clone();
        let parent_type = operation.selection_set.ty.clone();
        let field_nodes = collect_fields(
            &schema,
            &operation.selection_set,
            &document.fragments,
            &parent_type,
        )
        .shift_remove(response_key)
        .unwrap_or_default();
        let Some(first) = field_nodes.first() else {
            return Err(DelegationError::MalformedRequest {
                reason: format!("operation does not select '{response_key}'"),
            });
        };

        Ok(Self {
            field_name: first.name.clone(),
            return_type: first.definition.ty.clone(),
            path: Path::empty().key(response_key),
            parent_type,
            fragments: document.fragments.clone(),
            operation,
            variable_values,
            field_nodes,
            schema,
        })
    }

    pub fn operation_kind(&self) -> OperationKind {
        self.operation.operation_type.into()
    }

    /// The response key the field is selected under.
    pub fn response_key(&self) -> &Name {
        self.field_nodes
            .first()
            .map(|field| field.response_key())
            .unwrap_or(&self.field_name)
    }

    /// The arguments of the field with variables substituted and defaults applied.
    pub fn arguments(&self) -> Object {
        let mut arguments = Object::new();
        let Some(field) = self.field_nodes.first() else {
            return arguments;
        };
        for definition in &field.definition.arguments {
            let value = field
                .arguments
                .iter()
                .find(|argument| argument.name == definition.name)
                .map(|argument| value_from_ast(&argument.value, &self.variable_values))
                .or_else(|| {
                    definition
                        .default_value
                        .as_ref()
                        .map(|default| value_from_ast(default, &self.variable_values))
                });
            if let Some(value) = value {
                arguments.insert(definition.name.as_str(), value);
            }
        }
        arguments
    }
}
