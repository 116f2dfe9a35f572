use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::FragmentMap;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use indexmap::IndexSet;
use tracing::trace;

use super::Capability;
use super::Transform;
use super::TransformationContext;
use crate::delegate::DelegationContext;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::selection::TYPENAME;
use crate::selection::add_typename;
use crate::selection::referenced_fragments;
use crate::selection::referenced_variables;
use crate::subschema::SchemaRef;

/// Removes everything the target schema does not know from the outgoing
/// request: fields, arguments, fragments and the variables only they used.
///
/// A composite field whose whole sub-selection was removed keeps `__typename`
/// so the request stays valid.
#[derive(Clone, Debug)]
pub struct FilterToSchema {
    schema: SchemaRef,
}

impl FilterToSchema {
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema }
    }
}

fn filter_selection_set(
    schema: &Schema,
    selection_set: &mut SelectionSet,
    known_fragments: &IndexSet<Name>,
) {
    let type_name = selection_set.ty.clone();
    selection_set.selections.retain_mut(|selection| match selection {
        Selection::Field(field) => {
            if field.name.as_str() == TYPENAME {
                return true;
            }
            let Ok(definition) = schema.type_field(&type_name, &field.name) else {
                trace!(
                    type_name = type_name.as_str(),
                    field = field.name.as_str(),
                    "removing field unknown to the target schema"
                );
                return false;
            };
            let field = field.make_mut();
            field
                .arguments
                .retain(|argument| definition.argument_by_name(&argument.name).is_some());
            if !field.selection_set.selections.is_empty() {
                field.selection_set.ty = definition.ty.inner_named_type().clone();
                filter_selection_set(schema, &mut field.selection_set, known_fragments);
                if field.selection_set.selections.is_empty() {
                    add_typename(schema, &mut field.selection_set);
                }
            }
            true
        }
        Selection::InlineFragment(inline) => {
            if let Some(condition) = &inline.type_condition {
                if !schema.types.contains_key(condition) {
                    return false;
                }
            }
            let inline = inline.make_mut();
            if let Some(condition) = &inline.type_condition {
                inline.selection_set.ty = condition.clone();
            } else {
                inline.selection_set.ty = type_name.clone();
            }
            filter_selection_set(schema, &mut inline.selection_set, known_fragments);
            !inline.selection_set.selections.is_empty()
        }
        Selection::FragmentSpread(spread) => known_fragments.contains(&spread.fragment_name),
    });
}

fn retain_known_fragments(schema: &Schema, fragments: &mut FragmentMap) -> IndexSet<Name> {
    fragments.retain(|_, fragment| schema.types.contains_key(fragment.type_condition()));
    fragments.keys().cloned().collect()
}

impl Transform for FilterToSchema {
    fn name(&self) -> &str {
        "FilterToSchema"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::RequestRewrite]
    }

    fn transform_request(
        &self,
        mut request: Request,
        _context: &mut TransformationContext,
        _delegation: &DelegationContext,
    ) -> Result<Request, TransformError> {
        let schema = &self.schema;
        let known_fragments = retain_known_fragments(schema, &mut request.document.fragments);

        for fragment in request.document.fragments.values_mut() {
            let fragment = fragment.make_mut();
            filter_selection_set(schema, &mut fragment.selection_set, &known_fragments);
            if fragment.selection_set.selections.is_empty() {
                add_typename(schema, &mut fragment.selection_set);
            }
        }

        for operation in request.operations_mut() {
            let operation = operation.make_mut();
            if let Some(root) = schema.root_operation(operation.operation_type) {
                operation.selection_set.ty = root.clone();
            }
            filter_selection_set(schema, &mut operation.selection_set, &known_fragments);
        }

        let document = &request.document;
        let mut used_fragments = IndexSet::new();
        let mut used_variables = IndexSet::new();
        for operation in document
            .operations
            .anonymous
            .iter()
            .chain(document.operations.named.values())
        {
            used_fragments.extend(referenced_fragments(
                &operation.selection_set,
                &document.fragments,
            ));
            used_variables.extend(referenced_variables(
                &operation.selection_set,
                &document.fragments,
            ));
        }

        request
            .document
            .fragments
            .retain(|name, _| used_fragments.contains(name));
        for operation in request.operations_mut() {
            operation
                .make_mut()
                .variables
                .retain(|variable| used_variables.contains(&variable.name));
        }
        request.variables = std::mem::take(&mut request.variables)
            .into_iter()
            .filter(|(name, _)| used_variables.contains(name.as_str()))
            .collect();
        Ok(request)
    }
}
