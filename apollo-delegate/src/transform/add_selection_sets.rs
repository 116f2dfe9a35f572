use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::executable::InlineFragment;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;

use super::Capability;
use super::Transform;
use super::TransformationContext;
use crate::delegate::DelegationContext;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::selection::add_typename;
use crate::selection::is_abstract;
use crate::selection::merge_selection_sets;
use crate::selection::type_condition_applies;
use crate::stitching::StitchingInfo;

/// Adds what the merge engine needs to the outgoing request: the key
/// selections of merged types, the selections of computed fields and
/// `__typename` wherever a concrete type has to be known.
#[derive(Clone, Debug)]
pub struct AddSelectionSets {
    stitching_info: Arc<StitchingInfo>,
}

impl AddSelectionSets {
    pub fn new(stitching_info: Arc<StitchingInfo>) -> Self {
        Self { stitching_info }
    }

    fn visit(&self, selection_set: &mut SelectionSet) {
        let info = &self.stitching_info;
        let schema = info.schema();
        let type_name = selection_set.ty.clone();

        for selection in selection_set.selections.iter_mut() {
            match selection {
                Selection::Field(field) => {
                    if !field.selection_set.selections.is_empty() {
                        self.visit(&mut field.make_mut().selection_set);
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.visit(&mut inline.make_mut().selection_set);
                }
                Selection::FragmentSpread(_) => {}
            }
        }

        if info.is_merged_type(&type_name) {
            if let Some(key) = info.selection_set_for_type(&type_name) {
                merge_selection_sets(selection_set, key);
            }
            let computed: Vec<_> = selection_set
                .selections
                .iter()
                .filter_map(|selection| selection.as_field())
                .filter_map(|field| info.fragment_for_field(&type_name, &field.name))
                .cloned()
                .collect();
            for fragment in computed {
                merge_selection_sets(
                    selection_set,
                    &SelectionSet {
                        ty: type_name.clone(),
                        selections: vec![Selection::InlineFragment(fragment)],
                    },
                );
            }
            add_typename(schema, selection_set);
        } else if is_abstract(schema, &type_name) {
            for (merged_type, _) in info.merged_types() {
                if !type_condition_applies(schema, merged_type, &type_name) {
                    continue;
                }
                let Some(key) = info.selection_set_for_type(merged_type) else {
                    continue;
                };
                let fragment = InlineFragment {
                    type_condition: Some(merged_type.clone()),
                    directives: Default::default(),
                    selection_set: key.clone(),
                };
                merge_selection_sets(
                    selection_set,
                    &SelectionSet {
                        ty: type_name.clone(),
                        selections: vec![Selection::InlineFragment(Node::new(fragment))],
                    },
                );
            }
            add_typename(schema, selection_set);
        }
    }
}

impl Transform for AddSelectionSets {
    fn name(&self) -> &str {
        "AddSelectionSets"
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
        for operation in request.operations_mut() {
            let operation = operation.make_mut();
            for selection in operation.selection_set.selections.iter_mut() {
                if let Selection::Field(field) = selection {
                    if !field.selection_set.selections.is_empty() {
                        self.visit(&mut field.make_mut().selection_set);
                    }
                }
            }
        }
        for fragment in request.document.fragments.values_mut() {
            self.visit(&mut fragment.make_mut().selection_set);
        }
        Ok(request)
    }
}
