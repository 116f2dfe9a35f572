//! Composition results and the merged-type resolution engine.
//!
//! A [`StitchingInfo`] is built once per composed schema by
//! [`SubschemaRegistry::compose`](crate::registry::SubschemaRegistry::compose)
//! and shared by every delegated call as an `Arc`.

mod merge;
mod merged_type;

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable::InlineFragment;
use apollo_compiler::executable::SelectionSet;
use indexmap::IndexMap;
pub(crate) use merge::MergeScope;
pub(crate) use merge::resolve_merged_types;
pub use merged_type::MergedTypeInfo;

use crate::configuration::Configuration;
use crate::subschema::SchemaRef;
use crate::subschema::Subschema;
use crate::subschema::SubschemaId;

/// Everything the engine knows about how subschemas compose.
pub struct StitchingInfo {
    pub(crate) schema: SchemaRef,
    pub(crate) configuration: Configuration,
    pub(crate) subschemas: Vec<Arc<Subschema>>,
    pub(crate) selection_sets_by_type: IndexMap<Name, SelectionSet>,
    pub(crate) selection_sets_by_field: IndexMap<Name, IndexMap<Name, SelectionSet>>,
    pub(crate) fragments_by_field: IndexMap<Name, IndexMap<Name, Node<InlineFragment>>>,
    pub(crate) merged_types: IndexMap<Name, MergedTypeInfo>,
}

impl StitchingInfo {
    /// The composed schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Subschemas in registration order.
    pub fn subschemas(&self) -> &[Arc<Subschema>] {
        &self.subschemas
    }

    pub fn subschema(&self, id: SubschemaId) -> Option<&Arc<Subschema>> {
        self.subschemas.iter().find(|subschema| subschema.id() == id)
    }

    /// The schema a subschema exposes after its transforms.
    pub fn transformed_schema(&self, id: SubschemaId) -> Option<&SchemaRef> {
        self.subschema(id).map(|subschema| subschema.transformed_schema())
    }

    /// The union of the key selections of a merged type.
    pub fn selection_set_for_type(&self, type_name: &str) -> Option<&SelectionSet> {
        self.selection_sets_by_type.get(type_name)
    }

    /// The selection a computed field needs from its parent object.
    pub fn selection_set_for_field(&self, type_name: &str, field_name: &str) -> Option<&SelectionSet> {
        self.selection_sets_by_field
            .get(type_name)
            .and_then(|fields| fields.get(field_name))
    }

    /// [`Self::selection_set_for_field`] as an inline fragment on the parent type.
    pub fn fragment_for_field(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&Node<InlineFragment>> {
        self.fragments_by_field
            .get(type_name)
            .and_then(|fields| fields.get(field_name))
    }

    pub fn merged_types(&self) -> &IndexMap<Name, MergedTypeInfo> {
        &self.merged_types
    }

    pub fn merged_type(&self, type_name: &str) -> Option<&MergedTypeInfo> {
        self.merged_types.get(type_name)
    }

    pub fn is_merged_type(&self, type_name: &str) -> bool {
        self.merged_types.contains_key(type_name)
    }
}

impl fmt::Debug for StitchingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StitchingInfo")
            .field("subschemas", &self.subschemas)
            .field(
                "merged_types",
                &self.merged_types.keys().collect::<Vec<_>>(),
            )
            .field("configuration", &self.configuration)
            .finish()
    }
}
