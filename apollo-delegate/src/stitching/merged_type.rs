use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::executable::SelectionSet;
use dashmap::DashMap;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::selection::top_level_field_names;
use crate::subschema::SubschemaId;

/// How the fields of one merged type are spread across subschemas.
///
/// Computed at composition and read-only afterwards, except for the memo of
/// [`MergedTypeInfo::contains_selection_set`].
pub struct MergedTypeInfo {
    pub(crate) type_name: Name,
    /// Subschemas exposing the type, in registration order.
    pub(crate) subschemas: Vec<SubschemaId>,
    pub(crate) unique_fields: IndexMap<Name, SubschemaId>,
    pub(crate) non_unique_fields: IndexMap<Name, Vec<SubschemaId>>,
    pub(crate) type_maps: IndexMap<SubschemaId, IndexSet<Name>>,
    /// Key selections of the subschemas the type can be re-fetched from.
    pub(crate) selection_sets: IndexMap<SubschemaId, Arc<SelectionSet>>,
    pub(crate) field_selection_sets: IndexMap<(SubschemaId, Name), Arc<SelectionSet>>,
    pub(crate) contains: DashMap<(SubschemaId, SelectionSet), bool>,
}

impl MergedTypeInfo {
    pub fn type_name(&self) -> &Name {
        &self.type_name
    }

    pub fn subschemas(&self) -> &[SubschemaId] {
        &self.subschemas
    }

    /// Fields exactly one subschema resolves.
    pub fn unique_fields(&self) -> &IndexMap<Name, SubschemaId> {
        &self.unique_fields
    }

    /// Fields several subschemas resolve, with their candidates in registration order.
    pub fn non_unique_fields(&self) -> &IndexMap<Name, Vec<SubschemaId>> {
        &self.non_unique_fields
    }

    /// The fields of the type a subschema exposes.
    pub fn type_map(&self, subschema: SubschemaId) -> Option<&IndexSet<Name>> {
        self.type_maps.get(&subschema)
    }

    pub fn exposes(&self, subschema: SubschemaId, field_name: &str) -> bool {
        self.type_map(subschema)
            .is_some_and(|fields| fields.contains(field_name))
    }

    /// The selection an object needs before it can be re-fetched from `subschema`.
    pub fn key_selection_set(&self, subschema: SubschemaId) -> Option<&Arc<SelectionSet>> {
        self.selection_sets.get(&subschema)
    }

    /// Subschemas able to resolve `field_name`, in registration order.
    pub fn candidates(&self, field_name: &str) -> Vec<SubschemaId> {
        if let Some(owner) = self.unique_fields.get(field_name) {
            return vec![*owner];
        }
        self.non_unique_fields
            .get(field_name)
            .cloned()
            .unwrap_or_default()
    }

    /// The selection needed to fetch `field_name` from `subschema`: its key
    /// selection plus what the field needs when it is computed.
    ///
    /// Repeated calls return the same shared selection.
    pub fn selection_set_for(
        &self,
        subschema: SubschemaId,
        field_name: &str,
    ) -> Option<Arc<SelectionSet>> {
        let field_name = Name::new(field_name).ok()?;
        self.field_selection_sets
            .get(&(subschema, field_name))
            .cloned()
    }

    /// Returns true if `subschema` exposes every top-level field of `selection_set`.
    pub fn contains_selection_set(
        &self,
        subschema: SubschemaId,
        selection_set: &SelectionSet,
    ) -> bool {
        // selection nodes cache their hash, so the key is cheap to build
        let key = (subschema, selection_set.clone());
        if let Some(contains) = self.contains.get(&key) {
            return *contains;
        }
        let contains = top_level_field_names(selection_set)
            .iter()
            .all(|field| field.as_str() == "__typename" || self.exposes(subschema, field));
        self.contains.insert(key, contains);
        contains
    }
}

impl fmt::Debug for MergedTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedTypeInfo")
            .field("type_name", &self.type_name)
            .field("subschemas", &self.subschemas)
            .field("unique_fields", &self.unique_fields)
            .field("non_unique_fields", &self.non_unique_fields)
            .finish()
    }
}
