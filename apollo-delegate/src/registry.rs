//! The subschema registry.
//!
//! Subschemas are registered one at a time, then composed against the composed
//! schema into a [`StitchingInfo`]. Composition checks every merge
//! configuration and classifies the fields of each merged type; any problem is
//! fatal.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast::OperationType;
use apollo_compiler::executable::FieldSet;
use apollo_compiler::executable::InlineFragment;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::schema::ExtendedType;
use dashmap::DashMap;
use indexmap::IndexMap;
use indexmap::IndexSet;
use tracing::debug;

use crate::configuration::Configuration;
use crate::error::CompositionError;
use crate::selection::merge_selection_sets;
use crate::stitching::MergedTypeInfo;
use crate::stitching::StitchingInfo;
use crate::subschema::MergedTypeConfig;
use crate::subschema::SchemaOrSubschema;
use crate::subschema::SchemaRef;
use crate::subschema::Subschema;
use crate::subschema::SubschemaId;

/// Holds the subschemas of one composed schema, in registration order.
#[derive(Debug, Default)]
pub struct SubschemaRegistry {
    configuration: Configuration,
    subschemas: Vec<Arc<Subschema>>,
}

impl SubschemaRegistry {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            subschemas: Vec::new(),
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Registers a subschema configuration or a bare schema.
    pub fn register(
        &mut self,
        source: impl Into<SchemaOrSubschema>,
    ) -> Result<Arc<Subschema>, CompositionError> {
        let id = SubschemaId(self.subschemas.len());
        let subschema = Subschema::canonicalize(id, source.into())?;
        if self.get(subschema.name()).is_some() {
            return Err(CompositionError::DuplicateSubschema {
                name: subschema.name().to_string(),
            });
        }
        let subschema = Arc::new(subschema);
        debug!(
            subschema = subschema.name(),
            merged_types = subschema.merge().len(),
            transforms = subschema.transforms().len(),
            "registered subschema"
        );
        self.subschemas.push(subschema.clone());
        Ok(subschema)
    }

    pub fn subschemas(&self) -> &[Arc<Subschema>] {
        &self.subschemas
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Subschema>> {
        self.subschemas
            .iter()
            .find(|subschema| subschema.name() == name)
    }

    /// Subschemas able to resolve `type_name.field_name`, in registration order.
    pub fn lookup(&self, type_name: &str, field_name: &str) -> Vec<Arc<Subschema>> {
        self.subschemas
            .iter()
            .filter(|subschema| {
                subschema
                    .transformed_schema()
                    .type_field(type_name, field_name)
                    .is_ok()
            })
            .cloned()
            .collect()
    }

    /// Composes the registered subschemas into the stitching info of `schema`.
    pub fn compose(&self, schema: SchemaRef) -> Result<Arc<StitchingInfo>, CompositionError> {
        for subschema in &self.subschemas {
            for (type_name, config) in subschema.merge() {
                check_merge_config(&schema, subschema, type_name, config)?;
            }
        }

        let mut merged_type_names: IndexSet<Name> = IndexSet::new();
        for subschema in &self.subschemas {
            merged_type_names.extend(subschema.merge().keys().cloned());
        }

        let mut selection_sets_by_type = IndexMap::new();
        let mut selection_sets_by_field = IndexMap::new();
        let mut fragments_by_field = IndexMap::new();
        let mut merged_types = IndexMap::new();

        for type_name in merged_type_names {
            let computed = computed_selection_sets(&schema, &self.subschemas, &type_name)?;
            let merged_type = self.merged_type_info(&schema, &type_name, &computed)?;

            let mut union = SelectionSet::new(type_name.clone());
            for key in merged_type.selection_sets.values() {
                merge_selection_sets(&mut union, key);
            }
            if !union.selections.is_empty() {
                selection_sets_by_type.insert(type_name.clone(), union);
            }
            if !computed.is_empty() {
                fragments_by_field.insert(
                    type_name.clone(),
                    computed
                        .iter()
                        .map(|(field, selection_set)| {
                            let fragment = InlineFragment {
                                type_condition: Some(type_name.clone()),
                                directives: Default::default(),
                                selection_set: selection_set.clone(),
                            };
                            (field.clone(), Node::new(fragment))
                        })
                        .collect::<IndexMap<_, _>>(),
                );
                selection_sets_by_field.insert(type_name.clone(), computed);
            }
            debug!(
                type_name = type_name.as_str(),
                subschemas = merged_type.subschemas.len(),
                unique_fields = merged_type.unique_fields.len(),
                non_unique_fields = merged_type.non_unique_fields.len(),
                "composed merged type"
            );
            merged_types.insert(type_name, merged_type);
        }

        Ok(Arc::new(StitchingInfo {
            schema,
            configuration: self.configuration.clone(),
            subschemas: self.subschemas.clone(),
            selection_sets_by_type,
            selection_sets_by_field,
            fragments_by_field,
            merged_types,
        }))
    }

    fn merged_type_info(
        &self,
        schema: &SchemaRef,
        type_name: &Name,
        computed: &IndexMap<Name, SelectionSet>,
    ) -> Result<MergedTypeInfo, CompositionError> {
        let Some(ExtendedType::Object(composed)) = schema.types.get(type_name) else {
            return Err(CompositionError::UnresolvedMergeConfig {
                type_name: type_name.to_string(),
                subschema: String::new(),
                reason: "type is not an object type of the composed schema".to_string(),
            });
        };

        let mut subschemas = Vec::new();
        let mut type_maps = IndexMap::new();
        let mut selection_sets = IndexMap::new();
        for subschema in &self.subschemas {
            let Some(ExtendedType::Object(object)) =
                subschema.transformed_schema().types.get(type_name)
            else {
                continue;
            };
            subschemas.push(subschema.id());
            type_maps.insert(
                subschema.id(),
                object.fields.keys().cloned().collect::<IndexSet<_>>(),
            );
            if let Some(source) = subschema
                .merged_type_config(type_name)
                .and_then(|config| config.selection_set.as_deref())
            {
                let key = parse_selection_set(schema, type_name, subschema.name(), source)?;
                selection_sets.insert(subschema.id(), Arc::new(key));
            }
        }

        let mut declared: IndexMap<Name, &Subschema> = IndexMap::new();
        for subschema in &self.subschemas {
            let Some(config) = subschema.merged_type_config(type_name) else {
                continue;
            };
            for field in &config.owned_fields {
                let field = parse_name(field, type_name, subschema.name())?;
                if let Some(first) = declared.get(&field) {
                    return Err(CompositionError::AmbiguousOwnership {
                        type_name: type_name.to_string(),
                        field_name: field.to_string(),
                        first: first.name().to_string(),
                        second: subschema.name().to_string(),
                    });
                }
                declared.insert(field, subschema.as_ref());
            }
        }

        let mut unique_fields = IndexMap::new();
        let mut non_unique_fields = IndexMap::new();
        for field in composed.fields.keys() {
            if let Some(owner) = declared.get(field) {
                unique_fields.insert(field.clone(), owner.id());
                continue;
            }
            let providers: Vec<SubschemaId> = type_maps
                .iter()
                .filter(|(_, fields)| fields.contains(field))
                .map(|(id, _)| *id)
                .collect();
            match providers.as_slice() {
                [] => {
                    return Err(CompositionError::UnresolvedField {
                        type_name: type_name.to_string(),
                        field_name: field.to_string(),
                    });
                }
                [owner] => {
                    unique_fields.insert(field.clone(), *owner);
                }
                _ => {
                    non_unique_fields.insert(field.clone(), providers);
                }
            }
        }

        let mut field_selection_sets = IndexMap::new();
        for (id, fields) in &type_maps {
            for field in fields {
                let mut selection_set = SelectionSet::new(type_name.clone());
                if let Some(key) = selection_sets.get(id) {
                    merge_selection_sets(&mut selection_set, key);
                }
                if let Some(required) = computed.get(field) {
                    merge_selection_sets(&mut selection_set, required);
                }
                field_selection_sets.insert((*id, field.clone()), Arc::new(selection_set));
            }
        }

        Ok(MergedTypeInfo {
            type_name: type_name.clone(),
            subschemas,
            unique_fields,
            non_unique_fields,
            type_maps,
            selection_sets,
            field_selection_sets,
            contains: DashMap::new(),
        })
    }
}

fn parse_name(name: &str, type_name: &Name, subschema: &str) -> Result<Name, CompositionError> {
    Name::new(name).map_err(|err| CompositionError::UnresolvedMergeConfig {
        type_name: type_name.to_string(),
        subschema: subschema.to_string(),
        reason: err.to_string(),
    })
}

/// Parses a selection such as `{ id }` on `type_name` of the composed schema.
fn parse_selection_set(
    schema: &SchemaRef,
    type_name: &Name,
    subschema: &str,
    source: &str,
) -> Result<SelectionSet, CompositionError> {
    let trimmed = source.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed);
    FieldSet::parse_and_validate(schema, type_name.clone(), inner, "selection_set.graphql")
        .map(|field_set| field_set.into_inner().selection_set)
        .map_err(|errors| CompositionError::InvalidSelectionSet {
            type_name: type_name.to_string(),
            subschema: subschema.to_string(),
            reason: errors.errors.to_string(),
        })
}

/// The selections computed fields of `type_name` need, merged across subschemas.
fn computed_selection_sets(
    schema: &SchemaRef,
    subschemas: &[Arc<Subschema>],
    type_name: &Name,
) -> Result<IndexMap<Name, SelectionSet>, CompositionError> {
    let mut computed: IndexMap<Name, SelectionSet> = IndexMap::new();
    for subschema in subschemas {
        let Some(config) = subschema.merged_type_config(type_name) else {
            continue;
        };
        for (field, source) in &config.computed_fields {
            let field = parse_name(field, type_name, subschema.name())?;
            let selection_set = parse_selection_set(schema, type_name, subschema.name(), source)?;
            merge_selection_sets(
                computed
                    .entry(field)
                    .or_insert_with(|| SelectionSet::new(type_name.clone())),
                &selection_set,
            );
        }
    }
    Ok(computed)
}

fn check_merge_config(
    schema: &SchemaRef,
    subschema: &Subschema,
    type_name: &Name,
    config: &MergedTypeConfig,
) -> Result<(), CompositionError> {
    let unresolved = |reason: String| CompositionError::UnresolvedMergeConfig {
        type_name: type_name.to_string(),
        subschema: subschema.name().to_string(),
        reason,
    };
    let transformed = subschema.transformed_schema();
    let Some(ExtendedType::Object(object)) = transformed.types.get(type_name) else {
        return Err(unresolved(
            "type is not an object type of the subschema".to_string(),
        ));
    };
    if !matches!(schema.types.get(type_name), Some(ExtendedType::Object(_))) {
        return Err(unresolved(
            "type is not an object type of the composed schema".to_string(),
        ));
    }
    if let Some(field_name) = &config.field_name {
        let entry_point = transformed
            .root_operation(OperationType::Query)
            .and_then(|query| transformed.type_field(query, field_name).ok());
        if entry_point.is_none() {
            return Err(unresolved(format!(
                "entry point '{field_name}' is not a query field"
            )));
        }
    }
    for field in &config.owned_fields {
        if !object.fields.contains_key(field.as_str()) {
            return Err(unresolved(format!("declared field '{field}' is not exposed")));
        }
    }
    for field in config.computed_fields.keys() {
        if schema.type_field(type_name, field).is_err() {
            return Err(unresolved(format!(
                "computed field '{field}' is not part of the composed type"
            )));
        }
    }
    if let Some(source) = &config.selection_set {
        parse_selection_set(schema, type_name, subschema.name(), source)?;
    }
    Ok(())
}
