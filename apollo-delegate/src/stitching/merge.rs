//! Resolution of merged types.
//!
//! Starting from the value one subschema returned for a delegated field, every
//! object of a merged type is completed with the fields its owner does not
//! expose. Missing fields are grouped by the subschema they are fetched from
//! and fetched in rounds: a group is ready once the object carries the key
//! selection of its target. Ready groups of one round run concurrently. Nested
//! objects are then resolved the same way, each owned by the subschema that
//! supplied it.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::FragmentMap;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use indexmap::IndexMap;
use indexmap::IndexSet;
use itertools::Itertools;
use tracing::debug;
use tracing::warn;

use super::MergedTypeInfo;
use super::StitchingInfo;
use crate::context::Context;
use crate::delegate::CreateRequest;
use crate::delegate::DelegationContext;
use crate::delegate::DelegationResult;
use crate::delegate::create_request;
use crate::delegate::execute_delegation;
use crate::error::DelegationError;
use crate::graphql::Error;
use crate::graphql::OperationKind;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::resolve_info::ResolveInfo;
use crate::selection::TYPENAME;
use crate::selection::collect_fields;
use crate::selection::is_abstract;
use crate::selection::is_satisfied_by;
use crate::selection::merge_selection_sets;
use crate::selection::merged_sub_selection;
use crate::selection::top_level_field_names;
use crate::subschema::MergedTypeResolution;
use crate::subschema::SubschemaId;

/// What every merge fetch below one delegated field shares.
pub(crate) struct MergeScope {
    pub(crate) stitching_info: Arc<StitchingInfo>,
    pub(crate) context: Context,
    pub(crate) info: Option<Arc<ResolveInfo>>,
    /// Fragments and variables of the caller's request, which the selected
    /// field nodes may reference.
    pub(crate) fragments: FragmentMap,
    pub(crate) variable_definitions: Vec<Node<ast::VariableDefinition>>,
    pub(crate) variable_values: Object,
    pub(crate) skip_validation: bool,
}

type Group = Vec<(Name, Vec<Node<Field>>)>;

/// Completes the merged objects of `value`, which `owner` returned for
/// `selection_set` at `path`.
pub(crate) fn resolve_merged_types(
    scope: Arc<MergeScope>,
    value: Value,
    selection_set: SelectionSet,
    owner: SubschemaId,
    path: Path,
    depth: usize,
) -> BoxFuture<'static, (Value, Vec<Error>)> {
    async move {
        match value {
            Value::Array(items) => {
                let items = items.into_iter().enumerate().map(|(index, item)| {
                    resolve_merged_types(
                        scope.clone(),
                        item,
                        selection_set.clone(),
                        owner,
                        path.index(index),
                        depth,
                    )
                });
                let mut errors = Vec::new();
                let items = join_all(items)
                    .await
                    .into_iter()
                    .map(|(item, item_errors)| {
                        errors.extend(item_errors);
                        item
                    })
                    .collect();
                (Value::Array(items), errors)
            }
            Value::Object(object) => {
                resolve_object(scope, object, selection_set, owner, path, depth).await
            }
            other => (other, Vec::new()),
        }
    }
    .boxed()
}

async fn resolve_object(
    scope: Arc<MergeScope>,
    mut object: Object,
    selection_set: SelectionSet,
    owner: SubschemaId,
    path: Path,
    depth: usize,
) -> (Value, Vec<Error>) {
    let stitching_info = scope.stitching_info.clone();
    let schema = stitching_info.schema();
    let type_name = match object.get(TYPENAME).and_then(|typename| typename.as_str()) {
        Some(typename) => typename.to_string(),
        None if !is_abstract(schema, &selection_set.ty) => selection_set.ty.to_string(),
        None => return (Value::Object(object), Vec::new()),
    };
    let fields = collect_fields(schema, &selection_set, &scope.fragments, &type_name);
    let mut errors = Vec::new();
    let mut sources = HashMap::new();

    if let Some(merged_type) = stitching_info.merged_type(&type_name) {
        let missing: IndexMap<Name, Vec<Node<Field>>> = fields
            .iter()
            .filter(|(_, nodes)| {
                nodes.first().is_some_and(|field| {
                    field.name.as_str() != TYPENAME && !merged_type.exposes(owner, &field.name)
                })
            })
            .map(|(key, nodes)| (key.clone(), nodes.clone()))
            .collect();

        if !missing.is_empty() {
            if depth >= stitching_info.configuration().type_merging.max_depth {
                for (key, _) in missing {
                    let error = DelegationError::MergeResolution {
                        type_name: type_name.clone(),
                        subschema: subschema_name(&stitching_info, owner),
                        reason: "maximum merge depth reached".to_string(),
                    };
                    errors.push(error.to_graphql_error(Some(path.key(key.as_str()))));
                    object.insert(key.as_str(), Value::Null);
                }
            } else {
                let mut merge = Merge {
                    scope: &scope,
                    merged_type,
                    object: &mut object,
                    owner,
                    path: &path,
                    depth,
                    sources: &mut sources,
                    errors: &mut errors,
                };
                merge.resolve_missing(missing).await;
            }
        }
    }

    let mut nested = Vec::new();
    for (key, nodes) in &fields {
        let Some(first) = nodes.first() else {
            continue;
        };
        if first.selection_set.selections.is_empty() {
            continue;
        }
        let Some(value) = object.get_mut(key.as_str()) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let value = std::mem::take(value);
        let child_selection = merged_sub_selection(first.definition.ty.inner_named_type(), nodes);
        let child_owner = sources.get(key).copied().unwrap_or(owner);
        let key = key.clone();
        nested.push(
            resolve_merged_types(
                scope.clone(),
                value,
                child_selection,
                child_owner,
                path.key(key.as_str()),
                depth + 1,
            )
            .map(move |resolved| (key, resolved)),
        );
    }
    for (key, (value, child_errors)) in join_all(nested).await {
        object.insert(key.as_str(), value);
        errors.extend(child_errors);
    }

    (Value::Object(object), errors)
}

fn subschema_name(stitching_info: &StitchingInfo, id: SubschemaId) -> String {
    stitching_info
        .subschema(id)
        .map(|subschema| subschema.name().to_string())
        .unwrap_or_default()
}

/// The merge of one object.
struct Merge<'a> {
    scope: &'a Arc<MergeScope>,
    merged_type: &'a MergedTypeInfo,
    object: &'a mut Object,
    owner: SubschemaId,
    path: &'a Path,
    depth: usize,
    /// Which subschema supplied each stitched key.
    sources: &'a mut HashMap<Name, SubschemaId>,
    errors: &'a mut Vec<Error>,
}

impl Merge<'_> {
    fn is_merge_target(&self, id: SubschemaId) -> bool {
        self.scope
            .stitching_info
            .subschema(id)
            .and_then(|subschema| subschema.merged_type_config(self.merged_type.type_name()))
            .is_some_and(|config| config.field_name.is_some() || config.resolve.is_some())
    }

    /// The subschema to fetch `field_name` from.
    ///
    /// Candidates whose key selection the owner can supply come first; ties go
    /// to the first registered.
    fn pick_target(&self, field_name: &str) -> Option<SubschemaId> {
        let targets: Vec<SubschemaId> = self
            .merged_type
            .candidates(field_name)
            .into_iter()
            .filter(|id| *id != self.owner && self.is_merge_target(*id))
            .collect();
        targets
            .iter()
            .copied()
            .find(|id| {
                self.merged_type
                    .key_selection_set(*id)
                    .is_none_or(|key| self.merged_type.contains_selection_set(self.owner, key))
            })
            .or_else(|| targets.first().copied())
    }

    async fn resolve_missing(&mut self, missing: IndexMap<Name, Vec<Node<Field>>>) {
        let type_name = self.merged_type.type_name().clone();
        let mut pending = missing;
        let mut round = 0;

        while !pending.is_empty() {
            round += 1;
            let mut groups: IndexMap<SubschemaId, Group> = IndexMap::new();
            for (key, nodes) in &pending {
                let Some(field) = nodes.first() else {
                    continue;
                };
                if let Some(target) = self.pick_target(&field.name) {
                    groups
                        .entry(target)
                        .or_default()
                        .push((key.clone(), nodes.clone()));
                }
            }
            let ready: Vec<(SubschemaId, Group)> = groups
                .into_iter()
                .filter(|(target, _)| {
                    self.merged_type
                        .key_selection_set(*target)
                        .is_none_or(|key| is_satisfied_by(&*self.object, key))
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            debug!(
                type_name = type_name.as_str(),
                path = %self.path,
                round,
                groups = ready.len(),
                "resolving merged type"
            );

            let fetches = ready.iter().map(|(target, group)| {
                fetch_group(
                    self.scope.clone(),
                    type_name.clone(),
                    *target,
                    self.object.clone(),
                    group.clone(),
                    self.path.clone(),
                    self.depth,
                )
            });
            let results = join_all(fetches).await;

            for ((target, group), result) in ready.into_iter().zip(results) {
                for (key, _) in &group {
                    pending.shift_remove(key);
                }
                match result {
                    Ok(result) => {
                        let reported = !result.errors.is_empty();
                        self.errors.extend(result.errors);
                        self.stitch(result.data, target, &group, reported);
                    }
                    Err(error) => {
                        self.errors
                            .push(error.to_graphql_error(Some(self.path.clone())));
                    }
                }
            }
        }

        for (key, nodes) in pending {
            self.unresolvable(&key, &nodes);
        }
    }

    fn unresolvable(&mut self, key: &Name, nodes: &[Node<Field>]) {
        let field_name = nodes
            .first()
            .map(|field| field.name.to_string())
            .unwrap_or_else(|| key.to_string());
        let error = DelegationError::UnresolvableField {
            type_name: self.merged_type.type_name().to_string(),
            field_name,
        };
        self.errors
            .push(error.to_graphql_error(Some(self.path.key(key.as_str()))));
        self.object.entry(key.as_str()).or_insert(Value::Null);
    }

    /// Stitches a fetched object into the merged one without overwriting
    /// anything: a requested key that is already present is an ownership
    /// conflict, other keys only fill gaps.
    ///
    /// Requested keys the target did not return are null, with an error unless
    /// the fetch already `reported` one.
    fn stitch(&mut self, data: Value, target: SubschemaId, group: &Group, reported: bool) {
        let fetched = match data {
            Value::Object(fetched) => fetched,
            other => {
                debug!(
                    subschema = %subschema_name(&self.scope.stitching_info, target),
                    path = %self.path,
                    data = ?other,
                    "merge fetch returned no object"
                );
                Object::new()
            }
        };
        let claimed: IndexSet<&str> = group.iter().map(|(key, _)| key.as_str()).collect();
        let stitching_info = &self.scope.stitching_info;

        for (key, value) in fetched {
            if !claimed.contains(key.as_str()) {
                if !self.object.contains_key(key.as_str()) {
                    self.object.insert(key, value);
                }
                continue;
            }
            if self.object.contains_key(key.as_str()) {
                let existing = self
                    .sources
                    .get(key.as_str())
                    .copied()
                    .unwrap_or(self.owner);
                let error = DelegationError::OwnershipConflict {
                    field_name: key.as_str().to_string(),
                    existing: subschema_name(stitching_info, existing),
                    incoming: subschema_name(stitching_info, target),
                };
                warn!(path = %self.path, "{error}");
                self.errors
                    .push(error.to_graphql_error(Some(self.path.key(key.as_str()))));
                continue;
            }
            if let Ok(name) = Name::new(key.as_str()) {
                self.sources.insert(name, target);
            }
            self.object.insert(key, value);
        }

        for (key, nodes) in group {
            if self.object.contains_key(key.as_str()) {
                continue;
            }
            if reported {
                self.object.insert(key.as_str(), Value::Null);
            } else {
                self.unresolvable(key, nodes);
            }
        }
    }
}

/// Fetches the fields of `group` for `object` from `target`.
fn fetch_group(
    scope: Arc<MergeScope>,
    type_name: Name,
    target: SubschemaId,
    object: Object,
    group: Group,
    path: Path,
    depth: usize,
) -> BoxFuture<'static, Result<DelegationResult, DelegationError>> {
    async move {
        let stitching_info = &scope.stitching_info;
        let resolution_error = |subschema: &str, reason: &str| DelegationError::MergeResolution {
            type_name: type_name.to_string(),
            subschema: subschema.to_string(),
            reason: reason.to_string(),
        };
        let Some(subschema) = stitching_info.subschema(target).cloned() else {
            return Err(resolution_error("", "subschema is not registered"));
        };
        let (Some(merged_type), Some(config)) = (
            stitching_info.merged_type(&type_name),
            subschema.merged_type_config(&type_name),
        ) else {
            return Err(resolution_error(subschema.name(), "type is not merged"));
        };

        let mut selection_set = SelectionSet::new(type_name.clone());
        for (_, nodes) in &group {
            selection_set
                .selections
                .extend(nodes.iter().cloned().map(Selection::Field));
            if let Some(required) = nodes
                .first()
                .and_then(|field| merged_type.selection_set_for(target, &field.name))
            {
                merge_selection_sets(&mut selection_set, &required);
            }
        }
        debug!(
            subschema = subschema.name(),
            type_name = type_name.as_str(),
            path = %path,
            fields = %group.iter().map(|(key, _)| key).join(", "),
            "fetching merged type fields"
        );

        if let Some(resolver) = &config.resolve {
            let mut result = resolver
                .resolve(MergedTypeResolution {
                    object,
                    context: scope.context.clone(),
                    info: scope.info.clone(),
                    subschema: subschema.clone(),
                    selection_set,
                })
                .await?;
            for error in result.errors.iter_mut() {
                if error.path.is_none() {
                    error.path = Some(path.clone());
                }
            }
            return Ok(result);
        }

        let Some(field_name) = &config.field_name else {
            return Err(resolution_error(subschema.name(), "no entry point is configured"));
        };
        let field_name = Name::new(field_name)
            .map_err(|err| resolution_error(subschema.name(), &err.to_string()))?;
        let key_fields = merged_type
            .key_selection_set(target)
            .map(|key| top_level_field_names(key))
            .unwrap_or_default();
        let args = config
            .build_args(&object, &key_fields)
            .map_err(|reason| resolution_error(subschema.name(), &reason))?;

        let request = create_request(CreateRequest {
            target_schema: subschema.transformed_schema(),
            subschema_name: subschema.name(),
            operation: OperationKind::Query,
            field_name: &field_name,
            args: &args,
            selection_set: Some(selection_set),
            field_nodes: &[],
            fragments: &scope.fragments,
            variable_definitions: &scope.variable_definitions,
            variable_values: &scope.variable_values,
        })?;
        let delegation = DelegationContext {
            target_schema: subschema.schema().clone(),
            transformed_schema: subschema.transformed_schema().clone(),
            transforms: subschema.transforms().to_vec(),
            subschema,
            operation: OperationKind::Query,
            field_name,
            args,
            context: scope.context.clone(),
            info: scope.info.clone(),
            stitching_info: Some(stitching_info.clone()),
            return_type: ast::Type::Named(type_name.clone()),
            path,
            root_value: None,
            skip_type_merging: true,
            skip_validation: scope.skip_validation,
            depth: depth + 1,
        };
        execute_delegation(delegation, request).await
    }
    .boxed()
}
