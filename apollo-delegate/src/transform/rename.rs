use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::executable::FragmentMap;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::schema::ExtendedType;

use super::Capability;
use super::Transform;
use super::TransformationContext;
use crate::delegate::DelegationContext;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Value;
use crate::subschema::SchemaRef;

#[derive(Clone, Debug, PartialEq, Eq)]
struct FieldRename {
    type_name: Name,
    /// Name in the subschema.
    from: Name,
    /// Name exposed to callers.
    to: Name,
}

/// Exposes object fields of a subschema under new names.
///
/// The schema hook renames the field definitions, the request hook maps the
/// exposed names back to the subschema's and the result hook restores the
/// exposed names in the response data.
#[derive(Clone, Debug)]
pub struct RenameObjectFields {
    renames: Vec<FieldRename>,
}

/// Response paths renamed by one request, in subschema keys.
#[derive(Clone, Debug, Default)]
struct RenamedPaths(Vec<RenamedPath>);

#[derive(Clone, Debug)]
struct RenamedPath {
    parent: Vec<String>,
    from: Name,
    to: Name,
}

fn name(name: &str) -> Result<Name, TransformError> {
    Name::new(name).map_err(|err| TransformError::InvalidName(err.to_string()))
}

impl RenameObjectFields {
    /// Exposes `type_name.from` as `type_name.to`.
    pub fn new(type_name: &str, from: &str, to: &str) -> Result<Self, TransformError> {
        Self { renames: Vec::new() }.with_rename(type_name, from, to)
    }

    pub fn with_rename(mut self, type_name: &str, from: &str, to: &str) -> Result<Self, TransformError> {
        self.renames.push(FieldRename {
            type_name: name(type_name)?,
            from: name(from)?,
            to: name(to)?,
        });
        Ok(self)
    }

    fn exposed(&self, type_name: &str, field_name: &str) -> Option<&FieldRename> {
        self.renames
            .iter()
            .find(|rename| rename.type_name.as_str() == type_name && rename.to.as_str() == field_name)
    }

    fn record(
        &self,
        selection_set: &SelectionSet,
        fragments: &FragmentMap,
        parent: &[String],
        visiting: &mut Vec<Name>,
        recorded: &mut Vec<RenamedPath>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let rename = self.exposed(&selection_set.ty, &field.name);
                    let key = match (&field.alias, rename) {
                        (Some(alias), _) => alias.clone(),
                        (None, Some(rename)) => {
                            recorded.push(RenamedPath {
                                parent: parent.to_vec(),
                                from: rename.from.clone(),
                                to: rename.to.clone(),
                            });
                            rename.from.clone()
                        }
                        (None, None) => field.name.clone(),
                    };
                    if !field.selection_set.selections.is_empty() {
                        let mut path = parent.to_vec();
                        path.push(key.to_string());
                        self.record(&field.selection_set, fragments, &path, visiting, recorded);
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.record(&inline.selection_set, fragments, parent, visiting, recorded)
                }
                Selection::FragmentSpread(spread) => {
                    if visiting.contains(&spread.fragment_name) {
                        continue;
                    }
                    if let Some(fragment) = fragments.get(&spread.fragment_name) {
                        visiting.push(spread.fragment_name.clone());
                        self.record(&fragment.selection_set, fragments, parent, visiting, recorded);
                        visiting.pop();
                    }
                }
            }
        }
    }

    fn rename_selections(&self, selection_set: &mut SelectionSet) {
        let type_name = selection_set.ty.clone();
        for selection in selection_set.selections.iter_mut() {
            match selection {
                Selection::Field(field) => {
                    let rename = self.exposed(&type_name, &field.name).cloned();
                    let field = field.make_mut();
                    if let Some(rename) = rename {
                        field.name = rename.from;
                    }
                    self.rename_selections(&mut field.selection_set);
                }
                Selection::InlineFragment(inline) => {
                    self.rename_selections(&mut inline.make_mut().selection_set)
                }
                Selection::FragmentSpread(_) => {}
            }
        }
    }
}

fn rename_at(value: &mut Value, parent: &[String], from: &str, to: &str) {
    match value {
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| rename_at(item, parent, from, to)),
        Value::Object(object) => match parent.split_first() {
            None => {
                if let Some(renamed) = object.remove(from) {
                    object.insert(to, renamed);
                }
            }
            Some((key, rest)) => {
                if let Some(child) = object.get_mut(key.as_str()) {
                    rename_at(child, rest, from, to);
                }
            }
        },
        _ => {}
    }
}

impl Transform for RenameObjectFields {
    fn name(&self) -> &str {
        "RenameObjectFields"
    }

    fn capabilities(&self) -> &[Capability] {
        &[
            Capability::SchemaRewrite,
            Capability::RequestRewrite,
            Capability::ResultRewrite,
        ]
    }

    fn transform_schema(&self, schema: SchemaRef) -> Result<SchemaRef, TransformError> {
        let mut schema = (*schema).clone().into_inner();
        for rename in &self.renames {
            let Some(ExtendedType::Object(object)) = schema.types.get_mut(&rename.type_name) else {
                return Err(TransformError::new(format!(
                    "type '{}' is not an object type",
                    rename.type_name
                )));
            };
            let object = object.make_mut();
            let Some(mut field) = object.fields.shift_remove(&rename.from) else {
                return Err(TransformError::new(format!(
                    "field '{}.{}' does not exist",
                    rename.type_name, rename.from
                )));
            };
            field.node.make_mut().name = rename.to.clone();
            object.fields.insert(rename.to.clone(), field);
        }
        Ok(Arc::new(schema.validate()?))
    }

    fn transform_request(
        &self,
        mut request: Request,
        context: &mut TransformationContext,
        _delegation: &DelegationContext,
    ) -> Result<Request, TransformError> {
        let mut recorded = Vec::new();
        let document = &request.document;
        for operation in document
            .operations
            .anonymous
            .iter()
            .chain(document.operations.named.values())
        {
            self.record(
                &operation.selection_set,
                &document.fragments,
                &[],
                &mut Vec::new(),
                &mut recorded,
            );
        }
        // deepest first, so parent keys are still the subschema's when children are renamed
        recorded.sort_by_key(|path| std::cmp::Reverse(path.parent.len()));
        context.insert(RenamedPaths(recorded));

        for operation in request.operations_mut() {
            self.rename_selections(&mut operation.make_mut().selection_set);
        }
        for fragment in request.document.fragments.values_mut() {
            self.rename_selections(&mut fragment.make_mut().selection_set);
        }
        Ok(request)
    }

    fn transform_result(
        &self,
        mut response: Response,
        context: &mut TransformationContext,
        _delegation: &DelegationContext,
    ) -> Result<Response, TransformError> {
        // kept for the whole call, a subscription yields several results
        let Some(RenamedPaths(paths)) = context.get::<RenamedPaths>() else {
            return Ok(response);
        };
        if let Some(data) = response.data.as_mut() {
            for path in paths {
                rename_at(data, &path.parent, &path.from, &path.to);
            }
        }
        Ok(response)
    }
}
