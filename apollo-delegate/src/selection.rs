//! Selection-set utilities: merging, field collection, reference tracking and
//! projecting JSON values onto selections.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::FragmentMap;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::schema::ExtendedType;
use indexmap::IndexMap;
use indexmap::IndexSet;
use serde_json_bytes::ByteString;
use serde_json_bytes::Entry;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

pub(crate) const TYPENAME: &str = "__typename";

/// Returns true if a fragment with `type_condition` applies to an object of
/// concrete type `object_type`.
pub(crate) fn type_condition_applies(
    schema: &Schema,
    object_type: &str,
    type_condition: &str,
) -> bool {
    if object_type == type_condition {
        return true;
    }
    let implements = |interface: &str| match schema.types.get(object_type) {
        Some(ExtendedType::Object(object)) => object
            .implements_interfaces
            .iter()
            .any(|implemented| implemented.name.as_str() == interface),
        Some(ExtendedType::Interface(object)) => object
            .implements_interfaces
            .iter()
            .any(|implemented| implemented.name.as_str() == interface),
        _ => false,
    };
    match schema.types.get(type_condition) {
        Some(ExtendedType::Interface(_)) => implements(type_condition),
        Some(ExtendedType::Union(union_type)) => union_type
            .members
            .iter()
            .any(|member| member.name.as_str() == object_type),
        _ => false,
    }
}

/// Returns true if `type_name` is an interface or a union in `schema`.
pub(crate) fn is_abstract(schema: &Schema, type_name: &str) -> bool {
    matches!(
        schema.types.get(type_name),
        Some(ExtendedType::Interface(_) | ExtendedType::Union(_))
    )
}

/// Collects the fields that `selection_set` requests on an object of type
/// `object_type`, grouped by response key.
///
/// Inline fragments and fragment spreads are flattened when their type
/// condition applies. `@skip`/`@include` are not evaluated.
pub(crate) fn collect_fields(
    schema: &Schema,
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
    object_type: &str,
) -> IndexMap<Name, Vec<Node<Field>>> {
    let mut fields = IndexMap::new();
    collect_fields_into(schema, selection_set, fragments, object_type, &mut fields);
    fields
}

fn collect_fields_into(
    schema: &Schema,
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
    object_type: &str,
    fields: &mut IndexMap<Name, Vec<Node<Field>>>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => fields
                .entry(field.response_key().clone())
                .or_insert_with(Vec::new)
                .push(field.clone()),
            Selection::InlineFragment(inline) => {
                let applies = inline
                    .type_condition
                    .as_ref()
                    .is_none_or(|condition| type_condition_applies(schema, object_type, condition));
                if applies {
                    collect_fields_into(schema, &inline.selection_set, fragments, object_type, fields);
                }
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = fragments.get(&spread.fragment_name) {
                    if type_condition_applies(schema, object_type, fragment.type_condition()) {
                        collect_fields_into(
                            schema,
                            &fragment.selection_set,
                            fragments,
                            object_type,
                            fields,
                        );
                    }
                }
            }
        }
    }
}

/// Builds a selection set of type `ty` that merges the sub-selections of `fields`.
pub(crate) fn merged_sub_selection(ty: &Name, fields: &[Node<Field>]) -> SelectionSet {
    let mut selection_set = SelectionSet::new(ty.clone());
    for field in fields {
        merge_selection_sets(&mut selection_set, &field.selection_set);
    }
    selection_set
}

/// Merges `source` into `target`.
///
/// Fields with the same response key are merged recursively, as are inline
/// fragments with the same type condition and no directives. Everything else
/// is appended.
pub(crate) fn merge_selection_sets(target: &mut SelectionSet, source: &SelectionSet) {
    for selection in &source.selections {
        match selection {
            Selection::Field(field) => {
                let existing = target.selections.iter_mut().find_map(|s| match s {
                    Selection::Field(existing)
                        if existing.response_key() == field.response_key()
                            && existing.name == field.name =>
                    {
                        Some(existing)
                    }
                    _ => None,
                });
                match existing {
                    Some(existing) => {
                        if !field.selection_set.selections.is_empty() {
                            merge_selection_sets(
                                &mut existing.make_mut().selection_set,
                                &field.selection_set,
                            );
                        }
                    }
                    None => target.selections.push(selection.clone()),
                }
            }
            Selection::InlineFragment(inline) if inline.directives.is_empty() => {
                let existing = target.selections.iter_mut().find_map(|s| match s {
                    Selection::InlineFragment(existing)
                        if existing.type_condition == inline.type_condition
                            && existing.directives.is_empty() =>
                    {
                        Some(existing)
                    }
                    _ => None,
                });
                match existing {
                    Some(existing) => merge_selection_sets(
                        &mut existing.make_mut().selection_set,
                        &inline.selection_set,
                    ),
                    None => target.selections.push(selection.clone()),
                }
            }
            Selection::FragmentSpread(spread) => {
                let present = target.selections.iter().any(|s| match s {
                    Selection::FragmentSpread(existing) => {
                        existing.fragment_name == spread.fragment_name
                            && existing.directives == spread.directives
                    }
                    _ => false,
                });
                if !present {
                    target.selections.push(selection.clone());
                }
            }
            Selection::InlineFragment(_) => target.selections.push(selection.clone()),
        }
    }
}

/// Adds `__typename` to `selection_set` unless it already selects it un-aliased.
///
/// Nothing is added when the selection's type is unknown to `schema`.
pub(crate) fn add_typename(schema: &Schema, selection_set: &mut SelectionSet) {
    let present = selection_set.selections.iter().any(|selection| {
        selection
            .as_field()
            .is_some_and(|field| field.name.as_str() == TYPENAME && field.alias.is_none())
    });
    if !present {
        if let Ok(field) = selection_set.new_field(schema, Name::new_static_unchecked(TYPENAME)) {
            selection_set.push(field);
        }
    }
}

/// Names of the fields selected at the top level of `selection_set`,
/// looking through inline fragments.
pub(crate) fn top_level_field_names(selection_set: &SelectionSet) -> IndexSet<Name> {
    let mut names = IndexSet::new();
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                names.insert(field.name.clone());
            }
            Selection::InlineFragment(inline) => {
                names.extend(top_level_field_names(&inline.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    names
}

/// Returns true if `object` carries a non-null value for every field selected
/// by `selection_set`, recursively.
pub(crate) fn is_satisfied_by(object: &Object, selection_set: &SelectionSet) -> bool {
    selection_set.selections.iter().all(|selection| match selection {
        Selection::Field(field) => match object.get(field.response_key().as_str()) {
            None | Some(Value::Null) => false,
            Some(Value::Object(child)) => is_satisfied_by(child, &field.selection_set),
            Some(Value::Array(items)) if !field.selection_set.selections.is_empty() => {
                items.iter().all(|item| match item {
                    Value::Object(child) => is_satisfied_by(child, &field.selection_set),
                    _ => true,
                })
            }
            Some(_) => true,
        },
        Selection::InlineFragment(inline) => is_satisfied_by(object, &inline.selection_set),
        Selection::FragmentSpread(_) => true,
    })
}

/// Names of the fragments `selection_set` references, transitively.
pub(crate) fn referenced_fragments(
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
) -> IndexSet<Name> {
    let mut referenced = IndexSet::new();
    referenced_fragments_into(selection_set, fragments, &mut referenced);
    referenced
}

fn referenced_fragments_into(
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
    referenced: &mut IndexSet<Name>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                referenced_fragments_into(&field.selection_set, fragments, referenced)
            }
            Selection::InlineFragment(inline) => {
                referenced_fragments_into(&inline.selection_set, fragments, referenced)
            }
            Selection::FragmentSpread(spread) => {
                if referenced.insert(spread.fragment_name.clone()) {
                    if let Some(fragment) = fragments.get(&spread.fragment_name) {
                        referenced_fragments_into(&fragment.selection_set, fragments, referenced);
                    }
                }
            }
        }
    }
}

/// Names of the variables `selection_set` uses in arguments and directives,
/// including inside the fragments it spreads.
pub(crate) fn referenced_variables(
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
) -> IndexSet<Name> {
    let mut variables = IndexSet::new();
    let mut visited = IndexSet::new();
    referenced_variables_into(selection_set, fragments, &mut visited, &mut variables);
    variables
}

fn referenced_variables_into(
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
    visited: &mut IndexSet<Name>,
    variables: &mut IndexSet<Name>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                for argument in &field.arguments {
                    value_variables(&argument.value, variables);
                }
                directive_variables(&field.directives, variables);
                referenced_variables_into(&field.selection_set, fragments, visited, variables);
            }
            Selection::InlineFragment(inline) => {
                directive_variables(&inline.directives, variables);
                referenced_variables_into(&inline.selection_set, fragments, visited, variables);
            }
            Selection::FragmentSpread(spread) => {
                directive_variables(&spread.directives, variables);
                if visited.insert(spread.fragment_name.clone()) {
                    if let Some(fragment) = fragments.get(&spread.fragment_name) {
                        directive_variables(&fragment.directives, variables);
                        referenced_variables_into(
                            &fragment.selection_set,
                            fragments,
                            visited,
                            variables,
                        );
                    }
                }
            }
        }
    }
}

fn directive_variables(directives: &ast::DirectiveList, variables: &mut IndexSet<Name>) {
    for directive in directives.iter() {
        for argument in &directive.arguments {
            value_variables(&argument.value, variables);
        }
    }
}

fn value_variables(value: &ast::Value, variables: &mut IndexSet<Name>) {
    match value {
        ast::Value::Variable(name) => {
            variables.insert(name.clone());
        }
        ast::Value::List(values) => values.iter().for_each(|v| value_variables(v, variables)),
        ast::Value::Object(fields) => fields
            .iter()
            .for_each(|(_, v)| value_variables(v, variables)),
        _ => {}
    }
}

/// Where [`project`] reads field values from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SourceKeys {
    /// Values are keyed by response key, as in a GraphQL response.
    ResponseKey,
    /// Values are keyed by field name, as in resolver fixtures.
    FieldName,
}

/// Projects `value` onto `selection_set`, producing exactly the shape a client
/// requested: aliases applied, unrequested fields dropped, missing fields null.
pub(crate) fn project(
    schema: &Schema,
    value: &Value,
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
    source_keys: SourceKeys,
) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| project(schema, item, selection_set, fragments, source_keys))
                .collect(),
        ),
        Value::Object(object) => {
            let typename = value
                .typename()
                .unwrap_or(selection_set.ty.as_str())
                .to_string();
            let mut output = Object::with_capacity(selection_set.selections.len());
            project_object(
                schema,
                object,
                &typename,
                selection_set,
                fragments,
                source_keys,
                &mut output,
            );
            Value::Object(output)
        }
        _ => value.clone(),
    }
}

fn project_object(
    schema: &Schema,
    object: &Object,
    typename: &str,
    selection_set: &SelectionSet,
    fragments: &FragmentMap,
    source_keys: SourceKeys,
    output: &mut Object,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                let source_key = match source_keys {
                    SourceKeys::ResponseKey => field.response_key().as_str(),
                    SourceKeys::FieldName => field.name.as_str(),
                };
                let selected = if field.name.as_str() == TYPENAME {
                    object
                        .get(source_key)
                        .or_else(|| object.get(TYPENAME))
                        .cloned()
                        .unwrap_or_else(|| Value::String(typename.into()))
                } else {
                    match object.get(source_key) {
                        None => Value::Null,
                        Some(value) if field.selection_set.selections.is_empty() => value.clone(),
                        Some(value) => {
                            project(schema, value, &field.selection_set, fragments, source_keys)
                        }
                    }
                };
                insert_merged(output, field.response_key().as_str(), selected);
            }
            Selection::InlineFragment(inline) => {
                let applies = inline
                    .type_condition
                    .as_ref()
                    .is_none_or(|condition| type_condition_applies(schema, typename, condition));
                if applies {
                    project_object(
                        schema,
                        object,
                        typename,
                        &inline.selection_set,
                        fragments,
                        source_keys,
                        output,
                    );
                }
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = fragments.get(&spread.fragment_name) {
                    if type_condition_applies(schema, typename, fragment.type_condition()) {
                        project_object(
                            schema,
                            object,
                            typename,
                            &fragment.selection_set,
                            fragments,
                            source_keys,
                            output,
                        );
                    }
                }
            }
        }
    }
}

fn insert_merged(output: &mut Object, key: &str, value: Value) {
    match output.entry(ByteString::from(key)) {
        Entry::Vacant(e) => {
            e.insert(value);
        }
        Entry::Occupied(e) => {
            e.into_mut().deep_merge(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::ExecutableDocument;
    use apollo_compiler::executable::FieldSet;
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    const SCHEMA: &str = r#"
        type Query { me: User node(id: ID!): Node }
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String friends: [User] }
        type Post implements Node { id: ID! title: String }
    "#;

    fn schema() -> apollo_compiler::validation::Valid<Schema> {
        Schema::parse_and_validate(SCHEMA, "schema.graphql").unwrap()
    }

    fn field_set(schema: &apollo_compiler::validation::Valid<Schema>, ty: &str, src: &str) -> SelectionSet {
        FieldSet::parse_and_validate(schema, Name::new(ty).unwrap(), src, "field_set.graphql")
            .unwrap()
            .into_inner()
            .selection_set
    }

    #[test]
    fn type_conditions() {
        let schema = schema();
        assert!(type_condition_applies(&schema, "User", "User"));
        assert!(type_condition_applies(&schema, "User", "Node"));
        assert!(!type_condition_applies(&schema, "User", "Post"));
        assert!(is_abstract(&schema, "Node"));
        assert!(!is_abstract(&schema, "User"));
    }

    #[test]
    fn merges_fields_by_response_key() {
        let schema = schema();
        let mut target = field_set(&schema, "User", "id friends { id }");
        let source = field_set(&schema, "User", "name friends { name }");
        merge_selection_sets(&mut target, &source);
        assert_eq!(
            target.serialize().no_indent().to_string(),
            field_set(&schema, "User", "id friends { id name } name")
                .serialize()
                .no_indent()
                .to_string()
        );
    }

    #[test]
    fn typename_is_added_once() {
        let schema = schema();
        let mut selection_set = field_set(&schema, "User", "id");
        add_typename(&schema, &mut selection_set);
        add_typename(&schema, &mut selection_set);
        assert_eq!(
            top_level_field_names(&selection_set),
            IndexSet::from([name!("id"), name!("__typename")])
        );
    }

    #[test]
    fn satisfaction_requires_non_null_values() {
        let schema = schema();
        let key = field_set(&schema, "User", "id");
        let with_id = json!({"id": "1"});
        let null_id = json!({"id": null});
        assert!(is_satisfied_by(with_id.as_object().unwrap(), &key));
        assert!(!is_satisfied_by(null_id.as_object().unwrap(), &key));
        assert!(!is_satisfied_by(&Object::new(), &key));
    }

    #[test]
    fn projects_aliases_fragments_and_missing_fields() {
        let schema = schema();
        let document = ExecutableDocument::parse_and_validate(
            &schema,
            "{ node(id: 1) { ... on User { handle: name friends { id } } ...PostFields } }
             fragment PostFields on Post { title }",
            "query.graphql",
        )
        .unwrap();
        let operation = document.operations.get(None).unwrap();
        let node = operation.selection_set.selections[0].as_field().unwrap();

        let data = json!({"__typename": "User", "handle": "Ada", "extra": true, "friends": [{"id": "2", "name": "Bob"}]});
        assert_eq!(
            project(&schema, &data, &node.selection_set, &document.fragments, SourceKeys::ResponseKey),
            json!({"handle": "Ada", "friends": [{"id": "2"}]})
        );

        let fixture = json!({"__typename": "Post", "title": "Hello"});
        assert_eq!(
            project(&schema, &fixture, &node.selection_set, &document.fragments, SourceKeys::FieldName),
            json!({"title": "Hello"})
        );
    }

    #[test]
    fn collects_fields_through_fragments() {
        let schema = schema();
        let document = ExecutableDocument::parse_and_validate(
            &schema,
            "query($withName: Boolean!) { me { id ... on Node { id } ...Named @include(if: $withName) } }
             fragment Named on User { name }",
            "query.graphql",
        )
        .unwrap();
        let operation = document.operations.get(None).unwrap();
        let me = operation.selection_set.selections[0].as_field().unwrap();

        let fields = collect_fields(&schema, &me.selection_set, &document.fragments, "User");
        assert_eq!(
            fields.keys().cloned().collect::<Vec<_>>(),
            vec![name!("id"), name!("name")]
        );
        assert_eq!(fields[&name!("id")].len(), 2);
        assert_eq!(
            referenced_variables(&me.selection_set, &document.fragments),
            IndexSet::from([name!("withName")])
        );
        assert_eq!(
            referenced_fragments(&me.selection_set, &document.fragments),
            IndexSet::from([name!("Named")])
        );
    }
}
