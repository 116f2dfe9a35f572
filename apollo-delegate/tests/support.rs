use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_delegate::Configuration;
use apollo_delegate::MergedTypeConfig;
use apollo_delegate::ResolveInfo;
use apollo_delegate::StitchingInfo;
use apollo_delegate::Subschema;
use apollo_delegate::SubschemaConfig;
use apollo_delegate::SubschemaRegistry;
use apollo_delegate::json_ext::Object;
use apollo_delegate::subschema::SchemaRef;
use apollo_delegate::test::mock::MockSubschema;
use serde_json_bytes::Value;
use serde_json_bytes::json;

pub(crate) const GATEWAY: &str = include_str!("fixtures/gateway.graphql");
pub(crate) const ACCOUNTS: &str = include_str!("fixtures/accounts.graphql");
pub(crate) const EMAILS: &str = include_str!("fixtures/emails.graphql");

pub(crate) fn gateway() -> SchemaRef {
    Arc::new(Schema::parse_and_validate(GATEWAY, "gateway.graphql").unwrap())
}

fn user_fixture(id: &str) -> Value {
    match id {
        "1" => json!({"id": "1", "name": "Ada", "friends": [{"id": "2", "name": "Bob"}]}),
        "2" => json!({"id": "2", "name": "Bob", "friends": []}),
        _ => Value::Null,
    }
}

fn id(args: &Object) -> String {
    args.get("id")
        .and_then(|id| id.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Owns `User.name` and `User.friends`.
pub(crate) fn accounts() -> MockSubschema {
    MockSubschema::parse(ACCOUNTS)
        .unwrap()
        .with_root_field("user", |args| Ok(user_fixture(&id(args))))
        .with_root_value("users", json!([user_fixture("1"), user_fixture("2")]))
}

/// Owns `User.email` and `User.greeting`.
pub(crate) fn emails() -> MockSubschema {
    MockSubschema::parse(EMAILS)
        .unwrap()
        .with_root_field("userById", |args| {
            let id = id(args);
            let email = match id.as_str() {
                "1" => "ada@example.com",
                "2" => "bob@example.com",
                _ => return Ok(Value::Null),
            };
            let greeting = args
                .get("name")
                .and_then(|name| name.as_str())
                .map(|name| format!("Hello, {name}"));
            let best_friend = (id == "1").then(|| json!({"id": "2"}));
            Ok(json!({
                "id": id,
                "email": email,
                "greeting": greeting,
                "bestFriend": best_friend,
            }))
        })
}

/// Lets `accounts` complete users other subschemas return.
pub(crate) fn user() -> MergedTypeConfig {
    MergedTypeConfig::new()
        .selection_set("{ id }")
        .field_name("user")
}

pub(crate) fn user_by_id() -> MergedTypeConfig {
    MergedTypeConfig::new()
        .selection_set("{ id }")
        .field_name("userById")
}

pub(crate) struct Stitched {
    pub(crate) stitching_info: Arc<StitchingInfo>,
    pub(crate) accounts: Arc<Subschema>,
}

pub(crate) fn stitch(
    configuration: Configuration,
    accounts: SubschemaConfig,
    emails: SubschemaConfig,
) -> Stitched {
    let mut registry = SubschemaRegistry::new(configuration);
    let accounts = registry.register(accounts).unwrap();
    registry.register(emails).unwrap();
    Stitched {
        stitching_info: registry.compose(gateway()).unwrap(),
        accounts,
    }
}

/// Resolver info of the root field selected under `response_key` by `query`.
pub(crate) fn info(
    schema: &SchemaRef,
    query: &str,
    variables: Value,
    response_key: &str,
) -> Arc<ResolveInfo> {
    let document = ExecutableDocument::parse_and_validate(schema, query, "query.graphql").unwrap();
    Arc::new(
        ResolveInfo::for_root_field(
            schema.clone(),
            &document,
            None,
            response_key,
            variables.as_object().cloned().unwrap_or_default(),
        )
        .unwrap(),
    )
}
