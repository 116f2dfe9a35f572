use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_delegate::Context;
use apollo_delegate::DelegateOptions;
use apollo_delegate::DelegateRequestOptions;
use apollo_delegate::DelegationError;
use apollo_delegate::Subschema;
use apollo_delegate::delegate::FieldResolver;
use apollo_delegate::delegate::ProxyingResolverOptions;
use apollo_delegate::delegate::create_request_from_info;
use apollo_delegate::delegate_request;
use apollo_delegate::delegate_to_schema;
use apollo_delegate::json_ext::Object;
use apollo_delegate::json_ext::Path;
use apollo_delegate::subschema::SchemaRef;
use apollo_delegate::test::mock::MockSubschema;
use apollo_delegate::transform::RenameObjectFields;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;

use crate::support::ACCOUNTS;
use crate::support::accounts;
use crate::support::info;

const CURRENT: &str = r#"
    type Query { user(id: ID!): User }
    type Subscription { userUpdated: User }
    type User { id: ID! name: String }
"#;

const LEGACY: &str = r#"
    type Query { user(id: ID!): User }
    type Subscription { userUpdated: User }
    type User { id: ID! legacyName: String }
"#;

/// A subschema still exposed under its legacy field names.
pub(crate) fn current() -> MockSubschema {
    MockSubschema::parse(CURRENT)
        .unwrap()
        .with_root_value("user", json!({"id": "1", "name": "Ada"}))
        .with_root_value(
            "userUpdated",
            json!([
                {"id": "1", "name": "Ada"},
                {"id": "1", "name": "Ada Lovelace"},
            ]),
        )
}

pub(crate) fn legacy() -> SchemaRef {
    Arc::new(Schema::parse_and_validate(LEGACY, "legacy.graphql").unwrap())
}

#[tokio::test]
async fn renamed_fields_are_translated_both_ways() {
    let current = current();
    let subschema = Subschema::standalone(
        current
            .config("current")
            .with_transform(RenameObjectFields::new("User", "name", "legacyName").unwrap()),
    )
    .unwrap();
    assert!(subschema.transformed_schema().type_field("User", "legacyName").is_ok());

    let info = info(
        &legacy(),
        r#"{ user(id: "1") { id legacyName } }"#,
        json!({}),
        "user",
    );
    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(subschema)
            .info(info)
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!({"id": "1", "legacyName": "Ada"}));
    let query = &current.queries()[0];
    assert!(query.contains("name"));
    assert!(!query.contains("legacyName"));
}

#[tokio::test]
async fn subschema_errors_are_located_under_the_delegated_field() {
    let accounts = MockSubschema::parse(ACCOUNTS)
        .unwrap()
        .with_root_field("user", |_| Err("user not found".to_string()));
    let subschema = Subschema::standalone(accounts.config("accounts")).unwrap();
    let info = info(
        subschema.schema(),
        r#"{ ada: user(id: "1") { name } }"#,
        json!({}),
        "ada",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(subschema)
            .info(info)
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!(null));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "user not found");
    assert_eq!(result.errors[0].path, Some(Path::empty().key("ada")));
    assert!(accounts.queries()[0].contains("ada: user"));
}

#[tokio::test]
async fn proxying_resolvers_report_failures_at_the_field() {
    let accounts = accounts().failing("connection refused");
    let subschema = Subschema::standalone(accounts.config("accounts")).unwrap();
    let info = info(
        subschema.schema(),
        r#"{ users { name } }"#,
        json!({}),
        "users",
    );

    let resolver = subschema.proxying_resolver(ProxyingResolverOptions::new(subschema.clone()));
    let result = resolver.resolve(Object::new(), Context::new(), info).await;

    assert_eq!(result.data, json!(null));
    assert_eq!(
        result.errors[0].extension_code().as_deref(),
        Some("SUBSCHEMA_EXECUTION_FAILED")
    );
    assert_eq!(result.errors[0].path, Some(Path::empty().key("users")));
}

#[tokio::test]
async fn subschemas_without_executor_cannot_be_delegated_to() {
    let subschema = Subschema::standalone(accounts().schema().clone()).unwrap();
    let info = info(
        subschema.schema(),
        r#"{ users { name } }"#,
        json!({}),
        "users",
    );

    let err = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(subschema)
            .info(info)
            .build(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err,
        DelegationError::MissingExecutor {
            subschema: "subschema_0".to_string()
        }
    );
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_execution() {
    let accounts = accounts();
    let subschema = Subschema::standalone(accounts.config("accounts")).unwrap();

    // without resolver info nor selection, an object field has nothing to select
    let err = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(subschema)
            .field_name("users")
            .build(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DelegationError::InvalidRequest { .. }));
    assert!(accounts.calls().is_empty());
}

#[tokio::test]
async fn per_call_options_override_the_subschema() {
    let accounts = accounts();
    let subschema = Subschema::standalone(
        accounts
            .config("accounts")
            .with_root_value(json!({"source": "config"})),
    )
    .unwrap();
    let info = info(
        subschema.schema(),
        r#"{ user(id: "2") { name } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(subschema.clone())
            .info(info.clone())
            .root_value(json!({"source": "call"}))
            .build(),
    )
    .await
    .unwrap();
    assert_eq!(result.data, json!({"name": "Bob"}));
    assert_eq!(accounts.calls()[0].root_value, Some(json!({"source": "call"})));

    // requests are checked against the schema this call sees
    let without_user = Arc::new(
        Schema::parse_and_validate(
            "type Query { users: [User] } type User { id: ID! name: String }",
            "users.graphql",
        )
        .unwrap(),
    );
    let err = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(subschema)
            .info(info)
            .transformed_schema(without_user)
            .build(),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err,
        DelegationError::UnknownField {
            subschema: "accounts".to_string(),
            type_name: "Query".to_string(),
            field_name: "user".to_string(),
        }
    );
    assert_eq!(accounts.calls().len(), 1);
}

#[tokio::test]
async fn prebuilt_requests_can_be_delegated() {
    let accounts = accounts();
    let subschema = Subschema::standalone(accounts.config("accounts")).unwrap();
    let info = info(
        subschema.schema(),
        r#"{ user(id: "2") { name } }"#,
        json!({}),
        "user",
    );
    let request =
        create_request_from_info(subschema.schema(), subschema.name(), &info, None, &Object::new())
            .unwrap();

    let result = delegate_request(
        DelegateRequestOptions::builder()
            .subschema(subschema)
            .request(request)
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!({"name": "Bob"}));
}
