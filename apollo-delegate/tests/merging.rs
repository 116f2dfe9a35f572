use apollo_delegate::Configuration;
use apollo_delegate::Context;
use apollo_delegate::DelegateOptions;
use apollo_delegate::DelegationError;
use apollo_delegate::MergedTypeConfig;
use apollo_delegate::delegate::DelegationResult;
use apollo_delegate::delegate::FieldResolver;
use apollo_delegate::delegate::ProxyingResolverOptions;
use apollo_delegate::delegate_to_schema;
use apollo_delegate::json_ext::Object;
use apollo_delegate::json_ext::Path;
use apollo_delegate::subschema::MergedTypeResolution;
use apollo_delegate::subschema::MergedTypeResolver;
use apollo_delegate::test::mock::MockSubschema;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json_bytes::Value;
use serde_json_bytes::json;

use crate::support::EMAILS;
use crate::support::accounts;
use crate::support::emails;
use crate::support::info;
use crate::support::stitch;
use crate::support::user;
use crate::support::user_by_id;

#[tokio::test]
async fn fields_of_other_subschemas_are_merged_in() {
    let accounts = accounts();
    let emails = emails();
    let stitched = stitch(
        Configuration::default(),
        accounts.config("accounts"),
        emails.config("emails").with_merge("User", user_by_id()),
    );
    let info = info(
        stitched.stitching_info.schema(),
        "query($id: ID!) { user(id: $id) { name email } }",
        json!({"id": "1"}),
        "user",
    );

    let resolver = stitched.accounts.proxying_resolver(
        ProxyingResolverOptions::new(stitched.accounts.clone())
            .with_stitching_info(stitched.stitching_info.clone()),
    );
    let result = resolver
        .resolve(info.arguments(), Context::new(), info.clone())
        .await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(
        result.data,
        json!({"name": "Ada", "email": "ada@example.com"})
    );

    let accounts_queries = accounts.queries();
    assert_eq!(accounts_queries.len(), 1);
    assert!(!accounts_queries[0].contains("email"));
    assert!(accounts_queries[0].contains("id"));

    let emails_queries = emails.queries();
    assert_eq!(emails_queries.len(), 1);
    assert!(emails_queries[0].contains("userById"));
    assert!(emails_queries[0].contains("email"));
    assert!(emails_queries[0].contains("id"));
    assert_eq!(
        Value::Object(emails.calls()[0].variables.clone()),
        json!({"_v0_id": "1"})
    );
}

#[tokio::test]
async fn argument_variables_never_shadow_the_callers() {
    let accounts = accounts();
    let emails = emails();
    let stitched = stitch(
        Configuration::default(),
        accounts.config("accounts"),
        emails.config("emails").with_merge("User", user_by_id()),
    );
    let info = info(
        stitched.stitching_info.schema(),
        "query($id: ID!, $_v0_id: Boolean!) { user(id: $id) { name email @include(if: $_v0_id) } }",
        json!({"id": "1", "_v0_id": true}),
        "user",
    );

    let resolver = stitched.accounts.proxying_resolver(
        ProxyingResolverOptions::new(stitched.accounts.clone())
            .with_stitching_info(stitched.stitching_info.clone()),
    );
    let result = resolver
        .resolve(info.arguments(), Context::new(), info.clone())
        .await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(
        result.data,
        json!({"name": "Ada", "email": "ada@example.com"})
    );
    assert_eq!(
        Value::Object(accounts.calls()[0].variables.clone()),
        json!({"_v0_id_1": "1"})
    );
    assert_eq!(
        Value::Object(emails.calls()[0].variables.clone()),
        json!({"_v0_id": true, "_v0_id_1": "1"})
    );
    assert!(emails.queries()[0].contains("userById(id: $_v0_id_1)"));
}

#[tokio::test]
async fn merged_objects_below_merged_fields_are_completed() {
    let queries = [
        (
            r#"{ user(id: "1") { name bestFriend { name } } }"#,
            json!({"name": "Ada", "bestFriend": {"name": "Bob"}}),
        ),
        // the key selected by the caller is not supplied twice
        (
            r#"{ user(id: "1") { name bestFriend { id name } } }"#,
            json!({"name": "Ada", "bestFriend": {"id": "2", "name": "Bob"}}),
        ),
    ];
    for (query, expected) in queries {
        let accounts = accounts();
        let emails = emails();
        let stitched = stitch(
            Configuration::default(),
            accounts.config("accounts").with_merge("User", user()),
            emails.config("emails").with_merge("User", user_by_id()),
        );
        let info = info(stitched.stitching_info.schema(), query, json!({}), "user");

        let result = delegate_to_schema(
            DelegateOptions::builder()
                .subschema(stitched.accounts.clone())
                .info(info)
                .stitching_info(stitched.stitching_info.clone())
                .build(),
        )
        .await
        .unwrap();

        assert_eq!(result.errors, vec![]);
        assert_eq!(result.data, expected);
        assert_eq!(accounts.calls().len(), 2);
        assert_eq!(emails.calls().len(), 1);
        assert!(accounts.queries()[1].contains("name"));
    }
}

#[tokio::test]
async fn objects_the_target_does_not_find_leave_their_fields_unresolved() {
    let emails = MockSubschema::parse(EMAILS)
        .unwrap()
        .with_root_value("userById", Value::Null);
    let stitched = stitch(
        Configuration::default(),
        accounts().config("accounts"),
        emails.config("emails").with_merge("User", user_by_id()),
    );
    let info = info(
        stitched.stitching_info.schema(),
        r#"{ user(id: "1") { name email } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!({"name": "Ada", "email": null}));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].extension_code().as_deref(),
        Some("UNRESOLVABLE_FIELD")
    );
    assert_eq!(
        result.errors[0].path,
        Some(Path::empty().key("user").key("email"))
    );
    assert_eq!(emails.calls().len(), 1);
}

#[tokio::test]
async fn every_object_of_a_list_is_merged() {
    let emails = emails();
    let stitched = stitch(
        Configuration::default(),
        accounts().config("accounts"),
        emails.config("emails").with_merge("User", user_by_id()),
    );
    let info = info(
        stitched.stitching_info.schema(),
        "{ users { id handle: email } }",
        json!({}),
        "users",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(
        result.data,
        json!([
            {"id": "1", "handle": "ada@example.com"},
            {"id": "2", "handle": "bob@example.com"},
        ])
    );
    assert_eq!(emails.calls().len(), 2);
}

#[tokio::test]
async fn a_failing_merge_keeps_the_fields_already_resolved() {
    let stitched = stitch(
        Configuration::default(),
        accounts().config("accounts"),
        emails()
            .failing("connection refused")
            .config("emails")
            .with_merge("User", user_by_id()),
    );
    let info = info(
        stitched.stitching_info.schema(),
        r#"{ user(id: "1") { name email } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!({"name": "Ada", "email": null}));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].extension_code().as_deref(),
        Some("SUBSCHEMA_EXECUTION_FAILED")
    );
    assert_eq!(result.errors[0].path, Some(Path::empty().key("user")));
}

#[tokio::test]
async fn disabled_type_merging_returns_the_owner_fields_only() {
    let emails = emails();
    let stitched = stitch(
        Configuration::builder().type_merging(false).build(),
        accounts().config("accounts"),
        emails.config("emails").with_merge("User", user_by_id()),
    );
    let info = info(
        stitched.stitching_info.schema(),
        r#"{ user(id: "1") { name email } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!({"name": "Ada", "email": null}));
    assert!(emails.calls().is_empty());
}

#[tokio::test]
async fn computed_fields_receive_what_they_require() {
    let emails = emails();
    let merge = user_by_id()
        .computed_field("greeting", "{ name }")
        .args(|object| {
            let mut args = Object::new();
            for key in ["id", "name"] {
                if let Some(value) = object.get(key) {
                    args.insert(key, value.clone());
                }
            }
            Ok(args)
        });
    let stitched = stitch(
        Configuration::default(),
        accounts().config("accounts"),
        emails.config("emails").with_merge("User", merge),
    );
    let info = info(
        stitched.stitching_info.schema(),
        r#"{ user(id: "1") { greeting } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.errors, vec![]);
    assert_eq!(result.data, json!({"greeting": "Hello, Ada"}));
    assert_eq!(
        Value::Object(emails.calls()[0].variables.clone()),
        json!({"_v0_id": "1", "_v1_name": "Ada"})
    );
}

struct Directory;

#[async_trait]
impl MergedTypeResolver for Directory {
    async fn resolve(
        &self,
        resolution: MergedTypeResolution,
    ) -> Result<DelegationResult, DelegationError> {
        let id = resolution
            .object
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default();
        Ok(DelegationResult {
            data: json!({"email": format!("user{id}@directory.example.com")}),
            errors: Vec::new(),
        })
    }
}

#[tokio::test]
async fn custom_merge_resolvers_replace_delegation() {
    let emails = emails();
    let stitched = stitch(
        Configuration::default(),
        accounts().config("accounts"),
        emails.config("emails").with_merge(
            "User",
            MergedTypeConfig::new()
                .selection_set("{ id }")
                .resolve(Directory),
        ),
    );
    let info = info(
        stitched.stitching_info.schema(),
        r#"{ user(id: "1") { email } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!({"email": "user1@directory.example.com"}));
    assert!(emails.calls().is_empty());
}

#[tokio::test]
async fn nested_objects_stop_merging_at_the_maximum_depth() {
    let stitched = stitch(
        Configuration::builder().max_depth(1).build(),
        accounts().config("accounts"),
        emails().config("emails").with_merge("User", user_by_id()),
    );
    let info = info(
        stitched.stitching_info.schema(),
        r#"{ user(id: "1") { email friends { name email } } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(
        result.data,
        json!({
            "email": "ada@example.com",
            "friends": [{"name": "Bob", "email": null}],
        })
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].extension_code().as_deref(),
        Some("MERGE_RESOLUTION_FAILED")
    );
    assert_eq!(
        result.errors[0].path,
        Some(Path::empty().key("user").key("friends").index(0).key("email"))
    );
}

#[tokio::test]
async fn unresolvable_fields_are_null_with_an_error() {
    let stitched = stitch(
        Configuration::default(),
        accounts().config("accounts"),
        // no entry point, so `email` cannot be fetched
        emails()
            .config("emails")
            .with_merge("User", MergedTypeConfig::new().selection_set("{ id }")),
    );
    let info = info(
        stitched.stitching_info.schema(),
        r#"{ user(id: "1") { name email } }"#,
        json!({}),
        "user",
    );

    let result = delegate_to_schema(
        DelegateOptions::builder()
            .subschema(stitched.accounts.clone())
            .info(info)
            .stitching_info(stitched.stitching_info.clone())
            .build(),
    )
    .await
    .unwrap();

    assert_eq!(result.data, json!({"name": "Ada", "email": null}));
    assert_eq!(
        result.errors[0].extension_code().as_deref(),
        Some("UNRESOLVABLE_FIELD")
    );
    assert_eq!(result.errors[0].path, Some(Path::empty().key("user").key("email")));
}
