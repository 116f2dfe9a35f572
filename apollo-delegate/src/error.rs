//! Delegation and composition errors.

use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// An error type for transport failures reported by executors and subscribers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while registering subschemas or composing them into a
/// [`StitchingInfo`](crate::stitching::StitchingInfo).
///
/// These are fatal: no stitching info is produced when any of them is raised.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum CompositionError {
    /// subschema '{name}' does not carry a schema
    MissingSchema {
        /// Name of the subschema.
        name: String,
    },

    /// subschema '{name}' is registered more than once
    DuplicateSubschema {
        /// Name of the subschema.
        name: String,
    },

    /// field '{type_name}.{field_name}' is declared as uniquely owned by both '{first}' and '{second}'
    AmbiguousOwnership {
        type_name: String,
        field_name: String,
        /// The subschema registered first.
        first: String,
        /// The subschema registered later.
        second: String,
    },

    /// merge configuration of type '{type_name}' in subschema '{subschema}' cannot be resolved: {reason}
    UnresolvedMergeConfig {
        type_name: String,
        subschema: String,
        reason: String,
    },

    /// field '{type_name}.{field_name}' is not provided by any subschema
    UnresolvedField {
        type_name: String,
        field_name: String,
    },

    /// invalid selection set for type '{type_name}' in subschema '{subschema}': {reason}
    InvalidSelectionSet {
        type_name: String,
        subschema: String,
        reason: String,
    },

    /// schema transform '{transform}' failed for subschema '{subschema}': {reason}
    SchemaTransform {
        transform: String,
        subschema: String,
        reason: String,
    },
}

impl ErrorExtension for CompositionError {
    fn extension_code(&self) -> String {
        match self {
            CompositionError::MissingSchema { .. } => "MISSING_SCHEMA",
            CompositionError::DuplicateSubschema { .. } => "DUPLICATE_SUBSCHEMA",
            CompositionError::AmbiguousOwnership { .. } => "AMBIGUOUS_OWNERSHIP",
            CompositionError::UnresolvedMergeConfig { .. } => "UNRESOLVED_MERGE_CONFIG",
            CompositionError::UnresolvedField { .. } => "UNRESOLVED_FIELD",
            CompositionError::InvalidSelectionSet { .. } => "INVALID_SELECTION_SET",
            CompositionError::SchemaTransform { .. } => "SCHEMA_TRANSFORM_FAILED",
        }
        .to_string()
    }
}

/// Errors raised while delegating a field to a subschema.
///
/// Most of these are turned into GraphQL errors located at the delegated field
/// with [`DelegationError::to_graphql_error`], so that sibling fields still resolve.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum DelegationError {
    /// subschema '{subschema}' has no executor
    MissingExecutor { subschema: String },

    /// subschema '{subschema}' has no subscriber
    MissingSubscriber { subschema: String },

    /// subschema '{subschema}' has no root type for {operation} operations
    MissingRootType {
        subschema: String,
        operation: String,
    },

    /// field '{field_name}' does not exist on type '{type_name}' in subschema '{subschema}'
    UnknownField {
        subschema: String,
        type_name: String,
        field_name: String,
    },

    /// could not determine the return type of '{field_name}'
    UnresolvedReturnType { field_name: String },

    /// request was malformed: {reason}
    MalformedRequest { reason: String },

    /// request to subschema '{subschema}' is invalid: {reason}
    InvalidRequest { subschema: String, reason: String },

    /// transform '{transform}' failed: {reason}
    Transform { transform: String, reason: String },

    /// subschema '{subschema}' failed to execute the request: {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    Executor { subschema: String, reason: String },

    /// subschema '{subschema}' response was malformed: {reason}
    MalformedResponse { subschema: String, reason: String },

    /// field '{field_name}' is supplied by both '{existing}' and '{incoming}'
    OwnershipConflict {
        field_name: String,
        /// The subschema that supplied the value first.
        existing: String,
        /// The subschema that tried to supply it again.
        incoming: String,
    },

    /// no subschema can resolve field '{field_name}' of type '{type_name}'
    UnresolvableField {
        type_name: String,
        field_name: String,
    },

    /// merged type '{type_name}' cannot be re-fetched from subschema '{subschema}': {reason}
    MergeResolution {
        type_name: String,
        subschema: String,
        reason: String,
    },
}

impl DelegationError {
    /// Convert the delegation error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut value: Value = serde_json_bytes::to_value(self).unwrap_or_default();
        let mut extensions = value.as_object_mut().map(std::mem::take).unwrap_or_default();
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        // `reason` is already part of the message
        extensions.remove("reason");

        Error {
            message: self.to_string(),
            locations: Default::default(),
            path,
            extensions,
        }
    }
}

impl ErrorExtension for DelegationError {
    fn extension_code(&self) -> String {
        match self {
            DelegationError::MissingExecutor { .. } => "MISSING_EXECUTOR",
            DelegationError::MissingSubscriber { .. } => "MISSING_SUBSCRIBER",
            DelegationError::MissingRootType { .. } => "MISSING_ROOT_TYPE",
            DelegationError::UnknownField { .. } => "UNKNOWN_FIELD",
            DelegationError::UnresolvedReturnType { .. } => "UNRESOLVED_RETURN_TYPE",
            DelegationError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            DelegationError::InvalidRequest { .. } => "INVALID_REQUEST",
            DelegationError::Transform { .. } => "TRANSFORM_FAILED",
            DelegationError::Executor { .. } => "SUBSCHEMA_EXECUTION_FAILED",
            DelegationError::MalformedResponse { .. } => "SUBSCHEMA_MALFORMED_RESPONSE",
            DelegationError::OwnershipConflict { .. } => "OWNERSHIP_CONFLICT",
            DelegationError::UnresolvableField { .. } => "UNRESOLVABLE_FIELD",
            DelegationError::MergeResolution { .. } => "MERGE_RESOLUTION_FAILED",
        }
        .to_string()
    }
}

impl DelegationError {
    pub(crate) fn invalid_request<T>(subschema: &str, errors: WithErrors<T>) -> Self {
        Self::invalid_request_from_diagnostics(subschema, &errors.errors)
    }

    pub(crate) fn invalid_request_from_diagnostics(
        subschema: &str,
        diagnostics: &DiagnosticList,
    ) -> Self {
        DelegationError::InvalidRequest {
            subschema: subschema.to_string(),
            reason: diagnostics.to_string(),
        }
    }
}

/// An error returned by a [`Transform`](crate::transform::Transform) hook.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// {0}
    Message(String),

    /// transformed schema is invalid: {0}
    InvalidSchema(String),

    /// invalid name: {0}
    InvalidName(String),
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        TransformError::Message(message.into())
    }
}

impl<T> From<WithErrors<T>> for TransformError {
    fn from(errors: WithErrors<T>) -> Self {
        TransformError::InvalidSchema(errors.errors.to_string())
    }
}

/// Errors raised while loading the engine [`Configuration`](crate::configuration::Configuration).
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not parse configuration: {0}
    Parse(#[from] serde_yaml::Error),

    /// invalid configuration value for '{name}': {reason}
    InvalidValue { name: String, reason: String },
}
