use std::fmt;
use std::fmt::Display;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable;
use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Object;

/// The kind of a GraphQL operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OperationKind {
    pub const fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl From<OperationKind> for apollo_compiler::ast::OperationType {
    fn from(value: OperationKind) -> Self {
        match value {
            OperationKind::Query => apollo_compiler::ast::OperationType::Query,
            OperationKind::Mutation => apollo_compiler::ast::OperationType::Mutation,
            OperationKind::Subscription => apollo_compiler::ast::OperationType::Subscription,
        }
    }
}

impl From<apollo_compiler::ast::OperationType> for OperationKind {
    fn from(value: apollo_compiler::ast::OperationType) -> Self {
        match value {
            apollo_compiler::ast::OperationType::Query => OperationKind::Query,
            apollo_compiler::ast::OperationType::Mutation => OperationKind::Mutation,
            apollo_compiler::ast::OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// A transport-agnostic request to a subschema.
///
/// The document holds exactly one operation. Transforms rewrite requests by
/// producing new values; the document is not validated until it reaches the
/// delegation bridge.
#[derive(Clone, Debug)]
pub struct Request {
    pub document: ExecutableDocument,
    pub variables: Object,
    pub operation_name: Option<Name>,
    pub operation_kind: OperationKind,
    pub extensions: Object,
}

impl Request {
    /// The operation of this request.
    pub fn operation(&self) -> Option<&executable::Operation> {
        self.document
            .operations
            .get(self.operation_name.as_ref().map(|name| name.as_str()))
            .ok()
            .map(|operation| &**operation)
    }

    /// The root field selected by the operation, if there is exactly one.
    pub fn root_field(&self) -> Option<&executable::Field> {
        let operation = self.operation()?;
        let mut fields = operation
            .selection_set
            .selections
            .iter()
            .filter_map(|selection| selection.as_field());
        let field = fields.next()?;
        fields.next().is_none().then_some(&**field)
    }

    /// Every operation of the document, for transforms rewriting them in place.
    pub fn operations_mut(&mut self) -> impl Iterator<Item = &mut Node<executable::Operation>> {
        self.document
            .operations
            .anonymous
            .iter_mut()
            .chain(self.document.operations.named.values_mut())
    }

    pub fn query(&self) -> String {
        self.document.serialize().no_indent().to_string()
    }
}
