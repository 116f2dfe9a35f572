//! Delegates fields of a composed GraphQL schema to the subschemas that
//! implement them, and merges objects whose fields are spread across several
//! subschemas.
//!
//! ## Usage
//!
//! Register every subschema with a [`SubschemaRegistry`], compose the registry
//! against the composed schema to obtain a [`StitchingInfo`], then resolve root
//! fields either with [`delegate_to_schema`] or with the resolvers returned by
//! [`Subschema::proxying_resolver`]. Objects of merged types returned by one
//! subschema are completed from the others before the delegated value is
//! handed back.

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod configuration;
pub mod context;
pub mod delegate;
pub mod error;
pub mod executor;
pub mod graphql;
pub mod json_ext;
pub mod registry;
pub mod resolve_info;
mod selection;
pub mod stitching;
pub mod subschema;
pub mod test;
pub mod transform;

pub use configuration::Configuration;
pub use context::Context;
pub use delegate::DelegateOptions;
pub use delegate::DelegateRequestOptions;
pub use delegate::DelegationContext;
pub use delegate::DelegationResult;
pub use delegate::delegate_request;
pub use delegate::delegate_subscription;
pub use delegate::delegate_to_schema;
pub use error::CompositionError;
pub use error::DelegationError;
pub use registry::SubschemaRegistry;
pub use resolve_info::ResolveInfo;
pub use stitching::StitchingInfo;
pub use subschema::MergedTypeConfig;
pub use subschema::SchemaOrSubschema;
pub use subschema::Subschema;
pub use subschema::SubschemaConfig;
