//! Mock implementations of the executor traits.

mod subschema;

pub use subschema::MockSubschema;
