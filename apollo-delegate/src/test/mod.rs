//! Utilities for testing code that delegates to subschemas.

pub mod mock;
