//! Stack definitions.

pub mod observability;

pub use observability::{ObservabilityStack, StackProps};
