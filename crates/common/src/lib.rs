//! Common types shared across the otel collector stack crates: deferred-value
//! tokens, template document types, and errors.

pub mod error;
pub mod template;
pub mod token;

pub use error::StackError;
pub use token::{Pseudo, Token};
