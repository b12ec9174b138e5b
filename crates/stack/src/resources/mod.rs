//! Resource constructs.
//!
//! Each construct declares one or more resources into a
//! [`Stack`](crate::graph::Stack) and returns a handle whose accessors yield
//! [`Token`]s for the values the engine assigns later (names, ARNs, URLs).

pub mod access;
pub mod apprunner;
pub mod iam;
pub mod lambda;
pub mod secrets;
pub mod storage;

pub use access::{AccessGrant, Action, GrantStrategy, Principal, ResourceScope};
pub use apprunner::{ImageConfiguration, Service, ServiceProps};
pub use iam::Role;
pub use lambda::{Function, FunctionProps, LayerVersion};
pub use secrets::{Secret, SecretParameter};
pub use storage::{Bucket, BucketPolicy, ConfigObject};

use common::Token;

/// A declared resource, addressable by logical id.
pub trait Resource {
    fn logical_id(&self) -> &str;

    /// `Ref` to this resource.
    fn reference(&self) -> Token {
        Token::reference(self.logical_id())
    }
}
