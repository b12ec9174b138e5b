//! [`EnvironmentContract`]: the checked variable set handed to the function.
//!
//! A missing variable does not make the agent fail; it silently stops
//! exporting. The contract therefore refuses to exist unless every variable
//! its variant needs is present and non-blank.

use std::collections::{BTreeMap, BTreeSet};

use common::{StackError, Token};

use super::InstrumentationVariant;

/// Complete, validated instrumentation environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContract {
    variant: InstrumentationVariant,
    vars: BTreeMap<String, Token>,
}

impl EnvironmentContract {
    /// # Errors
    ///
    /// Returns [`StackError::IncompleteContract`] naming the first required
    /// variable that is absent or a blank literal.
    pub fn new<K, I>(variant: InstrumentationVariant, vars: I) -> Result<Self, StackError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Token)>,
    {
        let vars: BTreeMap<String, Token> = vars.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for name in variant.required_variables() {
            let present = match vars.get(*name) {
                Some(Token::Literal(s)) => !s.trim().is_empty(),
                Some(_) => true,
                None => false,
            };
            if !present {
                return Err(StackError::IncompleteContract((*name).to_owned()));
            }
        }
        Ok(Self { variant, vars })
    }

    pub fn variant(&self) -> InstrumentationVariant {
        self.variant
    }

    pub fn get(&self, name: &str) -> Option<&Token> {
        self.vars.get(name)
    }

    /// The value of `name` if it is known at synth time.
    pub fn literal(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Token::as_literal)
    }

    /// The exporter target for the variant.
    pub fn exporter_endpoint(&self) -> &Token {
        // Presence is checked in `new`.
        &self.vars[self.variant.endpoint_variable()]
    }

    /// Logical ids the contract's values depend on.
    pub fn references(&self) -> BTreeSet<String> {
        self.vars.values().flat_map(Token::references).collect()
    }

    pub fn variables(&self) -> &BTreeMap<String, Token> {
        &self.vars
    }
}
