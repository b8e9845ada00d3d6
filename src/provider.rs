//! Boundary between the compiler and whatever knows the program's types.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::model::TypeModel;

/// Type argument as written at a call site (`TestType`, `{ name: string }`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(pub String);

impl TypeRef {
    pub fn new(text: impl Into<String>) -> Self { Self(text.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared signature of a function referenced from a custom-validator list.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateSignature {
    pub params: Vec<String>,
    pub returns: Returns,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Returns {
    /// `param is narrowed`
    TypePredicate { param: String, narrowed: TypeModel },
    Other,
}

impl PredicateSignature {
    /// The narrowed-to type, if this is a one-parameter type predicate over
    /// that parameter.
    pub fn narrowed_type(&self) -> Option<&TypeModel> {
        match (self.params.as_slice(), &self.returns) {
            ([only], Returns::TypePredicate { param, narrowed }) if only == param => Some(narrowed),
            _ => None,
        }
    }
}

pub trait TypeProvider {
    /// Structural model of the referenced type; origins filled in.
    fn resolve_type(&self, reference: &TypeRef) -> Result<TypeModel, CompileError>;

    /// Canonical printing of the reference, stable across spellings that
    /// differ only in whitespace.
    fn print_type(&self, reference: &TypeRef) -> Result<String, CompileError>;

    fn predicate_signature(&self, name: &str) -> Option<PredicateSignature>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[&str], returns: Returns) -> PredicateSignature {
        PredicateSignature { params: params.iter().map(|s| s.to_string()).collect(), returns }
    }

    #[test]
    fn only_single_param_predicates_narrow() {
        let narrowed = TypeModel::string();
        let pred = |param: &str| Returns::TypePredicate { param: param.into(), narrowed: narrowed.clone() };

        assert!(sig(&["x"], pred("x")).narrowed_type().is_some());
        assert!(sig(&["x", "y"], pred("x")).narrowed_type().is_none());
        assert!(sig(&["x"], pred("y")).narrowed_type().is_none());
        assert!(sig(&["x"], Returns::Other).narrowed_type().is_none());
        assert!(sig(&[], pred("x")).narrowed_type().is_none());
    }
}
