//! Custom validator binding: predicate references → origin identity overrides.
use indexmap::IndexMap;
use tracing::debug;

use crate::model::OriginId;
use crate::provider::TypeProvider;
use crate::unit::Expr;

/// Origin identity → name of the predicate that replaces its structural check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    by_origin: IndexMap<OriginId, String>,
}

impl Bindings {
    pub fn get(&self, origin: OriginId) -> Option<&str> {
        self.by_origin.get(&origin).map(String::as_str)
    }

    /// Later bindings for the same origin replace earlier ones.
    pub fn insert(&mut self, origin: OriginId, name: impl Into<String>) {
        self.by_origin.insert(origin, name.into());
    }

    pub fn len(&self) -> usize { self.by_origin.len() }
    pub fn is_empty(&self) -> bool { self.by_origin.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (OriginId, &str)> {
        self.by_origin.iter().map(|(origin, name)| (*origin, name.as_str()))
    }
}

/// Build bindings from a call's custom-validator argument (an array of
/// function references). Anything that is not a single-parameter type
/// predicate narrowing to an identifiable type is skipped.
pub fn bind<P: TypeProvider + ?Sized>(provider: &P, references: Option<&Expr>) -> Bindings {
    let mut bindings = Bindings::default();
    let items = match references {
        None => return bindings,
        Some(Expr::Array { items }) => items,
        Some(other) => {
            debug!(?other, "custom validators argument is not an array literal; ignored");
            return bindings;
        }
    };

    for item in items {
        let Some(name) = item.as_ident() else {
            debug!(?item, "custom validator is not a plain reference; skipped");
            continue;
        };
        let Some(signature) = provider.predicate_signature(name) else {
            debug!(name, "no declared signature; skipped");
            continue;
        };
        let Some(narrowed) = signature.narrowed_type() else {
            debug!(name, "not a single-parameter type predicate; skipped");
            continue;
        };
        match narrowed.origin {
            Some(origin) => {
                debug!(name, %origin, "custom validator bound");
                bindings.insert(origin, name);
            }
            None => {
                debug!(name, "narrowed type has no identity to bind; skipped");
            }
        }
    }
    bindings
}
