//! Compilation-unit syntax tree: the slice of a host program the scanner
//! needs to see and rewrite. Units are read from and written to JSON.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::TypeRef;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Stmt {
    /// `import a, { b as c } from "m";`
    Import(ImportDecl),
    /// `const a = require("m");`
    Require(RequireDecl),
    Const { name: String, init: Expr },
    Expr { expr: Expr },
    /// Generated validator function.
    Validator(ValidatorFn),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub named: Vec<ImportSpecifier>,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSpecifier {
    pub imported: String,
    /// Local rename; `None` binds under the imported name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequireDecl {
    pub local: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Expr {
    Ident { name: String },
    /// Already-parsed data, i.e. the result of `JSON.parse(...)`.
    Json { value: Value },
    Array { items: Vec<Expr> },
    Member { object: Box<Expr>, property: String },
    Call(Call),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub callee: Box<Expr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_args: Vec<TypeRef>,
    #[serde(default)]
    pub args: Vec<Expr>,
}

/// `function <name>(<param>) { return struct(<schema>)(<param>); }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorFn {
    pub name: String,
    pub param: String,
    pub schema: Schema,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Unit {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), body: Vec::new() }
    }

    pub fn with(mut self, stmt: Stmt) -> Self {
        self.body.push(stmt);
        self
    }

    /// Every identifier the unit binds at top level.
    pub fn bound_names(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for stmt in &self.body {
            match stmt {
                Stmt::Import(decl) => {
                    out.extend(decl.default.iter().cloned());
                    out.extend(decl.named.iter().map(|s| s.local_name().to_string()));
                }
                Stmt::Require(decl) => {
                    out.insert(decl.local.clone());
                }
                Stmt::Const { name, .. } => {
                    out.insert(name.clone());
                }
                Stmt::Validator(func) => {
                    out.insert(func.name.clone());
                }
                Stmt::Expr { .. } => {}
            }
        }
        out
    }

    /// Visit every call in the unit, children before parents, in source order.
    pub fn visit_calls_mut<E>(&mut self, f: &mut impl FnMut(&mut Call) -> Result<(), E>) -> Result<(), E> {
        for stmt in &mut self.body {
            match stmt {
                Stmt::Const { init: expr, .. } | Stmt::Expr { expr } => expr.visit_calls_mut(f)?,
                Stmt::Import(_) | Stmt::Require(_) | Stmt::Validator(_) => {}
            }
        }
        Ok(())
    }

    pub fn validators(&self) -> impl Iterator<Item = &ValidatorFn> {
        self.body.iter().filter_map(|stmt| match stmt {
            Stmt::Validator(func) => Some(func),
            _ => None,
        })
    }

    pub fn validator(&self, name: &str) -> Option<&ValidatorFn> {
        self.validators().find(|func| func.name == name)
    }
}

impl ImportSpecifier {
    pub fn local_name(&self) -> &str {
        self.local.as_deref().unwrap_or(&self.imported)
    }
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self { Self::Ident { name: name.into() } }
    pub fn json(value: Value) -> Self { Self::Json { value } }
    pub fn array(items: Vec<Expr>) -> Self { Self::Array { items } }

    pub fn call(callee: Expr, type_args: Vec<TypeRef>, args: Vec<Expr>) -> Self {
        Self::Call(Call { callee: Box::new(callee), type_args, args })
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Self::Ident { name } => Some(name),
            _ => None,
        }
    }

    pub fn visit_calls_mut<E>(&mut self, f: &mut impl FnMut(&mut Call) -> Result<(), E>) -> Result<(), E> {
        match self {
            Self::Ident { .. } | Self::Json { .. } => Ok(()),
            Self::Array { items } => items.iter_mut().try_for_each(|item| item.visit_calls_mut(f)),
            Self::Member { object, .. } => object.visit_calls_mut(f),
            Self::Call(call) => {
                call.callee.visit_calls_mut(f)?;
                for arg in &mut call.args {
                    arg.visit_calls_mut(f)?;
                }
                f(call)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_tagged_json() {
        let src = json!({
            "name": "main",
            "body": [
                {"kind": "import", "named": [{"imported": "validate", "local": "check"}], "module": "guardgen"},
                {"kind": "const", "name": "obj", "init": {
                    "kind": "call",
                    "callee": {"kind": "ident", "name": "check"},
                    "typeArgs": ["TestType"],
                    "args": [{"kind": "json", "value": {"name": "Me"}}]
                }}
            ]
        });
        let unit: Unit = serde_json::from_value(src).unwrap();
        let Stmt::Import(decl) = &unit.body[0] else { panic!("import expected") };
        assert_eq!(decl.named[0].local_name(), "check");
        let Stmt::Const { init: Expr::Call(call), .. } = &unit.body[1] else { panic!("call expected") };
        assert_eq!(call.type_args, vec![TypeRef::new("TestType")]);
        assert_eq!(unit.bound_names(), HashSet::from(["check".to_string(), "obj".to_string()]));
    }

    #[test]
    fn calls_are_visited_children_first() {
        let inner = Expr::call(Expr::ident("inner"), vec![], vec![Expr::json(json!(1))]);
        let outer = Expr::call(Expr::ident("outer"), vec![], vec![Expr::array(vec![inner])]);
        let mut unit = Unit::new("u").with(Stmt::Expr { expr: outer });

        let mut seen = Vec::new();
        unit.visit_calls_mut(&mut |call: &mut Call| -> Result<(), ()> {
            seen.push(call.callee.as_ident().unwrap_or_default().to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["inner", "outer"]);
    }
}
