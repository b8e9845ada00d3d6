//! Evaluator for compiled units: runs the rewritten calls against the schema
//! runtime so a unit's behaviour can be checked without a JavaScript engine.
use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::schema::{Predicates, SchemaError, ValidationFailure};
use crate::unit::{Expr, Stmt, Unit, ValidatorFn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("unbound identifier `{name}`")]
    UnboundIdentifier { name: String },

    /// An imported entry point reached run time: its call site was never compiled.
    #[error("`{name}` is a compile-time stub; the call was not rewritten")]
    StubInvoked { name: String },

    #[error("`{callee}` is not callable")]
    NotCallable { callee: String },

    #[error("unsupported expression: {what}")]
    UnsupportedExpression { what: String },
}

enum Binding<'u> {
    Data(Value),
    Validator(&'u ValidatorFn),
    /// A named import; only ever the uncompiled entry point.
    Imported,
    /// A whole module (default import or `require`).
    Module,
}

/// Evaluate `unit`, returning its `const` bindings in declaration order.
/// Validator functions are hoisted, like function declarations.
pub fn run(unit: &Unit, predicates: &Predicates) -> Result<IndexMap<String, Value>, RunError> {
    let mut scope: HashMap<&str, Binding> = unit
        .validators()
        .map(|func| (func.name.as_str(), Binding::Validator(func)))
        .collect();
    let mut out = IndexMap::new();

    for stmt in &unit.body {
        match stmt {
            Stmt::Import(decl) => {
                if let Some(default) = &decl.default {
                    scope.insert(default, Binding::Module);
                }
                for spec in &decl.named {
                    scope.insert(spec.local_name(), Binding::Imported);
                }
            }
            Stmt::Require(decl) => {
                scope.insert(&decl.local, Binding::Module);
            }
            Stmt::Const { name, init } => {
                let value = eval(init, &scope, predicates)?;
                out.insert(name.clone(), value.clone());
                scope.insert(name, Binding::Data(value));
            }
            Stmt::Expr { expr } => {
                eval(expr, &scope, predicates)?;
            }
            Stmt::Validator(_) => {}
        }
    }
    Ok(out)
}

fn eval(expr: &Expr, scope: &HashMap<&str, Binding>, predicates: &Predicates) -> Result<Value, RunError> {
    match expr {
        Expr::Json { value } => Ok(value.clone()),
        Expr::Array { items } => items
            .iter()
            .map(|item| eval(item, scope, predicates))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Ident { name } => match scope.get(name.as_str()) {
            Some(Binding::Data(value)) => Ok(value.clone()),
            Some(_) => Err(RunError::UnsupportedExpression { what: format!("function `{name}` used as a value") }),
            None => Err(RunError::UnboundIdentifier { name: name.clone() }),
        },
        Expr::Member { property, .. } => {
            Err(RunError::UnsupportedExpression { what: format!("member access `.{property}`") })
        }
        Expr::Call(call) => {
            let Some(callee) = call.callee.as_ident() else {
                return Err(RunError::NotCallable { callee: crate::emit::expr(&call.callee) });
            };
            let func = match scope.get(callee) {
                Some(Binding::Validator(func)) => *func,
                Some(Binding::Imported) => return Err(RunError::StubInvoked { name: callee.to_string() }),
                Some(Binding::Data(_) | Binding::Module) => {
                    return Err(RunError::NotCallable { callee: callee.to_string() });
                }
                None => return Err(RunError::UnboundIdentifier { name: callee.to_string() }),
            };
            let data = match call.args.first() {
                Some(arg) => eval(arg, scope, predicates)?,
                None => {
                    return Err(RunError::UnsupportedExpression { what: format!("`{callee}` called without data") });
                }
            };
            trace!(validator = %func.name, "validating");
            Ok(func.schema.instantiate(predicates)?.validate(&data)?)
        }
    }
}
