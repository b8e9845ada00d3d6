//! Schema runtime: the expression algebra generated validators are built from.
//!
//! A [`Schema`] is pure data (printable, serializable). Binding it to a
//! [`Predicates`] registry yields a [`Struct`], which validates JSON values and
//! reports failures with the JSON path of the offending value.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::model::Literal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "camelCase")]
pub enum Schema {
    Any,
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Literal(Literal),
    OneOf(Vec<Schema>),
    AllOf(Vec<Schema>),
    Optional(Box<Schema>),
    Record {
        fields: IndexMap<String, Schema>,
        /// Undeclared keys are rejected.
        exact: bool,
    },
    Dict {
        key: Box<Schema>,
        value: Box<Schema>,
    },
    List(Box<Schema>),
    Tuple(Vec<Schema>),
    /// Named predicate supplied at instantiation time.
    Custom(String),
}

impl Schema {
    pub fn nullable(inner: Schema) -> Self { Self::OneOf(vec![Self::Null, inner]) }
    pub fn optional(inner: Schema) -> Self { Self::Optional(Box::new(inner)) }
    pub fn list(item: Schema) -> Self { Self::List(Box::new(item)) }
    pub fn dict(key: Schema, value: Schema) -> Self {
        Self::Dict { key: Box::new(key), value: Box::new(value) }
    }

    /// Names of every predicate this schema refers to, in first-use order.
    pub fn predicate_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_predicates(&mut out);
        out
    }

    fn collect_predicates<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Custom(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::OneOf(xs) | Self::AllOf(xs) | Self::Tuple(xs) => {
                xs.iter().for_each(|x| x.collect_predicates(out))
            }
            Self::Optional(x) | Self::List(x) => x.collect_predicates(out),
            Self::Record { fields, .. } => fields.values().for_each(|x| x.collect_predicates(out)),
            Self::Dict { key, value } => {
                key.collect_predicates(out);
                value.collect_predicates(out);
            }
            Self::Any | Self::String | Self::Number | Self::Boolean | Self::Null
            | Self::Undefined | Self::Literal(_) => {}
        }
    }

    /// Bind predicate references; fails if any is not registered.
    pub fn instantiate<'a>(&'a self, predicates: &'a Predicates) -> Result<Struct<'a>, SchemaError> {
        for name in self.predicate_names() {
            if predicates.get(name).is_none() {
                return Err(SchemaError::UnknownPredicate { name: name.to_string() });
            }
        }
        Ok(Struct { schema: self, predicates })
    }

    // short label used in failure messages for composite shapes
    fn expected_label(&self) -> String {
        match self {
            Self::Record { .. } | Self::Dict { .. } => "object".to_string(),
            Self::List(_) => "array".to_string(),
            Self::Tuple(xs) => format!("tuple of length {}", xs.len()),
            other => other.to_string(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PREDICATES
// ————————————————————————————————————————————————————————————————————————————

pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Runtime implementations of custom validators, by reference name.
#[derive(Clone, Default)]
pub struct Predicates {
    table: HashMap<String, Predicate>,
}

impl Predicates {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, name: impl Into<String>, f: impl Fn(&Value) -> bool + Send + Sync + 'static) {
        self.table.insert(name.into(), Arc::new(f));
    }

    pub fn with(mut self, name: impl Into<String>, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.insert(name, f);
        self
    }

    /// Predicate accepting strings matched by `pattern`.
    pub fn insert_pattern(&mut self, name: impl Into<String>, pattern: Regex) {
        self.insert(name, move |value| value.as_str().is_some_and(|s| pattern.is_match(s)));
    }

    pub fn get(&self, name: &str) -> Option<&Predicate> { self.table.get(name) }

    pub fn is_empty(&self) -> bool { self.table.is_empty() }
}

impl fmt::Debug for Predicates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.table.keys().collect();
        names.sort();
        f.debug_struct("Predicates").field("names", &names).finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALIDATION
// ————————————————————————————————————————————————————————————————————————————

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("no custom validator registered under `{name}`")]
    UnknownPredicate { name: String },
}

/// Runtime rejection of a value by a schema.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("validation failed at {path}: expected {expected}, found {found}")]
pub struct ValidationFailure {
    pub path: JsonPath,
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonPath(Vec<Segment>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for seg in &self.0 {
            match seg {
                Segment::Index(i) => write!(f, "[{i}]")?,
                Segment::Key(k) if is_plain_key(k) => write!(f, ".{k}")?,
                Segment::Key(k) => write!(f, "[{k:?}]")?,
            }
        }
        Ok(())
    }
}

fn is_plain_key(k: &str) -> bool {
    let mut chars = k.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// A schema bound to its predicates, ready to validate.
#[derive(Debug, Clone, Copy)]
pub struct Struct<'a> {
    schema: &'a Schema,
    predicates: &'a Predicates,
}

impl Struct<'_> {
    /// Validate `value`, returning a copy of it when accepted.
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationFailure> {
        let mut path = Vec::new();
        self.check(self.schema, Some(value), &mut path)?;
        Ok(value.clone())
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.check(self.schema, Some(value), &mut Vec::new()).is_ok()
    }

    // `None` is a missing (undefined) value.
    fn check(&self, schema: &Schema, value: Option<&Value>, path: &mut Vec<Segment>) -> Result<(), ValidationFailure> {
        let ok = match (schema, value) {
            (Schema::Any, _) => true,
            (Schema::String, Some(v)) => v.is_string(),
            (Schema::Number, Some(v)) => v.is_number(),
            (Schema::Boolean, Some(v)) => v.is_boolean(),
            (Schema::Null, Some(v)) => v.is_null(),
            (Schema::Undefined, v) => v.is_none(),
            (Schema::Literal(lit), Some(v)) => literal_matches(lit, v),
            (Schema::Optional(_), None) => true,
            (Schema::Optional(inner), Some(_)) => return self.check(inner, value, path),
            (Schema::OneOf(alts), _) => alts.iter().any(|alt| self.check(alt, value, path).is_ok()),
            (Schema::AllOf(members), _) => {
                for member in members {
                    self.check(member, value, path)?;
                }
                true
            }
            (Schema::Record { fields, exact }, Some(Value::Object(map))) => {
                for (name, field) in fields {
                    path.push(Segment::Key(name.clone()));
                    let res = self.check(field, map.get(name), path);
                    path.pop();
                    res?;
                }
                if *exact {
                    if let Some((key, extra)) = map.iter().find(|(k, _)| !fields.contains_key(*k)) {
                        path.push(Segment::Key(key.clone()));
                        let failure = failure(path, "undefined".to_string(), Some(extra));
                        path.pop();
                        return Err(failure);
                    }
                }
                true
            }
            (Schema::Dict { key, value: item }, Some(Value::Object(map))) => {
                for (k, v) in map {
                    path.push(Segment::Key(k.clone()));
                    let key_value = Value::String(k.clone());
                    let res = match self.check(key, Some(&key_value), path) {
                        Ok(()) => self.check(item, Some(v), path),
                        err => err,
                    };
                    path.pop();
                    res?;
                }
                true
            }
            (Schema::List(item), Some(Value::Array(xs))) => {
                for (i, x) in xs.iter().enumerate() {
                    path.push(Segment::Index(i));
                    let res = self.check(item, Some(x), path);
                    path.pop();
                    res?;
                }
                true
            }
            (Schema::Tuple(elems), Some(Value::Array(xs))) if xs.len() <= elems.len() => {
                // positions past the end are checked as undefined
                for (i, elem) in elems.iter().enumerate() {
                    path.push(Segment::Index(i));
                    let res = self.check(elem, xs.get(i), path);
                    path.pop();
                    res?;
                }
                true
            }
            (Schema::Custom(name), Some(v)) => self.predicates.get(name).is_some_and(|p| p(v)),
            (_, _) => false,
        };
        if ok {
            Ok(())
        } else {
            Err(failure(path, schema.expected_label(), value))
        }
    }
}

fn literal_matches(lit: &Literal, v: &Value) -> bool {
    match (lit, v) {
        (Literal::String(a), Value::String(b)) => a == b,
        (Literal::Number(a), Value::Number(b)) => b.as_f64() == Some(a.0),
        (Literal::Boolean(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

fn failure(path: &[Segment], expected: String, found: Option<&Value>) -> ValidationFailure {
    ValidationFailure {
        path: JsonPath(path.to_vec()),
        expected,
        found: describe(found),
    }
}

fn describe(value: Option<&Value>) -> String {
    const MAX: usize = 40;
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => format!("boolean {b}"),
        Some(Value::Number(n)) => format!("number {n}"),
        Some(Value::String(s)) if s.chars().count() > MAX => {
            let head: String = s.chars().take(MAX).collect();
            format!("string \"{head}…\"")
        }
        Some(Value::String(s)) => format!("string {s:?}"),
        Some(Value::Array(xs)) => format!("array of length {}", xs.len()),
        Some(Value::Object(_)) => "object".to_string(),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RENDERING
// ————————————————————————————————————————————————————————————————————————————

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, xs: &[Schema]) -> fmt::Result {
            write!(f, "{name}(")?;
            for (i, x) in xs.iter().enumerate() {
                if i > 0 { f.write_str(", ")?; }
                write!(f, "{x}")?;
            }
            f.write_str(")")
        }
        match self {
            Self::Any => f.write_str("any"),
            Self::String => f.write_str("string"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Null => f.write_str("null"),
            Self::Undefined => f.write_str("undefined"),
            Self::Literal(lit) => write!(f, "literal({lit})"),
            Self::OneOf(xs) => list(f, "union", xs),
            Self::AllOf(xs) => list(f, "intersection", xs),
            Self::Tuple(xs) => list(f, "tuple", xs),
            Self::Optional(x) => write!(f, "optional({x})"),
            Self::List(x) => write!(f, "list({x})"),
            Self::Dict { key, value } => write!(f, "dict({key}, {value})"),
            Self::Custom(name) => write!(f, "custom({name})"),
            Self::Record { fields, exact } => {
                f.write_str(if *exact { "object{" } else { "interface{" })?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Schema {
    /// JSON Schema (2020-12 flavoured) description of what this schema accepts.
    /// Custom predicates surface as `x-predicate`.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::Any => json!({}),
            Self::String => json!({ "type": "string" }),
            Self::Number => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Null => json!({ "type": "null" }),
            Self::Undefined => json!({ "not": {} }),
            Self::Literal(lit) => json!({ "const": lit.to_json() }),
            Self::OneOf(xs) => json!({ "anyOf": xs.iter().map(Self::to_json_schema).collect::<Vec<_>>() }),
            Self::AllOf(xs) => json!({ "allOf": xs.iter().map(Self::to_json_schema).collect::<Vec<_>>() }),
            Self::Optional(x) => x.to_json_schema(),
            Self::List(x) => json!({ "type": "array", "items": x.to_json_schema() }),
            Self::Tuple(xs) => json!({
                "type": "array",
                "prefixItems": xs.iter().map(Self::to_json_schema).collect::<Vec<_>>(),
                "maxItems": xs.len(),
            }),
            Self::Dict { key, value } => json!({
                "type": "object",
                "propertyNames": key.to_json_schema(),
                "additionalProperties": value.to_json_schema(),
            }),
            Self::Custom(name) => json!({ "x-predicate": name }),
            Self::Record { fields, exact } => {
                let mut props = serde_json::Map::new();
                let mut required = Vec::new();
                for (k, v) in fields {
                    props.insert(k.clone(), v.to_json_schema());
                    if !matches!(v, Self::Optional(_)) {
                        required.push(Value::from(k.clone()));
                    }
                }
                let mut o = json!({ "type": "object", "properties": props });
                if !required.is_empty() {
                    o["required"] = Value::Array(required);
                }
                if *exact {
                    o["additionalProperties"] = Value::Bool(false);
                }
                o
            }
        }
    }
}
