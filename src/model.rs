// Structural type model handed to the compiler. Pure data, no serde_json::Value here.
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Interned handle naming the static type a node was derived from.
///
/// Handed out by a type provider; equality is identity, never shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginId(u32);

impl OriginId {
    pub const fn new(raw: u32) -> Self { Self(raw) }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeModel {
    pub kind: Kind,
    pub origin: Option<OriginId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Primitive(Primitive),
    Literal(Literal),
    Enum(Vec<Literal>),              // ordered variants
    Object(Vec<Property>),           // ordered, as declared
    ObjectWithIndex {
        props: Vec<Property>,
        index: IndexSignature,
    },
    Index(IndexSignature),           // homogeneous dictionary
    Array(Box<TypeModel>),
    Tuple(Vec<TypeModel>),           // exact arity
    Union(Vec<TypeModel>),           // any-of
    Intersection(Vec<TypeModel>),    // all-of
    Unsupported(UnsupportedShape),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Unconstrained(Erased),
}

/// Shapes with no stable JSON representation; they validate as "anything".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Erased {
    Any,
    Unknown,
    Never,
    Void,
    Symbol,
    UniqueSymbol,
    BigInt,
    BigIntLiteral,
    TypeParameter,
    Callable,
    Unidentified,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    String(String),
    Number(OrderedFloat<f64>),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: TypeModel,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSignature {
    pub key: Box<TypeModel>,
    pub value: Box<TypeModel>,
}

/// Type operators the compiler refuses to guess a validator for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedShape {
    IndexedAccess,
    Conditional,
    Substitution,
    NonPrimitive,
    Recursive(String),
}

impl fmt::Display for UnsupportedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexedAccess => f.write_str("indexed access type"),
            Self::Conditional => f.write_str("conditional type"),
            Self::Substitution => f.write_str("substitution type"),
            Self::NonPrimitive => f.write_str("non-primitive `object` type"),
            Self::Recursive(name) => write!(f, "recursive reference to `{name}`"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Number(n) => f.write_str(&format_number(n.0)),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl Literal {
    pub fn number(n: f64) -> Self { Self::Number(OrderedFloat(n)) }

    /// JSON value this literal matches.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::from(s.clone()),
            Self::Number(n) => json_number(n.0),
            Self::Boolean(b) => serde_json::Value::from(*b),
        }
    }
}

// prefer emitting integers when exact
pub(crate) fn json_number(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Value::from(n)
    }
}

pub(crate) fn format_number(n: f64) -> String {
    json_number(n).to_string()
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTORS
// ————————————————————————————————————————————————————————————————————————————

impl TypeModel {
    pub fn new(kind: Kind) -> Self { Self { kind, origin: None } }

    pub fn with_origin(mut self, origin: OriginId) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn primitive(p: Primitive) -> Self { Self::new(Kind::Primitive(p)) }
    pub fn string() -> Self { Self::primitive(Primitive::String) }
    pub fn number() -> Self { Self::primitive(Primitive::Number) }
    pub fn boolean() -> Self { Self::primitive(Primitive::Boolean) }
    pub fn null() -> Self { Self::primitive(Primitive::Null) }
    pub fn undefined() -> Self { Self::primitive(Primitive::Undefined) }
    pub fn erased(why: Erased) -> Self { Self::primitive(Primitive::Unconstrained(why)) }
    pub fn literal(lit: Literal) -> Self { Self::new(Kind::Literal(lit)) }
    pub fn enumeration(variants: Vec<Literal>) -> Self { Self::new(Kind::Enum(variants)) }
    pub fn object(props: Vec<Property>) -> Self { Self::new(Kind::Object(props)) }
    pub fn array(item: TypeModel) -> Self { Self::new(Kind::Array(Box::new(item))) }
    pub fn tuple(elems: Vec<TypeModel>) -> Self { Self::new(Kind::Tuple(elems)) }
    pub fn union(alts: Vec<TypeModel>) -> Self { Self::new(Kind::Union(alts)) }
    pub fn intersection(members: Vec<TypeModel>) -> Self { Self::new(Kind::Intersection(members)) }
    pub fn unsupported(shape: UnsupportedShape) -> Self { Self::new(Kind::Unsupported(shape)) }

    pub fn index(key: TypeModel, value: TypeModel) -> Self {
        Self::new(Kind::Index(IndexSignature::new(key, value)))
    }

    pub fn object_with_index(props: Vec<Property>, index: IndexSignature) -> Self {
        Self::new(Kind::ObjectWithIndex { props, index })
    }

    pub fn is_number(&self) -> bool {
        matches!(self.kind, Kind::Primitive(Primitive::Number))
    }
}

impl IndexSignature {
    pub fn new(key: TypeModel, value: TypeModel) -> Self {
        Self { key: Box::new(key), value: Box::new(value) }
    }
}

impl Property {
    pub fn required(name: impl Into<String>, ty: TypeModel) -> Self {
        Self { name: name.into(), ty, optional: false }
    }
    pub fn optional(name: impl Into<String>, ty: TypeModel) -> Self {
        Self { name: name.into(), ty, optional: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_equal_nodes_differ_by_origin() {
        let a = TypeModel::string().with_origin(OriginId::new(7));
        let b = TypeModel::string().with_origin(OriginId::new(8));
        assert_eq!(a.kind, b.kind);
        assert_ne!(a, b);
    }

    #[test]
    fn number_literals_print_like_json() {
        assert_eq!(Literal::number(4.0).to_string(), "4");
        assert_eq!(Literal::number(1.5).to_string(), "1.5");
        assert_eq!(Literal::String("a".into()).to_string(), "\"a\"");
        assert_eq!(Literal::number(9.0).to_json(), serde_json::json!(9));
    }

    #[test]
    fn integers_past_i64_stay_floats() {
        let two_63 = 9_223_372_036_854_775_808.0;
        let json = Literal::number(two_63).to_json();
        assert_eq!(json.as_i64(), None);
        assert_eq!(json.as_f64(), Some(two_63));
        assert_eq!(Literal::number(-two_63).to_json().as_i64(), Some(i64::MIN));
    }
}
