//! Type declaration front end.
//!
//! Reads a small declaration language (type aliases, interfaces, enums and
//! predicate function signatures), and resolves type expressions written
//! against it into [`TypeModel`](crate::model::TypeModel)s. [`TypeTable`] is
//! the [`TypeProvider`](crate::provider::TypeProvider) the CLI and tests use.
pub mod lexer;
pub mod parser;
pub mod resolve;

use std::fmt;

use thiserror::Error;

use crate::model::Literal;

pub use parser::{parse_file, parse_type};
pub use resolve::TypeTable;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (at offset {offset})")]
pub struct DeclError {
    pub message: String,
    pub offset: usize,
}

impl DeclError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self { message: message.into(), offset }
    }

    /// 1-based line and column of the error within `src`.
    pub fn line_col(&self, src: &str) -> (usize, usize) {
        let upto = &src[..self.offset.min(src.len())];
        let line = upto.matches('\n').count() + 1;
        let col = upto.rsplit('\n').next().map_or(0, |tail| tail.chars().count()) + 1;
        (line, col)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SYNTAX
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Any,
    Unknown,
    Never,
    Void,
    Symbol,
    BigInt,
    Object,
}

impl Keyword {
    pub const ALL: [Keyword; 12] = [
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::Null,
        Self::Undefined,
        Self::Any,
        Self::Unknown,
        Self::Never,
        Self::Void,
        Self::Symbol,
        Self::BigInt,
        Self::Object,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Any => "any",
            Self::Unknown => "unknown",
            Self::Never => "never",
            Self::Void => "void",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
            Self::Object => "object",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == word)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Keyword(Keyword),
    UniqueSymbol,
    Literal(Literal),
    /// Digits only, without the trailing `n`.
    BigInt(String),
    /// `Name`, `Name<A, B>` or `Enum.Member`.
    Ref { name: String, args: Vec<TypeExpr> },
    Object(Vec<Member>),
    Array(Box<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
    IndexedAccess { object: Box<TypeExpr>, index: Box<TypeExpr> },
    Conditional {
        check: Box<TypeExpr>,
        extends: Box<TypeExpr>,
        then: Box<TypeExpr>,
        otherwise: Box<TypeExpr>,
    },
    Function { params: Vec<Param>, ret: Box<TypeExpr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Property { name: String, ty: TypeExpr, optional: bool, readonly: bool },
    Index { param: String, key: TypeExpr, value: TypeExpr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub default: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Alias { name: String, params: Vec<TypeParam>, body: TypeExpr },
    Interface { name: String, params: Vec<TypeParam>, extends: Vec<TypeExpr>, members: Vec<Member> },
    Enum { name: String, members: Vec<(String, Literal)> },
    Function { name: String, params: Vec<Param>, returns: ReturnType },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnType {
    /// `param is ty`
    Predicate { param: String, ty: TypeExpr },
    Type(TypeExpr),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Self::Alias { name, .. }
            | Self::Interface { name, .. }
            | Self::Enum { name, .. }
            | Self::Function { name, .. } => name,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CANONICAL PRINTING
// ————————————————————————————————————————————————————————————————————————————

impl TypeExpr {
    // binds looser than an array suffix or an intersection operand
    fn needs_parens(&self) -> bool {
        matches!(
            self,
            Self::Union(_) | Self::Intersection(_) | Self::Conditional { .. } | Self::Function { .. }
        )
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, tight: bool) -> fmt::Result {
        if tight && self.needs_parens() {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword(k) => f.write_str(k.as_str()),
            Self::UniqueSymbol => f.write_str("unique symbol"),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::BigInt(digits) => write!(f, "{digits}n"),
            Self::Ref { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    join(f, args, ", ")?;
                    f.write_str(">")?;
                }
                Ok(())
            }
            Self::Object(members) if members.is_empty() => f.write_str("{}"),
            Self::Object(members) => {
                f.write_str("{ ")?;
                join(f, members, "; ")?;
                f.write_str(" }")
            }
            Self::Array(item) => {
                item.fmt_operand(f, true)?;
                f.write_str("[]")
            }
            Self::Tuple(elems) => {
                f.write_str("[")?;
                join(f, elems, ", ")?;
                f.write_str("]")
            }
            Self::Union(alts) => {
                for (i, alt) in alts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    let tight = matches!(alt, Self::Conditional { .. } | Self::Function { .. });
                    alt.fmt_operand(f, tight)?;
                }
                Ok(())
            }
            Self::Intersection(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    member.fmt_operand(f, true)?;
                }
                Ok(())
            }
            Self::IndexedAccess { object, index } => {
                object.fmt_operand(f, true)?;
                write!(f, "[{index}]")
            }
            Self::Conditional { check, extends, then, otherwise } => {
                write!(f, "{check} extends {extends} ? {then} : {otherwise}")
            }
            Self::Function { params, ret } => {
                f.write_str("(")?;
                join(f, params, ", ")?;
                write!(f, ") => {ret}")
            }
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property { name, ty, optional, readonly } => {
                if *readonly {
                    f.write_str("readonly ")?;
                }
                write!(f, "{name}{}: {ty}", if *optional { "?" } else { "" })
            }
            Self::Index { param, key, value } => write!(f, "[{param}: {key}]: {value}"),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rest = if self.rest { "..." } else { "" };
        let opt = if self.optional { "?" } else { "" };
        write!(f, "{rest}{}{opt}: {}", self.name, self.ty)
    }
}
