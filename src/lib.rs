//! Type-directed validator compiler.
//!
//! `validate<T>(data, customValidators?)` call sites are rewritten into calls
//! to generated validators whose schemas are compiled from the structural
//! model of `T`. The pipeline: a [`provider::TypeProvider`] resolves `T` into a
//! [`model::TypeModel`], [`bind`] turns custom predicates into origin
//! overrides, [`compile()`] produces a [`schema::Schema`], and [`scan`] does the
//! per-unit rewriting and deduplication.
pub mod model;
pub mod error;
pub mod provider;
pub mod bind;
pub mod compile;
pub mod schema;
pub mod unit;
pub mod module_format;
pub mod scan;
pub mod decl;
pub mod emit;
pub mod runtime;
pub mod config;
pub mod path_de;
pub mod jq_exec;
pub mod cli;

pub use compile::compile;
pub use error::CompileError;
pub use scan::{UnitCompiler, compile_unit, compile_units};
