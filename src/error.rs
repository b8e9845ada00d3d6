use thiserror::Error;

use crate::model::UnsupportedShape;
use crate::module_format::ModuleFormat;

/// Fatal, unit-level errors. Any of these aborts the unit being compiled;
/// nothing generated for it is kept.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The requested type decomposes into a shape with no safe schema.
    #[error("unsupported type shape: {shape}")]
    UnsupportedTypeShape { shape: UnsupportedShape },

    /// The configured module format has no runtime import form.
    #[error("unsupported module format `{format}`: only CommonJS and ES2015+ module targets are supported")]
    UnsupportedModuleFormat { format: ModuleFormat },

    /// A type argument names something the provider does not know.
    #[error("cannot resolve type `{name}`")]
    UnresolvedType { name: String },

    /// A type argument could not be read at all.
    #[error("invalid type argument `{text}`: {reason}")]
    InvalidTypeArgument { text: String, reason: String },
}

impl CompileError {
    pub fn unsupported(shape: UnsupportedShape) -> Self {
        Self::UnsupportedTypeShape { shape }
    }
}
