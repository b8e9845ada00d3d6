//! Runtime import policy per module format.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::unit::{ImportDecl, RequireDecl, Stmt};

/// Module format of the emitted code (the `module` compiler option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModuleFormat {
    None,
    #[default]
    CommonJs,
    Amd,
    Umd,
    System,
    Es2015,
    Es2020,
    Es2022,
    EsNext,
    Node16,
    NodeNext,
}

impl ModuleFormat {
    pub const ALL: [ModuleFormat; 11] = [
        Self::None,
        Self::CommonJs,
        Self::Amd,
        Self::Umd,
        Self::System,
        Self::Es2015,
        Self::Es2020,
        Self::Es2022,
        Self::EsNext,
        Self::Node16,
        Self::NodeNext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CommonJs => "commonjs",
            Self::Amd => "amd",
            Self::Umd => "umd",
            Self::System => "system",
            Self::Es2015 => "es2015",
            Self::Es2020 => "es2020",
            Self::Es2022 => "es2022",
            Self::EsNext => "esnext",
            Self::Node16 => "node16",
            Self::NodeNext => "nodenext",
        }
    }
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "es6" {
            return Ok(Self::Es2015);
        }
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == lower)
            .ok_or_else(|| format!("unknown module format `{s}`"))
    }
}

impl TryFrom<String> for ModuleFormat {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<ModuleFormat> for String {
    fn from(value: ModuleFormat) -> Self { value.as_str().to_string() }
}

/// Statement that brings the concrete runtime library into scope under
/// `binding`, in the form `format` expects.
pub fn runtime_import(format: ModuleFormat, module: &str, binding: &str) -> Result<Stmt, CompileError> {
    match format {
        ModuleFormat::CommonJs => Ok(Stmt::Require(RequireDecl {
            local: binding.to_string(),
            module: module.to_string(),
        })),
        ModuleFormat::Es2015 | ModuleFormat::Es2020 | ModuleFormat::Es2022 | ModuleFormat::EsNext => {
            Ok(Stmt::Import(ImportDecl {
                default: Some(binding.to_string()),
                named: Vec::new(),
                module: module.to_string(),
            }))
        }
        other => Err(CompileError::UnsupportedModuleFormat { format: other }),
    }
}
