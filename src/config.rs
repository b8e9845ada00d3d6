//! Compiler options. Read from a JSON file, either flat or nested under
//! `compilerOptions` the way a tsconfig lays them out.
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::module_format::ModuleFormat;
use crate::path_de;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Strict-null mode of every unit; off means fields are implicitly nullable.
    pub strict_null_checks: bool,
    pub module: ModuleFormat,
    /// Module whose `entry_name` export gets compiled away.
    pub entry_module: String,
    pub entry_name: String,
    pub runtime_module: String,
    pub runtime_binding: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict_null_checks: false,
            module: ModuleFormat::CommonJs,
            entry_module: "guardgen".to_string(),
            entry_name: "validate".to_string(),
            runtime_module: "superstruct".to_string(),
            runtime_binding: "superstruct".to_string(),
        }
    }
}

impl Options {
    pub fn from_json_str(src: &str) -> anyhow::Result<Self> {
        let mut value: Value = serde_json::from_str(src).context("options are not valid JSON")?;
        if let Some(nested) = value.get_mut("compilerOptions") {
            value = nested.take();
        }
        // tsconfig files carry plenty of keys this compiler has no use for
        if let Value::Object(map) = &mut value {
            map.retain(|key, _| KNOWN_KEYS.contains(&key.as_str()));
        }
        path_de::from_value_with_path(value)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&src).with_context(|| format!("invalid options in {}", path.display()))
    }
}

const KNOWN_KEYS: &[&str] = &[
    "strictNullChecks",
    "module",
    "entryModule",
    "entryName",
    "runtimeModule",
    "runtimeBinding",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::from_json_str("{}").unwrap();
        assert_eq!(options, Options::default());
        assert!(!options.strict_null_checks);
        assert_eq!(options.module, ModuleFormat::CommonJs);
    }

    #[test]
    fn reads_nested_tsconfig_layout() {
        let options = Options::from_json_str(
            r#"{"compilerOptions": {"strictNullChecks": true, "module": "ESNext", "target": "es2019"}, "include": ["src"]}"#,
        )
        .unwrap();
        assert!(options.strict_null_checks);
        assert_eq!(options.module, ModuleFormat::EsNext);
        assert_eq!(options.entry_name, "validate");
    }

    #[test]
    fn bad_values_name_their_field() {
        let err = Options::from_json_str(r#"{"module": "jsonp"}"#).unwrap_err();
        assert!(format!("{err:#}").contains("module"), "{err:#}");
    }
}
