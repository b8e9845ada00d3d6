use anyhow::anyhow;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> anyhow::Result<T> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        anyhow!("at JSON path {path} → {}", err.into_inner())
    })
}

/// For documents that were already parsed, e.g. to unwrap an envelope first.
pub fn from_value_with_path<T: DeserializeOwned>(value: Value) -> anyhow::Result<T> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| {
        let path = err.path().to_string();
        anyhow!("at JSON path {path} → {}", err.into_inner())
    })
}
