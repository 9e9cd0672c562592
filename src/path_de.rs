use serde::de::DeserializeOwned;
use thiserror::Error;

/// Deserialization failure annotated with the JSON path it occurred at.
#[derive(Debug, Error)]
#[error("at JSON path {path} → {message}")]
pub struct PathDeError {
    pub path: String,
    pub message: String,
}

impl<E: std::fmt::Display> From<serde_path_to_error::Error<E>> for PathDeError {
    fn from(err: serde_path_to_error::Error<E>) -> Self {
        Self { path: err.path().to_string(), message: err.inner().to_string() }
    }
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathDeError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    Ok(serde_path_to_error::deserialize::<_, T>(de)?)
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PathDeError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    Ok(serde_path_to_error::deserialize::<_, T>(de)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::EquivalencePolicy;

    #[test]
    fn reports_the_failing_path() {
        let err = from_str_with_path::<EquivalencePolicy>(r#"["numeric_string", "fuzzy"]"#).unwrap_err();
        assert_eq!(err.path, "[1]");
        assert!(err.message.contains("fuzzy"));

        let ok: EquivalencePolicy = from_str_with_path(r#"["bool_string"]"#).unwrap();
        assert_eq!(ok.rules().len(), 1);
    }

    #[test]
    fn syntax_errors_are_reported_too() {
        let err = from_slice_with_path::<serde_json::Value>(b"{ \"a\": ").unwrap_err();
        assert!(err.to_string().starts_with("at JSON path"));
    }
}
