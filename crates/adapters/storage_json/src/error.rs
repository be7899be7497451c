//! Storage-specific error type wrapping file and JSON errors.

use std::path::PathBuf;

use relayhub_domain::error::RelayError;

/// Errors originating from the JSON file storage layer.
#[derive(Debug, thiserror::Error)]
pub enum JsonStoreError {
    /// Reading, writing or renaming a file failed.
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file exists but does not hold the expected JSON document.
    #[error("malformed JSON in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration could not be serialised.
    #[error("failed to serialise configuration")]
    Serialize(#[from] serde_json::Error),
}

impl From<JsonStoreError> for RelayError {
    fn from(err: JsonStoreError) -> Self {
        Self::Storage(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_into_storage_error() {
        let err: RelayError = JsonStoreError::Io {
            path: PathBuf::from("config.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert!(matches!(err, RelayError::Storage(_)));
    }

    #[test]
    fn should_name_file_in_parse_error() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = JsonStoreError::Parse {
            path: PathBuf::from("gpio_mapping.json"),
            source,
        };
        assert_eq!(err.to_string(), "malformed JSON in gpio_mapping.json");
    }
}
