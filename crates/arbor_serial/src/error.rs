//! Hard serializer failures. Soft findings go through [`crate::Notes`].

/// Errors that abort a serialize or deserialize call.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("No schema registered for type: {0}")]
    NoSchema(String),

    #[error("Type {name} does not expose the {expected} capability")]
    WrongKind {
        name: &'static str,
        expected: &'static str,
    },

    #[error("Value nesting exceeded depth {0}; the object graph is likely cyclic")]
    DepthExceeded(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SerialError::UnknownType("Widget".to_string());
        assert_eq!(err.to_string(), "Unknown type: Widget");

        let err = SerialError::WrongKind {
            name: "Widget",
            expected: "list",
        };
        assert_eq!(
            err.to_string(),
            "Type Widget does not expose the list capability"
        );
    }
}
