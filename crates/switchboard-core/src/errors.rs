//! Codec error types.

use thiserror::Error;

/// A frame or engine command could not be decoded.
///
/// Never fatal: the caller drops the offending frame and carries on.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not valid JSON, or not the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn malformed_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = DecodeError::from(json_err);
        assert!(err.to_string().starts_with("malformed payload"));
        assert_matches!(err, DecodeError::Malformed(_));
    }
}
