//! Error types for cvshist-state

use thiserror::Error;

use crate::digest::Digest;

/// Errors that can occur in the artifact persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Blob missing from the store
    #[error("artifact blob not found: {0}")]
    NotFound(Digest),

    /// Malformed hex digest
    #[error("invalid digest hex: {0}")]
    InvalidDigest(String),

    /// Stored bytes no longer hash to the recorded digest
    #[error("artifact '{name}' is corrupt: expected digest {expected}, got {actual}")]
    DigestMismatch {
        name: String,
        expected: Digest,
        actual: Digest,
    },

    /// Manifest could not be interpreted
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_mismatch_names_artifact_and_both_digests() {
        let expected = Digest::compute(b"a");
        let actual = Digest::compute(b"b");
        let msg = StateError::DigestMismatch {
            name: "changesets".to_string(),
            expected,
            actual,
        }
        .to_string();
        assert!(msg.contains("changesets"));
        assert!(msg.contains(&expected.to_hex()));
        assert!(msg.contains(&actual.to_hex()));
    }
}
