//! Generated artifacts returned by a provider turn
//!
//! Artifacts are transient: the formatter either hands them to an
//! [`ArtifactStore`](crate::storage::ArtifactStore) or embeds them inline.
//! Nothing here is persisted by the session manager.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Default MIME type when a provider omits one
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// A generated media item (usually an image)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Raw bytes
    pub data: Vec<u8>,
    /// MIME type, e.g. "image/png"
    pub mime_type: String,
}

impl Artifact {
    pub fn new(data: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        Self {
            data: data.into(),
            mime_type: if mime_type.is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                mime_type
            },
        }
    }

    /// Size of the raw payload in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Length the base64 encoding would have, without encoding
    pub fn encoded_len(&self) -> usize {
        self.data.len().div_ceil(3) * 4
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// `data:` URI suitable for markdown image embedding
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Token usage reported for a single turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub artifacts_generated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mime_defaults_to_png() {
        let artifact = Artifact::new(vec![1, 2, 3], "");
        assert_eq!(artifact.mime_type, "image/png");
    }

    #[test]
    fn test_encoded_len_matches_encoding() {
        for n in [0usize, 1, 2, 3, 4, 5, 100, 1001] {
            let artifact = Artifact::new(vec![7u8; n], "image/jpeg");
            assert_eq!(artifact.encoded_len(), artifact.to_base64().len(), "n = {}", n);
        }
    }

    #[test]
    fn test_data_uri_prefix() {
        let artifact = Artifact::new(b"hi".to_vec(), "image/webp");
        assert_eq!(artifact.data_uri(), "data:image/webp;base64,aGk=");
    }
}
