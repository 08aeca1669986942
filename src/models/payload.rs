use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Hard cap on accepted image payloads (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Whitelisted image MIME types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum ImageMime {
    #[strum(serialize = "image/jpeg")]
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[strum(serialize = "image/png")]
    #[serde(rename = "image/png")]
    Png,
    #[strum(serialize = "image/webp")]
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageMime {
    /// Parse a declared content type against the whitelist.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        content_type.trim().parse().ok()
    }
}

/// An in-memory image produced by exactly one acquisition event (file pick,
/// drop, or camera capture). Immutable once created; the bytes are only
/// reachable through [`ImagePayload::bytes`].
///
/// Serializes with the raw bytes as base64 so records and snapshots stay
/// lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    #[serde(with = "base64_bytes")]
    bytes: Vec<u8>,
    mime: ImageMime,
}

impl ImagePayload {
    /// Invariants (non-empty, within [`MAX_UPLOAD_BYTES`], sniffed format) are
    /// enforced by the acquisition adapter before this is called.
    pub(crate) fn new(bytes: Vec<u8>, mime: ImageMime) -> Self {
        debug_assert!(!bytes.is_empty() && bytes.len() <= MAX_UPLOAD_BYTES);
        Self { bytes, mime }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
