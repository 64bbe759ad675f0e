//! The immutable input unit that flows through every pipeline stage.

use crate::error::OcrChunkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A byte blob plus its declared media type and display name.
///
/// Never mutated: compression and splitting produce new `SourceFile`s. Bytes
/// sit behind an `Arc` so handing a file to a blocking task is a refcount bump.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    media_type: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes, for moving into blocking tasks.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The file name without its last extension (`"scan.v2.png"` → `"scan.v2"`).
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => &self.name,
            Some(dot) => &self.name[..dot],
        }
    }

    /// Classify the declared media type.
    pub fn kind(&self) -> Result<MediaKind, OcrChunkError> {
        MediaKind::from_media_type(&self.media_type).ok_or_else(|| {
            OcrChunkError::UnsupportedMediaType {
                name: self.name.clone(),
                media_type: self.media_type.clone(),
            }
        })
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// The two input categories the OCR service budgets separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Pdf,
}

impl MediaKind {
    /// Media types the OCR endpoint accepts; everything else is unsupported.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(MediaKind::Pdf),
            "image/png" | "image/jpeg" | "image/jpg" | "image/pjpeg" | "image/webp" => {
                Some(MediaKind::Image)
            }
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => f.write_str("image"),
            MediaKind::Pdf => f.write_str("PDF"),
        }
    }
}
