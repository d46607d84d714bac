use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// An image attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// MIME type such as `image/png`.
    pub media_type: String,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

impl ImageAttachment {
    /// Creates an attachment from raw bytes.
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }

    /// Reads an image from disk, inferring the media type from its extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let media_type = media_type_for(path).ok_or_else(|| {
            Error::validation(format!("unsupported image type: {}", path.display()))
        })?;
        let data = std::fs::read(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Ok(Self::new(media_type, data))
    }

    /// Encodes the image as a `data:` URL for transport.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.data))
    }
}

fn media_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
