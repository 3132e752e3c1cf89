//! Attachment encoding.
//!
//! Attachments arrive as raw bytes or as a path to read; they leave as
//! [`ContentItem::ImageRef`] values carrying a base64 `data:` URI, so the
//! session never holds a file handle.

use std::path::{Path, PathBuf};

use base64::Engine;
use bytes::Bytes;

use crate::observability::{ATTACHMENTS_ENCODED, ATTACHMENT_ERRORS, ATTACHMENT_BYTES};
use crate::types::ContentItem;
use crate::{Error, Result};

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttachmentSource {
    Bytes(Bytes),
    Path(PathBuf),
}

/// A binary image input supplied alongside a message.
///
/// Media types are expected to have been checked upstream and are not
/// re-validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    source: AttachmentSource,
    media_type: Option<String>,
}

impl Attachment {
    /// An attachment whose bytes are already in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: AttachmentSource::Bytes(bytes.into()),
            media_type: None,
        }
    }

    /// An attachment read from `path` when the send encodes it.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: AttachmentSource::Path(path.into()),
            media_type: None,
        }
    }

    /// Declare the media type instead of sniffing it.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// A short label for log and error messages.
    pub fn label(&self) -> String {
        match &self.source {
            AttachmentSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            AttachmentSource::Path(path) => path.display().to_string(),
        }
    }

    async fn read(&self) -> Result<Bytes> {
        match &self.source {
            AttachmentSource::Bytes(bytes) => Ok(bytes.clone()),
            AttachmentSource::Path(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|err| {
                    Error::encoding(
                        format!("failed to read {}: {err}", path.display()),
                        Some(Box::new(err)),
                    )
                }),
        }
    }

    fn resolve_media_type(&self, bytes: &[u8]) -> String {
        if let Some(media_type) = &self.media_type {
            return media_type.clone();
        }
        if let Some(sniffed) = sniff_media_type(bytes) {
            return sniffed.to_string();
        }
        if let AttachmentSource::Path(path) = &self.source
            && let Some(by_extension) = media_type_from_extension(path)
        {
            return by_extension.to_string();
        }
        FALLBACK_MEDIA_TYPE.to_string()
    }

    /// Decode this attachment into an image content item.
    pub async fn encode(&self) -> Result<ContentItem> {
        let bytes = self.read().await?;
        if bytes.is_empty() {
            return Err(Error::encoding(
                format!("{} is empty", self.label()),
                None,
            ));
        }
        let media_type = self.resolve_media_type(&bytes);
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
        ATTACHMENT_BYTES.count(bytes.len() as u64);
        Ok(ContentItem::image_ref(format!(
            "data:{media_type};base64,{data}"
        )))
    }
}

/// Encode `attachments` in order, one image item per input.
///
/// The first attachment that fails stops the whole operation; items already
/// encoded are discarded.
pub async fn encode_attachments(attachments: &[Attachment]) -> Result<Vec<ContentItem>> {
    let mut items = Vec::with_capacity(attachments.len());
    for (index, attachment) in attachments.iter().enumerate() {
        match attachment.encode().await {
            Ok(item) => {
                ATTACHMENTS_ENCODED.click();
                items.push(item);
            }
            Err(err) => {
                ATTACHMENT_ERRORS.click();
                tracing::warn!(index, attachment = %attachment.label(), error = %err, "attachment encoding failed");
                return Err(match err {
                    Error::Encoding { message, source } => Error::Encoding {
                        message: format!("attachment {}: {message}", index + 1),
                        source,
                    },
                    other => other,
                });
            }
        }
    }
    Ok(items)
}

fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.starts_with(PNG) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if is_bmp(bytes) {
        Some("image/bmp")
    } else {
        None
    }
}

// "BM", then zeroed reserved bytes and a known DIB header size.
fn is_bmp(bytes: &[u8]) -> bool {
    if bytes.len() < 18 || !bytes.starts_with(b"BM") || bytes[6..10] != [0, 0, 0, 0] {
        return false;
    }
    let dib = u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]);
    matches!(dib, 12 | 40 | 52 | 56 | 64 | 108 | 124)
}

fn media_type_from_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}
