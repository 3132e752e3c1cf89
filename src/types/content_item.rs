use serde::{Deserialize, Serialize};

/// One item of user-authored content.
///
/// Items are kept in insertion order; front ends render them in sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Plain text typed by the user.
    Text {
        /// The text as entered.
        value: String,
    },

    /// An embedded image, carried as a self-contained `data:` URI.
    ImageRef {
        /// The `data:<media-type>;base64,<payload>` URI.
        uri: String,
    },
}

impl ContentItem {
    /// Create a text item.
    pub fn text(value: impl Into<String>) -> Self {
        ContentItem::Text {
            value: value.into(),
        }
    }

    /// Create an image item from an already-embedded URI.
    pub fn image_ref(uri: impl Into<String>) -> Self {
        ContentItem::ImageRef { uri: uri.into() }
    }

    /// Returns the text value if this is a text item.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentItem::Text { value } => Some(value),
            ContentItem::ImageRef { .. } => None,
        }
    }

    /// Returns the URI if this is an image item.
    pub fn as_image_uri(&self) -> Option<&str> {
        match self {
            ContentItem::Text { .. } => None,
            ContentItem::ImageRef { uri } => Some(uri),
        }
    }

    /// Returns true if this is an image item.
    pub fn is_image(&self) -> bool {
        matches!(self, ContentItem::ImageRef { .. })
    }
}

/// The pieces of a `data:` URI produced by the attachment encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    /// The declared media type, e.g. `image/png`.
    pub media_type: &'a str,
    /// The base64 payload.
    pub data: &'a str,
}

impl<'a> DataUri<'a> {
    /// Split a base64 `data:` URI into its media type and payload.
    ///
    /// Returns `None` for anything that is not `data:<type>;base64,<payload>`.
    pub fn parse(uri: &'a str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let media_type = header.strip_suffix(";base64")?;
        Some(Self { media_type, data })
    }
}
