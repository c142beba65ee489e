//! Request body shapes.

use serde::{Deserialize, Serialize};

use crate::{FORM_MIME, JSON_MIME, OCTET_STREAM};

/// Binary data with an associated mime type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Mime type of the data (may be empty)
    pub content_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob
    pub fn new(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A body supplied to `fetch` or `XMLHttpRequest::send`.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// UTF-8 text
    Text(String),
    /// Raw bytes (ArrayBuffer / typed array)
    Bytes(Vec<u8>),
    /// Blob with its own mime type
    Blob(Blob),
    /// Url-encoded form fields
    Form(Vec<(String, String)>),
    /// JSON document
    Json(serde_json::Value),
}

impl Body {
    /// The content type implied by the body shape, if any
    pub fn implied_content_type(&self) -> Option<String> {
        match self {
            Body::Text(_) => Some("text/plain;charset=UTF-8".to_string()),
            Body::Bytes(_) => None,
            Body::Blob(blob) if blob.content_type.is_empty() => None,
            Body::Blob(blob) => Some(blob.content_type.clone()),
            Body::Form(_) => Some(format!("{};charset=UTF-8", FORM_MIME)),
            Body::Json(_) => Some(JSON_MIME.to_string()),
        }
    }

    /// Serialize the body into bytes
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Text(text) => text.into_bytes(),
            Body::Bytes(bytes) => bytes,
            Body::Blob(blob) => blob.data,
            Body::Form(fields) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields)
                .finish()
                .into_bytes(),
            Body::Json(value) => value.to_string().into_bytes(),
        }
    }

    /// Split into bytes and the implied content type
    pub fn into_parts(self) -> (Vec<u8>, Option<String>) {
        let content_type = self.implied_content_type();
        (self.into_bytes(), content_type)
    }

    /// Mime type used for a blob when it has none of its own
    pub fn default_binary_type() -> &'static str {
        OCTET_STREAM
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(value)
    }
}

impl From<Blob> for Body {
    fn from(value: Blob) -> Self {
        Body::Blob(value)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}
