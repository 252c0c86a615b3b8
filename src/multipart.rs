//! Multipart upload encoding for query attachments
//!
//! The receiving scripts expect exactly one form-data part named
//! `attachment`, framed by a fixed boundary token.

/// Boundary token used for every multipart body
pub const BOUNDARY: &str = "--abcdef123abcdef123";

/// A single named file carried by a query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// File name reported to the server
    pub name: String,
    /// File content
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create a new attachment
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// An attachment with no name or no content is not sent
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() || self.data.is_empty()
    }
}

/// Value of the `Content-Type` request header for a multipart body
pub fn content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Encode the attachment as a complete multipart/form-data body
pub fn encode(attachment: &Attachment) -> Vec<u8> {
    let head = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"attachment\"; filename=\"{}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n",
        attachment.name
    );
    let tail = format!("\r\n--{BOUNDARY}--\r\n");

    let mut body = Vec::with_capacity(head.len() + attachment.data.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(&attachment.data);
    body.extend_from_slice(tail.as_bytes());
    body
}
