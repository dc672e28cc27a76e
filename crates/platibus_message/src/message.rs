use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::headers::Headers;

/// A bus message: an envelope of headers plus opaque content bytes.
///
/// Messages are immutable once constructed. Code that needs to restamp
/// headers (the transport rewriting `Destination` during fan-out, for
/// example) clones the header block, edits the clone and builds a new
/// message around the same content; `Bytes` makes the content clone cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    headers: Headers,
    content: Bytes,
}

impl Message {
    pub fn new(headers: Headers, content: impl Into<Bytes>) -> Self {
        Self {
            headers,
            content: content.into(),
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Rebuild this message around the same content with a different header
    /// block.
    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            headers,
            content: self.content.clone(),
        }
    }

    /// True when the `Expires` header is set and lies in the past. Expired
    /// messages must not be dispatched.
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.headers.expires(), Some(expires) if expires <= now)
    }

    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }
}
