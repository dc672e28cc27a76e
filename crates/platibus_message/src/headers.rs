//! Message headers
//!
//! Headers are a case-insensitive mapping of name to string value that
//! preserves insertion order and the casing of the first write. Values may
//! span multiple lines. The typed accessors below cover the fields the bus
//! itself recognizes; applications are free to carry additional headers.

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

/// Names of the headers the bus recognizes.
pub mod names {
    pub const MESSAGE_ID: &str = "MessageId";
    pub const MESSAGE_NAME: &str = "MessageName";
    pub const ORIGINATION: &str = "Origination";
    pub const DESTINATION: &str = "Destination";
    pub const REPLY_TO: &str = "ReplyTo";
    pub const RELATED_TO: &str = "RelatedTo";
    pub const SENT: &str = "Sent";
    pub const RECEIVED: &str = "Received";
    pub const PUBLISHED: &str = "Published";
    pub const EXPIRES: &str = "Expires";
    pub const TOPIC: &str = "Topic";
    pub const CONTENT_TYPE: &str = "ContentType";
    pub const IMPORTANCE: &str = "Importance";
    pub const SECURITY_TOKEN: &str = "SecurityToken";
}

/// Delivery policy tag carried in the `Importance` header.
///
/// `Critical` messages are parked on the durable outbound queue and retried
/// until delivered or attempts are exhausted; everything else is delivered
/// best-effort inline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    Critical,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "Low",
            Importance::Normal => "Normal",
            Importance::Critical => "Critical",
        }
    }

    /// Parse a header value. Unrecognized values fall back to `Normal`.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("low") {
            Importance::Low
        } else if value.eq_ignore_ascii_case("critical") {
            Importance::Critical
        } else {
            Importance::Normal
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, insertion-ordered header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header value by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header value. An existing header with the same name (compared
    /// case-insensitively) is replaced in place, keeping its position and
    /// the casing it was first written with; otherwise the header is
    /// appended.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Remove a header, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn url(&self, name: &str) -> Option<Url> {
        self.get(name).and_then(|v| Url::parse(v).ok())
    }

    fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn set_timestamp(&mut self, name: &str, when: DateTime<Utc>) {
        self.set(name, when.to_rfc3339());
    }

    pub fn message_id(&self) -> Option<&str> {
        self.get(names::MESSAGE_ID)
    }

    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.set(names::MESSAGE_ID, id);
    }

    /// Assign a freshly generated message id, returning it.
    pub fn generate_message_id(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.set_message_id(id.clone());
        id
    }

    pub fn message_name(&self) -> Option<&str> {
        self.get(names::MESSAGE_NAME)
    }

    pub fn set_message_name(&mut self, name: impl Into<String>) {
        self.set(names::MESSAGE_NAME, name);
    }

    pub fn origination(&self) -> Option<Url> {
        self.url(names::ORIGINATION)
    }

    pub fn set_origination(&mut self, uri: &Url) {
        self.set(names::ORIGINATION, uri.as_str());
    }

    pub fn destination(&self) -> Option<Url> {
        self.url(names::DESTINATION)
    }

    pub fn set_destination(&mut self, uri: &Url) {
        self.set(names::DESTINATION, uri.as_str());
    }

    pub fn reply_to(&self) -> Option<Url> {
        self.url(names::REPLY_TO)
    }

    pub fn set_reply_to(&mut self, uri: &Url) {
        self.set(names::REPLY_TO, uri.as_str());
    }

    pub fn related_to(&self) -> Option<&str> {
        self.get(names::RELATED_TO)
    }

    pub fn set_related_to(&mut self, id: impl Into<String>) {
        self.set(names::RELATED_TO, id);
    }

    pub fn sent(&self) -> Option<DateTime<Utc>> {
        self.timestamp(names::SENT)
    }

    pub fn set_sent(&mut self, when: DateTime<Utc>) {
        self.set_timestamp(names::SENT, when);
    }

    pub fn received(&self) -> Option<DateTime<Utc>> {
        self.timestamp(names::RECEIVED)
    }

    pub fn set_received(&mut self, when: DateTime<Utc>) {
        self.set_timestamp(names::RECEIVED, when);
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.timestamp(names::PUBLISHED)
    }

    pub fn set_published(&mut self, when: DateTime<Utc>) {
        self.set_timestamp(names::PUBLISHED, when);
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.timestamp(names::EXPIRES)
    }

    pub fn set_expires(&mut self, when: DateTime<Utc>) {
        self.set_timestamp(names::EXPIRES, when);
    }

    pub fn topic(&self) -> Option<&str> {
        self.get(names::TOPIC)
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.set(names::TOPIC, topic);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE)
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.set(names::CONTENT_TYPE, content_type);
    }

    pub fn importance(&self) -> Importance {
        self.get(names::IMPORTANCE)
            .map(Importance::parse)
            .unwrap_or_default()
    }

    pub fn set_importance(&mut self, importance: Importance) {
        self.set(names::IMPORTANCE, importance.as_str());
    }

    pub fn security_token(&self) -> Option<&str> {
        self.get(names::SECURITY_TOKEN)
    }

    pub fn set_security_token(&mut self, token: impl Into<String>) {
        self.set(names::SECURITY_TOKEN, token);
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}
