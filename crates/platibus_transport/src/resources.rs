//! Host-agnostic HTTP resources
//!
//! A host adapter translates whatever its web framework hands it into a
//! `ResourceRequest`, asks the router to handle it, and writes the
//! `ResourceResponse` back. Two resources carry the wire protocol —
//! `/message/{id}` and `/topic/{topic}/subscriber` — plus the read-only
//! introspection surfaces `/topic` and `/journal`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use platibus_journal::{JournalCategory, JournalFilter, JournalPosition};
use platibus_message::Message;
use platibus_security::Principal;
use serde::Serialize;
use url::Url;

use crate::error::TransportError;
use crate::service::{headers_from_wire, HttpTransportService};

/// One inbound request, divorced from the hosting web framework.
#[derive(Debug)]
pub struct ResourceRequest {
    /// Upper-case HTTP method.
    pub method: String,
    /// Percent-decoded path segments.
    pub path: Vec<String>,
    pub query: HashMap<String, String>,
    /// Header name/value pairs as received.
    pub headers: Vec<(String, String)>,
    /// Principal established by the host (e.g. from a bearer token).
    pub principal: Option<Principal>,
    pub body: Bytes,
}

/// The response a resource hands back to the host.
#[derive(Debug)]
pub struct ResourceResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl ResourceResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain".to_string()),
            body: Bytes::from(body.into()),
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: Some("application/json".to_string()),
                body: Bytes::from(body),
            },
            Err(e) => Self::text(500, e.to_string()),
        }
    }
}

/// Routes resource requests to the transport's protocol surfaces.
pub struct ResourceRouter {
    transport: Arc<HttpTransportService>,
}

impl ResourceRouter {
    pub fn new(transport: Arc<HttpTransportService>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<HttpTransportService> {
        &self.transport
    }

    pub async fn handle(&self, request: ResourceRequest) -> ResourceResponse {
        let segments: Vec<&str> = request.path.iter().map(String::as_str).collect();
        match (request.method.as_str(), segments.as_slice()) {
            ("POST", ["message", id]) => self.post_message(id, &request).await,
            ("POST", ["topic", topic, "subscriber"]) => self.post_subscriber(topic, &request),
            ("DELETE", ["topic", topic, "subscriber"]) => self.delete_subscriber(topic, &request),
            ("GET", ["topic"]) => self.get_topics(),
            ("GET", ["journal"]) => self.get_journal(&request),
            _ => ResourceResponse::status(404),
        }
    }

    /// `POST /message/{id}`: rebuild the message from the wire form and hand
    /// it to the transport; 202 when the handler acknowledged, 422 when it
    /// did not.
    async fn post_message(&self, id: &str, request: &ResourceRequest) -> ResourceResponse {
        let mut headers = headers_from_wire(&request.headers);
        if headers.message_id().is_none() {
            headers.set_message_id(id);
        }
        headers.set_received(Utc::now());
        let message = Message::new(headers, request.body.clone());

        match self
            .transport
            .handle_incoming(message, request.principal.clone())
            .await
        {
            Ok(()) => ResourceResponse::status(202),
            Err(TransportError::MessageNotAcknowledged { .. }) => ResourceResponse::status(422),
            Err(TransportError::NotInitialized(detail)) => ResourceResponse::text(503, detail),
            Err(e) => ResourceResponse::text(500, e.to_string()),
        }
    }

    /// `POST /topic/{topic}/subscriber?uri=...[&ttl=...]`: upsert a
    /// subscription. A missing TTL registers a non-expiring one.
    fn post_subscriber(&self, topic: &str, request: &ResourceRequest) -> ResourceResponse {
        let Some(uri) = request.query.get("uri") else {
            return ResourceResponse::text(400, "missing uri query parameter");
        };
        let Ok(subscriber) = Url::parse(uri) else {
            return ResourceResponse::text(400, "malformed uri query parameter");
        };
        let ttl = match request.query.get("ttl").map(|t| t.parse::<u64>()) {
            None => Duration::ZERO,
            Some(Ok(secs)) => Duration::from_secs(secs),
            Some(Err(_)) => return ResourceResponse::text(400, "malformed ttl query parameter"),
        };

        match self
            .transport
            .subscription_registry()
            .add_subscription(topic, &subscriber, ttl)
        {
            Ok(()) => ResourceResponse::status(202),
            Err(e) => ResourceResponse::text(500, e.to_string()),
        }
    }

    /// `DELETE /topic/{topic}/subscriber?uri=...`: remove a subscription.
    fn delete_subscriber(&self, topic: &str, request: &ResourceRequest) -> ResourceResponse {
        let Some(uri) = request.query.get("uri") else {
            return ResourceResponse::text(400, "missing uri query parameter");
        };
        let Ok(subscriber) = Url::parse(uri) else {
            return ResourceResponse::text(400, "malformed uri query parameter");
        };
        match self
            .transport
            .subscription_registry()
            .remove_subscription(topic, &subscriber)
        {
            Ok(()) => ResourceResponse::status(202),
            Err(e) => ResourceResponse::text(500, e.to_string()),
        }
    }

    /// `GET /topic`: topics with at least one live subscriber.
    fn get_topics(&self) -> ResourceResponse {
        let topics = self.transport.subscription_registry().topics();
        ResourceResponse::json(200, &topics)
    }

    /// `GET /journal?start=...&count=...&categories=...&topics=...`:
    /// paginated journal introspection using the opaque position token.
    fn get_journal(&self, request: &ResourceRequest) -> ResourceResponse {
        let Some(journal) = self.transport.journal() else {
            return ResourceResponse::text(404, "no journal configured");
        };

        let start = match request.query.get("start") {
            Some(token) => match token.parse::<JournalPosition>() {
                Ok(position) => position,
                Err(_) => return ResourceResponse::text(400, "malformed start position"),
            },
            None => match journal.beginning() {
                Ok(position) => position,
                Err(e) => return ResourceResponse::text(500, e.to_string()),
            },
        };
        let count = match request.query.get("count").map(|c| c.parse::<usize>()) {
            None => 100,
            Some(Ok(count)) if count > 0 => count,
            Some(_) => return ResourceResponse::text(400, "malformed count"),
        };

        let mut filter = JournalFilter::default();
        if let Some(categories) = request.query.get("categories") {
            for raw in categories.split(',').filter(|c| !c.is_empty()) {
                match JournalCategory::parse(raw) {
                    Some(category) => {
                        filter.categories.insert(category);
                    }
                    None => return ResourceResponse::text(400, "unknown category"),
                }
            }
        }
        if let Some(topics) = request.query.get("topics") {
            filter
                .topics
                .extend(topics.split(',').filter(|t| !t.is_empty()).map(str::to_string));
        }

        let result = match journal.read(start, count, &filter) {
            Ok(result) => result,
            Err(e) => return ResourceResponse::text(500, e.to_string()),
        };

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct EntryView {
            position: String,
            timestamp: String,
            category: String,
            topic: Option<String>,
            message_id: Option<String>,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JournalView {
            entries: Vec<EntryView>,
            next: String,
            end_of_journal: bool,
        }

        let view = JournalView {
            entries: result
                .entries
                .iter()
                .map(|entry| EntryView {
                    position: entry.position.to_string(),
                    timestamp: entry.timestamp.to_rfc3339(),
                    category: entry.category.as_str().to_string(),
                    topic: entry.message.headers().topic().map(str::to_string),
                    message_id: entry.message.headers().message_id().map(str::to_string),
                })
                .collect(),
            next: result.next.to_string(),
            end_of_journal: result.end_of_journal,
        };
        ResourceResponse::json(200, &view)
    }
}
