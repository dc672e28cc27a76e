//! Transport service
//!
//! `HttpTransportService` owns outbound delivery policy: a send with
//! `Critical` importance is parked on the durable `Outbound` queue (whose
//! listener is this service, closing the retry loop), anything else is
//! delivered inline. Publishes fan out concurrently to every current
//! subscriber, each with its own message id and destination; per-subscriber
//! failures are aggregated rather than short-circuiting the rest.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use platibus_journal::{JournalCategory, MessageJournal};
use platibus_message::headers::names;
use platibus_message::{Headers, Importance, Message};
use platibus_queue::{DeliveryContext, ListenerError, MessageQueue, QueueListener};
use platibus_security::{Principal, SecurityTokenService};
use platibus_subscriptions::SubscriptionTrackingService;
use platibus_utils::{DiagnosticEvent, DiagnosticEventKind, DiagnosticEventSink};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::client::{authorize, ClientPool};
use crate::endpoint::{same_origin, EndpointRegistry};
use crate::error::TransportError;

/// Name of the distinguished queue where critical messages are parked.
pub const OUTBOUND_QUEUE: &str = "Outbound";

pub(crate) const SOURCE: &str = "http-transport";

/// Receives inbound messages after the transport has journaled them.
///
/// Returning `Err` signals non-acknowledgement back to the host, which
/// answers the peer with 422.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), ListenerError>;
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// This bus process's own base URI; used for `Origination` stamping,
    /// subscription requests and local-delivery bypass.
    pub base_uri: Url,
    /// Deliver messages addressed to our own base URI straight to the local
    /// handler without touching the wire.
    pub bypass_local_delivery: bool,
    /// Per-request timeout on outbound HTTP calls.
    pub request_timeout: Duration,
    /// Delay before retrying a transient subscription renewal failure.
    pub retry_interval: Duration,
}

impl TransportOptions {
    pub fn new(base_uri: Url) -> Self {
        Self {
            base_uri,
            bypass_local_delivery: true,
            request_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_secs(30),
        }
    }
}

pub struct HttpTransportService {
    options: TransportOptions,
    clients: ClientPool,
    registry: Arc<SubscriptionTrackingService>,
    journal: Option<Arc<MessageJournal>>,
    tokens: Arc<dyn SecurityTokenService>,
    sink: Arc<dyn DiagnosticEventSink>,
    outbound: OnceLock<Arc<MessageQueue>>,
    inbound: OnceLock<Arc<dyn InboundHandler>>,
}

impl HttpTransportService {
    pub fn new(
        options: TransportOptions,
        endpoints: EndpointRegistry,
        registry: Arc<SubscriptionTrackingService>,
        journal: Option<Arc<MessageJournal>>,
        tokens: Arc<dyn SecurityTokenService>,
        sink: Arc<dyn DiagnosticEventSink>,
    ) -> Self {
        let clients = ClientPool::new(endpoints, options.request_timeout);
        sink.emit(DiagnosticEvent::new(SOURCE, DiagnosticEventKind::ComponentInitialized));
        Self {
            options,
            clients,
            registry,
            journal,
            tokens,
            sink,
            outbound: OnceLock::new(),
            inbound: OnceLock::new(),
        }
    }

    pub fn base_uri(&self) -> &Url {
        &self.options.base_uri
    }

    pub fn subscription_registry(&self) -> &Arc<SubscriptionTrackingService> {
        &self.registry
    }

    pub fn journal(&self) -> Option<&Arc<MessageJournal>> {
        self.journal.as_ref()
    }

    pub fn token_service(&self) -> &Arc<dyn SecurityTokenService> {
        &self.tokens
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        self.clients.endpoints()
    }

    pub(crate) fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub(crate) fn sink(&self) -> &Arc<dyn DiagnosticEventSink> {
        &self.sink
    }

    pub(crate) fn pooled_client(
        &self,
        destination: &Url,
    ) -> Result<(reqwest::Client, Option<crate::endpoint::Credentials>), TransportError> {
        self.clients.client_for(destination)
    }

    /// Wire in the outbound queue once it exists; the queue's listener is
    /// this service, so construction happens in two steps.
    pub fn set_outbound(&self, queue: Arc<MessageQueue>) {
        let _ = self.outbound.set(queue);
    }

    /// Register the application-facing inbound handler.
    pub fn set_inbound_handler(&self, handler: Arc<dyn InboundHandler>) {
        let _ = self.inbound.set(handler);
    }

    /// Send a point-to-point message to its `Destination` header.
    ///
    /// Critical messages are enqueued on the outbound queue with the
    /// caller's principal and delivered asynchronously under its retry
    /// policy; everything else is delivered inline.
    pub async fn send(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), TransportError> {
        let mut headers = message.headers().clone();
        if headers.message_id().is_none() {
            headers.generate_message_id();
        }
        if headers.destination().is_none() {
            return Err(TransportError::MissingDestination);
        }
        if headers.origination().is_none() {
            headers.set_origination(&self.options.base_uri);
        }
        if headers.sent().is_none() {
            headers.set_sent(Utc::now());
        }
        let message = message.with_headers(headers);

        if message.headers().importance() == Importance::Critical {
            self.enqueue_outbound(&message, principal).await
        } else {
            self.deliver(&message).await
        }
    }

    /// Send to a named endpoint from the configured table.
    pub async fn send_to_endpoint(
        &self,
        endpoint_name: &str,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), TransportError> {
        let endpoint = match self.endpoints().by_name(endpoint_name) {
            Ok(endpoint) => endpoint.clone(),
            Err(e) => {
                self.sink.emit(
                    DiagnosticEvent::new(SOURCE, DiagnosticEventKind::EndpointNotFound)
                        .destination(endpoint_name),
                );
                return Err(e);
            }
        };
        let mut headers = message.headers().clone();
        headers.set_destination(&endpoint.base_uri);
        self.send(&message.with_headers(headers), principal).await
    }

    /// Publish to every current subscriber of `topic`.
    ///
    /// Each fan-out target gets a clone of the message with a fresh
    /// `MessageId` and its own `Destination`. Failures against one
    /// subscriber do not cancel the others; they are aggregated into
    /// `PublishFailed`.
    pub async fn publish(&self, message: &Message, topic: &str) -> Result<(), TransportError> {
        let mut base = message.headers().clone();
        base.set_topic(topic);
        if base.published().is_none() {
            base.set_published(Utc::now());
        }
        if base.origination().is_none() {
            base.set_origination(&self.options.base_uri);
        }

        if let Some(journal) = &self.journal {
            journal.append(&message.with_headers(base.clone()), JournalCategory::Published)?;
        }

        let subscribers = self.registry.get_subscribers(topic);
        let total = subscribers.len();
        let critical = base.importance() == Importance::Critical;

        let deliveries = subscribers.into_iter().map(|subscriber| {
            let mut headers = base.clone();
            headers.generate_message_id();
            headers.set_destination(&subscriber);
            let message = message.with_headers(headers);
            async move {
                let result = if critical {
                    self.enqueue_outbound(&message, None).await
                } else {
                    self.deliver(&message).await
                };
                result.map_err(|e| (subscriber, e))
            }
        });

        let failures: Vec<_> = join_all(deliveries)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransportError::PublishFailed { total, failures })
        }
    }

    async fn enqueue_outbound(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), TransportError> {
        let outbound = self
            .outbound
            .get()
            .ok_or(TransportError::NotInitialized("outbound queue not attached"))?;
        outbound.enqueue(message, principal).await?;
        Ok(())
    }

    /// Deliver one message to its destination over the wire.
    pub async fn deliver(&self, message: &Message) -> Result<(), TransportError> {
        let destination = message
            .headers()
            .destination()
            .ok_or(TransportError::MissingDestination)?;
        let message_id = message.headers().message_id().unwrap_or_default().to_string();

        if let Some(journal) = &self.journal {
            journal.append(message, JournalCategory::Sent)?;
        }

        if self.options.bypass_local_delivery && same_origin(&destination, &self.options.base_uri) {
            return self.handle_incoming(message.clone(), None).await;
        }

        let url = message_url(&destination, &message_id)?;
        let (client, credentials) = self.clients.client_for(&destination)?;
        let mut request = client.post(url);
        for (name, value) in message.headers().iter() {
            if name.eq_ignore_ascii_case(names::CONTENT_TYPE) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(header_name), Ok(header_value)) => {
                    request = request.header(header_name, header_value);
                }
                _ => warn!(header = name, "message header not representable on the wire"),
            }
        }
        if let Some(content_type) = message.headers().content_type() {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                request = request.header(CONTENT_TYPE, value);
            }
        }
        request = authorize(request, credentials.as_ref());

        let response = request
            .body(message.content().clone())
            .send()
            .await
            .map_err(|e| self.delivery_failed(
                &message_id,
                &destination,
                TransportError::from_request_error(&destination, e),
            ))?;

        match TransportError::from_status(&destination, response.status().as_u16()) {
            None => {
                self.sink.emit(
                    DiagnosticEvent::new(SOURCE, DiagnosticEventKind::MessageDelivered)
                        .message_id(message_id)
                        .destination(destination.to_string()),
                );
                Ok(())
            }
            Some(error) => Err(self.delivery_failed(&message_id, &destination, error)),
        }
    }

    fn delivery_failed(
        &self,
        message_id: &str,
        destination: &Url,
        error: TransportError,
    ) -> TransportError {
        let mut event = DiagnosticEvent::new(SOURCE, DiagnosticEventKind::MessageDeliveryFailed)
            .message_id(message_id)
            .destination(destination.to_string())
            .detail(error.to_string());
        if let Some(status) = error.http_status() {
            event = event.http_status(status);
        }
        self.sink.emit(event);
        error
    }

    /// Entry point for messages arriving from the host: journal `Received`,
    /// route to the application handler, and report acknowledgement so the
    /// host can answer 202 or 422.
    pub async fn handle_incoming(
        &self,
        message: Message,
        principal: Option<Principal>,
    ) -> Result<(), TransportError> {
        if message.expired() {
            return Err(TransportError::MessageNotAcknowledged {
                destination: self.options.base_uri.to_string(),
            });
        }

        if let Some(journal) = &self.journal {
            journal.append(&message, JournalCategory::Received)?;
        }

        let handler = self
            .inbound
            .get()
            .ok_or(TransportError::NotInitialized("inbound handler not registered"))?;
        match handler.handle(&message, principal.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.sink.emit(
                    DiagnosticEvent::new(SOURCE, DiagnosticEventKind::MessageNotAcknowledged)
                        .message_id(message.headers().message_id().unwrap_or_default())
                        .detail(e.to_string()),
                );
                Err(TransportError::MessageNotAcknowledged {
                    destination: self.options.base_uri.to_string(),
                })
            }
        }
    }
}

/// Listener bound to the `Outbound` queue: each dispatch is one wire
/// delivery attempt, and acknowledgement is withheld on failure so the
/// queue's retry policy governs recovery.
pub struct OutboundDeliveryListener {
    transport: Weak<HttpTransportService>,
}

impl OutboundDeliveryListener {
    pub fn new(transport: Weak<HttpTransportService>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl QueueListener for OutboundDeliveryListener {
    async fn message_received(
        &self,
        message: &Message,
        context: &mut DeliveryContext,
        _cancel: CancellationToken,
    ) -> Result<(), ListenerError> {
        let transport = self
            .transport
            .upgrade()
            .ok_or("transport has shut down")?;
        transport.deliver(message).await?;
        context.acknowledge();
        Ok(())
    }
}

/// `{destination}/message/{id}` with the id percent-encoded as a path
/// segment.
pub(crate) fn message_url(destination: &Url, message_id: &str) -> Result<Url, TransportError> {
    let mut url = destination.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidUri(format!("{destination} cannot be a base URI")))?
        .pop_if_empty()
        .push("message")
        .push(message_id);
    Ok(url)
}

/// Build inbound message headers from a wire request's header list.
///
/// `Content-Type` maps onto the `ContentType` header; transport-level
/// headers that are not message headers are dropped.
pub(crate) fn headers_from_wire(wire: &[(String, String)]) -> Headers {
    const DROP: &[&str] = &[
        "host",
        "content-length",
        "transfer-encoding",
        "connection",
        "accept",
        "accept-encoding",
        "user-agent",
        "authorization",
    ];
    let mut headers = Headers::new();
    for (name, value) in wire {
        if name.eq_ignore_ascii_case("content-type") {
            headers.set_content_type(value.clone());
            continue;
        }
        if DROP.iter().any(|d| name.eq_ignore_ascii_case(d)) {
            continue;
        }
        headers.set(name.clone(), value.clone());
    }
    headers
}
