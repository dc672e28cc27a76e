//! Subscription renewal loop
//!
//! Subscribing to a remote topic is a long-lived task: the subscription
//! request is re-posted before the TTL lapses, transient transport failures
//! back off and retry, and only a request the publisher positively rejects
//! ends the loop. Cancellation exits cleanly at any suspension point.

use std::sync::Arc;
use std::time::Duration;

use platibus_utils::{DiagnosticEvent, DiagnosticEventKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::client::authorize;
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::service::{HttpTransportService, SOURCE};

/// Smallest gap between renewals; short TTLs renew at half their TTL.
const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between renewals: half the TTL, floored at
/// `MIN_RENEWAL_INTERVAL` but always strictly less than the TTL itself.
fn renewal_interval(ttl: Duration) -> Duration {
    let half = ttl / 2;
    let floored = half.max(MIN_RENEWAL_INTERVAL);
    if floored < ttl {
        floored
    } else {
        half
    }
}

impl HttpTransportService {
    /// Start the renewal loop for `(publisher endpoint, topic)`. A TTL of
    /// zero requests a non-expiring subscription: one successful request and
    /// the task ends.
    pub fn subscribe(
        self: &Arc<Self>,
        endpoint: Endpoint,
        topic: String,
        ttl: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            transport.run_subscription(endpoint, topic, ttl, cancel).await;
        })
    }

    async fn run_subscription(
        &self,
        endpoint: Endpoint,
        topic: String,
        ttl: Duration,
        cancel: CancellationToken,
    ) {
        let renewal = renewal_interval(ttl);
        let retry = self.options().retry_interval;

        while !cancel.is_cancelled() {
            match self.send_subscription_request(&endpoint, &topic, ttl).await {
                Ok(()) => {
                    self.sink().emit(
                        DiagnosticEvent::new(SOURCE, DiagnosticEventKind::SubscriptionRenewed)
                            .topic(topic.clone())
                            .destination(endpoint.base_uri.to_string()),
                    );
                    if ttl.is_zero() {
                        return;
                    }
                    debug!(topic, publisher = %endpoint.base_uri, "subscription renewed");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(renewal) => {}
                    }
                }
                Err(e) if e.is_transient_for_subscription() => {
                    warn!(topic, publisher = %endpoint.base_uri, error = %e, "subscription renewal failed; will retry");
                    let mut event =
                        DiagnosticEvent::new(SOURCE, DiagnosticEventKind::TransportFailure)
                            .topic(topic.clone())
                            .destination(endpoint.base_uri.to_string())
                            .detail(e.to_string());
                    if let Some(status) = e.http_status() {
                        event = event.http_status(status);
                    }
                    self.sink().emit(event);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(retry) => {}
                    }
                }
                Err(e) => {
                    warn!(topic, publisher = %endpoint.base_uri, error = %e, "subscription failed");
                    let mut event =
                        DiagnosticEvent::new(SOURCE, DiagnosticEventKind::SubscriptionFailed)
                            .topic(topic.clone())
                            .destination(endpoint.base_uri.to_string())
                            .detail(e.to_string());
                    if let Some(status) = e.http_status() {
                        event = event.http_status(status);
                    }
                    self.sink().emit(event);
                    return;
                }
            }
        }
    }

    /// `POST {publisher}/topic/{topic}/subscriber?uri={self}[&ttl={secs}]`
    /// with an empty body.
    async fn send_subscription_request(
        &self,
        endpoint: &Endpoint,
        topic: &str,
        ttl: Duration,
    ) -> Result<(), TransportError> {
        let url = subscription_url(&endpoint.base_uri, topic, self.base_uri(), ttl)?;
        let (client, credentials) = self.pooled_client(&endpoint.base_uri)?;
        let request = authorize(client.post(url), credentials.as_ref());
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_request_error(&endpoint.base_uri, e))?;
        match TransportError::from_status(&endpoint.base_uri, response.status().as_u16()) {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

pub(crate) fn subscription_url(
    publisher: &Url,
    topic: &str,
    subscriber: &Url,
    ttl: Duration,
) -> Result<Url, TransportError> {
    let mut url = publisher.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidUri(format!("{publisher} cannot be a base URI")))?
        .pop_if_empty()
        .push("topic")
        .push(topic)
        .push("subscriber");
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("uri", subscriber.as_str());
        if !ttl.is_zero() {
            query.append_pair("ttl", &ttl.as_secs().to_string());
        }
    }
    Ok(url)
}
