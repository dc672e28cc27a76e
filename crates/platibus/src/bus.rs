//! Bus wiring
//!
//! `Bus::init` builds the whole node from settings: sled storage, the
//! security token service, the journal, the subscription registry, the queue
//! manager with the distinguished `Outbound` queue, and the HTTP transport.
//! Configured subscriptions start their renewal loops immediately; the HTTP
//! surface is served by the caller via `Bus::serve` (or `Bus::router` when
//! composing with an existing host).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use platibus_config::Settings;
use platibus_journal::MessageJournal;
use platibus_message::Message;
use platibus_queue::{QueueManager, QueueOptions};
use platibus_security::{JwtSecurityTokenService, Principal, SecurityTokenService};
use platibus_subscriptions::SubscriptionTrackingService;
use platibus_transport::{
    host, Credentials, Endpoint, EndpointRegistry, HttpTransportService, OutboundDeliveryListener,
    TransportOptions, OUTBOUND_QUEUE,
};
use platibus_utils::{DiagnosticEventSink, TracingEventSink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::BusError;
use crate::handlers::{HandlerRegistry, MessageHandler};

pub struct Bus {
    db: sled::Db,
    transport: Arc<HttpTransportService>,
    queues: Arc<QueueManager>,
    handlers: Arc<HandlerRegistry>,
    cancel: CancellationToken,
    subscription_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bus {
    pub async fn init(settings: Settings) -> Result<Bus, BusError> {
        Self::init_with_sink(settings, Arc::new(TracingEventSink)).await
    }

    /// As `init`, with a caller-supplied diagnostic sink.
    pub async fn init_with_sink(
        settings: Settings,
        sink: Arc<dyn DiagnosticEventSink>,
    ) -> Result<Bus, BusError> {
        let db = sled::open(&settings.storage.path)?;
        let tokens: Arc<dyn SecurityTokenService> =
            Arc::new(JwtSecurityTokenService::new(&settings.server.jwt_secret));

        let registry = Arc::new(SubscriptionTrackingService::open(&db)?);
        let journal = if settings.storage.journal {
            Some(Arc::new(MessageJournal::open(&db)?))
        } else {
            None
        };

        let base_uri = Url::parse(&settings.server.effective_base_uri())
            .map_err(|e| BusError::Config(format!("malformed base uri: {e}")))?;
        let endpoints = endpoint_table(&settings)?;

        let mut transport_options = TransportOptions::new(base_uri);
        transport_options.bypass_local_delivery = settings.transport.bypass_local_delivery;
        transport_options.request_timeout =
            Duration::from_secs(settings.transport.request_timeout_secs);
        transport_options.retry_interval =
            Duration::from_secs(settings.transport.retry_interval_secs);

        let transport = Arc::new(HttpTransportService::new(
            transport_options,
            EndpointRegistry::new(endpoints),
            registry,
            journal,
            Arc::clone(&tokens),
            Arc::clone(&sink),
        ));

        let queues = Arc::new(QueueManager::new(db.clone(), tokens, sink));
        let outbound_listener = Arc::new(OutboundDeliveryListener::new(Arc::downgrade(&transport)));
        let outbound = queues
            .create(OUTBOUND_QUEUE, outbound_listener, outbound_options(&settings))
            .await?;
        transport.set_outbound(outbound);

        let handlers = Arc::new(HandlerRegistry::new());
        let inbound: Arc<dyn platibus_transport::InboundHandler> = handlers.clone();
        transport.set_inbound_handler(inbound);

        let cancel = CancellationToken::new();
        let mut subscription_tasks = Vec::new();
        for subscription in &settings.subscriptions {
            let endpoint = transport.endpoints().by_name(&subscription.endpoint)?.clone();
            subscription_tasks.push(transport.subscribe(
                endpoint,
                subscription.topic.clone(),
                Duration::from_secs(subscription.ttl_secs),
                cancel.child_token(),
            ));
        }

        Ok(Bus {
            db,
            transport,
            queues,
            handlers,
            cancel,
            subscription_tasks: Mutex::new(subscription_tasks),
        })
    }

    /// Register an application handler for a message-name prefix.
    pub fn register_handler(&self, prefix: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.handlers.register(prefix, handler);
    }

    /// Send a point-to-point message; `Destination` must already be set.
    pub async fn send(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), BusError> {
        self.transport.send(message, principal).await?;
        Ok(())
    }

    /// Send to a named endpoint from the configured table.
    pub async fn send_to_endpoint(
        &self,
        endpoint: &str,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), BusError> {
        self.transport.send_to_endpoint(endpoint, message, principal).await?;
        Ok(())
    }

    /// Publish to every current subscriber of `topic`.
    pub async fn publish(&self, message: &Message, topic: &str) -> Result<(), BusError> {
        self.transport.publish(message, topic).await?;
        Ok(())
    }

    /// Start a subscription renewal loop against a named publisher
    /// endpoint. The loop runs until the bus shuts down.
    pub fn subscribe(&self, endpoint: &str, topic: &str, ttl: Duration) -> Result<(), BusError> {
        let endpoint = self.transport.endpoints().by_name(endpoint)?.clone();
        let task = self.transport.subscribe(
            endpoint,
            topic.to_string(),
            ttl,
            self.cancel.child_token(),
        );
        self.subscription_tasks
            .lock()
            .expect("subscription task list poisoned")
            .push(task);
        Ok(())
    }

    pub fn transport(&self) -> &Arc<HttpTransportService> {
        &self.transport
    }

    pub fn queues(&self) -> &Arc<QueueManager> {
        &self.queues
    }

    /// The axum router serving this bus's HTTP surface.
    pub fn router(&self) -> axum::Router {
        host::router(Arc::clone(&self.transport))
    }

    /// Serve the HTTP surface until the bus shuts down.
    pub async fn serve(&self, addr: &str) -> std::io::Result<()> {
        host::serve(Arc::clone(&self.transport), addr, self.cancel.child_token()).await
    }

    /// Stop subscription loops, close every queue and flush storage.
    /// In-flight dispatch attempts finish or observe cancellation; pending
    /// rows stay pending for the next start.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .subscription_tasks
            .lock()
            .expect("subscription task list poisoned")
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
        self.queues.close_all().await;
        let _ = self.db.flush_async().await;
    }
}

fn outbound_options(settings: &Settings) -> QueueOptions {
    QueueOptions {
        concurrency_limit: settings.queue.concurrency_limit,
        auto_acknowledge: settings.queue.auto_acknowledge,
        max_attempts: settings.queue.max_attempts,
        retry_delay: Duration::from_millis(settings.queue.retry_delay_ms),
        ..Default::default()
    }
}

fn endpoint_table(settings: &Settings) -> Result<Vec<Endpoint>, BusError> {
    settings
        .endpoints
        .iter()
        .map(|e| {
            let base_uri = Url::parse(&e.uri)
                .map_err(|err| BusError::Config(format!("endpoint {:?}: {err}", e.name)))?;
            let mut endpoint = Endpoint::new(e.name.clone(), base_uri);
            endpoint.credentials = match (&e.username, &e.password, &e.bearer_token) {
                (Some(username), Some(password), _) => Some(Credentials::Basic {
                    username: username.clone(),
                    password: password.clone(),
                }),
                (_, _, Some(token)) => Some(Credentials::Bearer {
                    token: token.clone(),
                }),
                _ => None,
            };
            Ok(endpoint)
        })
        .collect()
}
