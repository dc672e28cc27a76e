use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use platibus_config::{EndpointSettings, Settings};
use platibus_message::{Headers, Importance, Message};
use platibus_queue::ListenerError;
use platibus_security::Principal;
use platibus_transport::{InboundHandler, OUTBOUND_QUEUE};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

use crate::bus::Bus;
use crate::handlers::{HandlerRegistry, MessageHandler};

fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
    listener.local_addr().unwrap().port()
}

fn bus_settings(port: u16, db_path: &std::path::Path, endpoints: Vec<(&str, String)>) -> Settings {
    let mut settings = Settings::default();
    settings.server.port = port;
    settings.server.jwt_secret = "integration-secret".to_string();
    settings.storage.path = db_path.to_string_lossy().into_owned();
    settings.queue.retry_delay_ms = 100;
    settings.queue.max_attempts = 30;
    settings.transport.bypass_local_delivery = false;
    settings.transport.request_timeout_secs = 5;
    settings.transport.retry_interval_secs = 1;
    settings.endpoints = endpoints
        .into_iter()
        .map(|(name, uri)| EndpointSettings {
            name: name.to_string(),
            uri,
            username: None,
            password: None,
            bearer_token: None,
        })
        .collect();
    settings
}

struct CollectingHandler {
    messages: Mutex<Vec<Message>>,
    notify: UnboundedSender<()>,
}

impl CollectingHandler {
    fn new() -> (Arc<Self>, UnboundedReceiver<()>) {
        let (tx, rx) = unbounded_channel();
        (
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
                notify: tx,
            }),
            rx,
        )
    }
}

#[async_trait]
impl MessageHandler for CollectingHandler {
    async fn handle(
        &self,
        message: &Message,
        _principal: Option<&Principal>,
    ) -> Result<(), ListenerError> {
        self.messages.lock().unwrap().push(message.clone());
        let _ = self.notify.send(());
        Ok(())
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !predicate() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn demo_message(name: &str, importance: Importance) -> Message {
    let mut headers = Headers::new();
    headers.generate_message_id();
    headers.set_message_name(name);
    headers.set_content_type("text/plain");
    headers.set_importance(importance);
    Message::new(headers, "integration payload")
}

#[tokio::test]
async fn critical_send_reaches_a_peer_that_comes_up_late() {
    let dir = tempfile::tempdir().unwrap();
    let port_b = reserve_port();

    let bus_a = Arc::new(
        Bus::init(bus_settings(
            reserve_port(),
            &dir.path().join("a"),
            vec![("peer", format!("http://127.0.0.1:{port_b}/"))],
        ))
        .await
        .unwrap(),
    );
    let bus_b = Arc::new(
        Bus::init(bus_settings(port_b, &dir.path().join("b"), Vec::new()))
            .await
            .unwrap(),
    );
    let (handler, mut received) = CollectingHandler::new();
    bus_b.register_handler("demo:", handler.clone());

    // Send while the peer's host is still dark: the critical message parks
    // on the outbound queue and the send call returns
    let message = demo_message("demo:Order", Importance::Critical);
    bus_a.send_to_endpoint("peer", &message, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let serve_b = {
        let bus = Arc::clone(&bus_b);
        tokio::spawn(async move {
            let _ = bus.serve(&format!("127.0.0.1:{port_b}")).await;
        })
    };

    timeout(Duration::from_secs(10), received.recv())
        .await
        .expect("peer never received the message");

    let messages = handler.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].headers().message_name(), Some("demo:Order"));
    assert_eq!(messages[0].content().as_ref(), b"integration payload");
    drop(messages);

    // The outbound row was acknowledged and deleted after delivery
    let outbound = bus_a.queues().get(OUTBOUND_QUEUE).await.unwrap();
    wait_until("outbound queue drained", || {
        outbound.pending_count().unwrap() == 0
    })
    .await;

    bus_a.shutdown().await;
    bus_b.shutdown().await;
    serve_b.abort();
}

#[tokio::test]
async fn publish_reaches_a_subscribed_peer() {
    let dir = tempfile::tempdir().unwrap();
    let port_a = reserve_port();
    let port_b = reserve_port();

    let bus_a = Arc::new(
        Bus::init(bus_settings(port_a, &dir.path().join("a"), Vec::new()))
            .await
            .unwrap(),
    );
    let bus_b = Arc::new(
        Bus::init(bus_settings(
            port_b,
            &dir.path().join("b"),
            vec![("publisher", format!("http://127.0.0.1:{port_a}/"))],
        ))
        .await
        .unwrap(),
    );
    let (handler, mut received) = CollectingHandler::new();
    bus_b.register_handler("", handler.clone());

    let serve_a = {
        let bus = Arc::clone(&bus_a);
        tokio::spawn(async move {
            let _ = bus.serve(&format!("127.0.0.1:{port_a}")).await;
        })
    };
    let serve_b = {
        let bus = Arc::clone(&bus_b);
        tokio::spawn(async move {
            let _ = bus.serve(&format!("127.0.0.1:{port_b}")).await;
        })
    };

    // B subscribes to A's topic; a zero TTL registers once, non-expiring
    bus_b.subscribe("publisher", "T", Duration::ZERO).unwrap();
    wait_until("subscription registered on the publisher", || {
        !bus_a
            .transport()
            .subscription_registry()
            .get_subscribers("T")
            .is_empty()
    })
    .await;

    bus_a
        .publish(&demo_message("demo:Event", Importance::Normal), "T")
        .await
        .unwrap();

    timeout(Duration::from_secs(10), received.recv())
        .await
        .expect("subscriber never received the publication");

    let messages = handler.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].headers().topic(), Some("T"));
    let destination = messages[0].headers().destination().unwrap();
    assert_eq!(destination.port(), Some(port_b));
    drop(messages);

    bus_a.shutdown().await;
    bus_b.shutdown().await;
    serve_a.abort();
    serve_b.abort();
}

#[tokio::test]
async fn handler_registry_routes_by_name_prefix() {
    let registry = HandlerRegistry::new();
    let (orders, mut orders_rx) = CollectingHandler::new();
    let (fallback, mut fallback_rx) = CollectingHandler::new();
    registry.register("orders:", orders.clone());
    registry.register("", fallback.clone());

    let message = demo_message("orders:Placed", Importance::Normal);
    InboundHandler::handle(&registry, &message, None).await.unwrap();
    assert!(orders_rx.try_recv().is_ok());
    assert!(fallback_rx.try_recv().is_err());

    let message = demo_message("billing:Invoiced", Importance::Normal);
    InboundHandler::handle(&registry, &message, None).await.unwrap();
    assert!(fallback_rx.try_recv().is_ok());
}

#[tokio::test]
async fn unhandled_messages_are_not_acknowledged() {
    let registry = HandlerRegistry::new();
    let message = demo_message("orders:Placed", Importance::Normal);
    let result = InboundHandler::handle(&registry, &message, None).await;
    assert!(result.is_err());
}
