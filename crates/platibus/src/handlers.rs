//! Application handler registry
//!
//! Applications register handlers against message-name prefixes; inbound
//! messages are routed to the first matching handler in registration order.
//! An empty prefix is a catch-all. A message no handler claims, or a handler
//! error, counts as non-acknowledgement and the peer is answered 422.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use platibus_message::Message;
use platibus_queue::ListenerError;
use platibus_security::Principal;
use platibus_transport::InboundHandler;
use tracing::debug;

/// Handles inbound messages on behalf of the application.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), ListenerError>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<(String, Arc<dyn MessageHandler>)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for message names starting with `prefix`; an
    /// empty prefix matches every message.
    pub fn register(&self, prefix: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .write()
            .expect("handler registry poisoned")
            .push((prefix.into(), handler));
    }

    fn resolve(&self, message_name: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .expect("handler registry poisoned")
            .iter()
            .find(|(prefix, _)| message_name.starts_with(prefix.as_str()))
            .map(|(_, handler)| Arc::clone(handler))
    }
}

#[async_trait]
impl InboundHandler for HandlerRegistry {
    async fn handle(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), ListenerError> {
        let message_name = message.headers().message_name().unwrap_or_default();
        match self.resolve(message_name) {
            Some(handler) => handler.handle(message, principal).await,
            None => {
                debug!(message_name, "no handler registered for inbound message");
                Err(format!("no handler for message name {message_name:?}").into())
            }
        }
    }
}
