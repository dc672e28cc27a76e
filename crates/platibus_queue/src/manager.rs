use std::collections::HashMap;
use std::sync::Arc;

use platibus_message::Message;
use platibus_security::{Principal, SecurityTokenService};
use platibus_utils::DiagnosticEventSink;
use tokio::sync::RwLock;

use crate::engine::MessageQueue;
use crate::error::QueueError;
use crate::listener::QueueListener;
use crate::options::QueueOptions;

/// Owns every queue of one bus process, keyed by name.
///
/// `create` is idempotent: asking for a queue that already exists returns
/// the existing instance and ignores the new listener and options.
pub struct QueueManager {
    db: sled::Db,
    tokens: Arc<dyn SecurityTokenService>,
    sink: Arc<dyn DiagnosticEventSink>,
    queues: RwLock<HashMap<String, Arc<MessageQueue>>>,
}

impl QueueManager {
    pub fn new(
        db: sled::Db,
        tokens: Arc<dyn SecurityTokenService>,
        sink: Arc<dyn DiagnosticEventSink>,
    ) -> Self {
        Self {
            db,
            tokens,
            sink,
            queues: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(
        &self,
        name: &str,
        listener: Arc<dyn QueueListener>,
        options: QueueOptions,
    ) -> Result<Arc<MessageQueue>, QueueError> {
        if let Some(queue) = self.queues.read().await.get(name) {
            return Ok(Arc::clone(queue));
        }

        let mut queues = self.queues.write().await;
        if let Some(queue) = queues.get(name) {
            return Ok(Arc::clone(queue));
        }
        let queue = Arc::new(
            MessageQueue::open(
                name,
                &self.db,
                listener,
                options,
                Arc::clone(&self.tokens),
                Arc::clone(&self.sink),
            )
            .await?,
        );
        queues.insert(name.to_string(), Arc::clone(&queue));
        Ok(queue)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<MessageQueue>> {
        self.queues.read().await.get(name).cloned()
    }

    pub async fn enqueue(
        &self,
        name: &str,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), QueueError> {
        let queue = self.get(name).await.ok_or_else(|| QueueError::QueueNotFound {
            queue: name.to_string(),
        })?;
        queue.enqueue(message, principal).await
    }

    /// Close every queue, waiting for in-flight attempts.
    pub async fn close_all(&self) {
        let queues: Vec<_> = self.queues.read().await.values().cloned().collect();
        for queue in queues {
            queue.close().await;
        }
    }
}
