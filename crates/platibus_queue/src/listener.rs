use async_trait::async_trait;
use platibus_message::Message;
use platibus_security::Principal;
use tokio_util::sync::CancellationToken;

/// Error type listeners may return; any error counts as non-acknowledgement.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives messages dispatched from a queue.
///
/// Returning `Err` — or returning `Ok` without acknowledging, on a queue
/// without auto-acknowledge — leaves the row pending and subject to the
/// queue's retry policy. The cancellation token fires when the queue is
/// closing; a listener may finish its work or abort.
#[async_trait]
pub trait QueueListener: Send + Sync {
    async fn message_received(
        &self,
        message: &Message,
        context: &mut DeliveryContext,
        cancel: CancellationToken,
    ) -> Result<(), ListenerError>;
}

/// Per-attempt delivery state handed to the listener.
#[derive(Debug)]
pub struct DeliveryContext {
    queue: String,
    principal: Option<Principal>,
    attempt: u32,
    acknowledged: bool,
}

impl DeliveryContext {
    pub(crate) fn new(queue: String, principal: Option<Principal>, attempt: u32) -> Self {
        Self {
            queue,
            principal,
            attempt,
            acknowledged: false,
        }
    }

    /// Name of the queue dispatching this message.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// The identity captured when the message was enqueued, if any.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Which delivery attempt this is, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Assert that the message has been durably absorbed; the row will be
    /// deleted and never re-dispatched.
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }
}
