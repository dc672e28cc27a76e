use platibus_journal::JournalError;
use platibus_queue::QueueError;
use platibus_subscriptions::SubscriptionError;
use platibus_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Subscriptions(#[from] SubscriptionError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
