use platibus_message::HeaderCodecError;
use platibus_security::SecurityTokenError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("failed to serialize queued message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to issue security token: {0}")]
    Token(#[from] SecurityTokenError),

    #[error("queued message headers are malformed: {0}")]
    HeaderCodec(#[from] HeaderCodecError),

    #[error("message has no MessageId header")]
    MissingMessageId,

    #[error("queue {queue:?} handoff buffer is full")]
    QueueFull { queue: String },

    #[error("queue {queue:?} is closed")]
    Closed { queue: String },

    #[error("no queue named {queue:?}")]
    QueueNotFound { queue: String },

    #[error("invalid queue options: {0}")]
    InvalidOptions(&'static str),
}
