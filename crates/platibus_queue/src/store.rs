//! Queue row storage
//!
//! Each queue owns one sled tree named `queue:{name}`. Rows are keyed by a
//! per-queue monotonic sequence number in big-endian form, so a range scan
//! walks them in insertion order; the sequence is re-seeded from the last
//! key when the store is opened. Header blocks are stored in their text
//! encoding next to the raw content bytes plus the columns dispatch needs
//! without re-parsing.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use platibus_message::{decode_headers, encode_headers, HeaderCodecError, Message};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// One persisted queue row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessageRecord {
    pub message_id: String,
    pub queue: String,
    pub message_name: Option<String>,
    pub origination: Option<String>,
    pub destination: Option<String>,
    pub reply_to: Option<String>,
    pub expires_ms: Option<i64>,
    pub content_type: Option<String>,
    pub headers: String,
    pub content: Vec<u8>,
    pub attempts: u32,
    pub enqueued_ms: i64,
    pub acknowledged_ms: Option<i64>,
    pub abandoned_ms: Option<i64>,
}

impl QueuedMessageRecord {
    pub fn is_terminal(&self) -> bool {
        self.acknowledged_ms.is_some() || self.abandoned_ms.is_some()
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    pub fn to_message(&self) -> Result<Message, HeaderCodecError> {
        let headers = decode_headers(&self.headers)?;
        Ok(Message::new(headers, self.content.clone()))
    }
}

pub(crate) struct QueueStore {
    tree: sled::Tree,
    next_key: AtomicU64,
}

impl QueueStore {
    pub fn open(db: &sled::Db, queue: &str) -> Result<Self, QueueError> {
        let tree = db.open_tree(format!("queue:{queue}"))?;
        let next = match tree.last()? {
            Some((key, _)) => decode_key(&key) + 1,
            None => 0,
        };
        Ok(Self {
            tree,
            next_key: AtomicU64::new(next),
        })
    }

    /// Persist a new pending row, returning its key.
    pub fn insert(&self, queue: &str, message: &Message) -> Result<u64, QueueError> {
        let headers = message.headers();
        let record = QueuedMessageRecord {
            message_id: headers
                .message_id()
                .filter(|id| !id.is_empty())
                .ok_or(QueueError::MissingMessageId)?
                .to_string(),
            queue: queue.to_string(),
            message_name: headers.message_name().map(str::to_string),
            origination: headers.origination().map(|u| u.to_string()),
            destination: headers.destination().map(|u| u.to_string()),
            reply_to: headers.reply_to().map(|u| u.to_string()),
            expires_ms: headers.expires().map(|t| t.timestamp_millis()),
            content_type: headers.content_type().map(str::to_string),
            headers: encode_headers(headers),
            content: message.content().to_vec(),
            attempts: 0,
            enqueued_ms: Utc::now().timestamp_millis(),
            acknowledged_ms: None,
            abandoned_ms: None,
        };
        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        self.tree.insert(key.to_be_bytes(), serde_json::to_vec(&record)?)?;
        Ok(key)
    }

    pub fn get(&self, key: u64) -> Result<Option<QueuedMessageRecord>, QueueError> {
        match self.tree.get(key.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn update(&self, key: u64, record: &QueuedMessageRecord) -> Result<(), QueueError> {
        self.tree.insert(key.to_be_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    pub fn remove(&self, key: u64) -> Result<(), QueueError> {
        self.tree.remove(key.to_be_bytes())?;
        Ok(())
    }

    /// Keys of pending rows in insertion order.
    pub fn pending_keys(&self) -> Result<Vec<u64>, QueueError> {
        let mut keys = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            let record: QueuedMessageRecord = serde_json::from_slice(&value)?;
            if record.is_pending() {
                keys.push(decode_key(&key));
            }
        }
        Ok(keys)
    }

    /// All rows in insertion order; dead-lettered rows are retained here for
    /// forensic reads.
    pub fn rows(&self) -> Result<Vec<QueuedMessageRecord>, QueueError> {
        let mut rows = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    pub async fn flush(&self) -> Result<(), QueueError> {
        self.tree.flush_async().await?;
        Ok(())
    }
}

fn decode_key(key: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let len = key.len().min(8);
    bytes[..len].copy_from_slice(&key[..len]);
    u64::from_be_bytes(bytes)
}
