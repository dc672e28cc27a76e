//! Journal engine
//!
//! Entries live in a single sled tree keyed by the big-endian position, so a
//! range scan walks them in insertion order. Positions are allocated from an
//! atomic counter re-seeded from the last key when the journal is opened;
//! entries are never rewritten or deleted, which is what makes reads from a
//! fixed position repeatable.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{TimeZone, Utc};
use platibus_message::{decode_headers, encode_headers, Message};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{JournalCategory, JournalEntry, JournalFilter};
use crate::position::JournalPosition;

const TREE_NAME: &str = "journal";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("failed to serialize journal entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("corrupt journal entry at position {position}: {detail}")]
    Corrupt { position: u64, detail: String },
}

#[derive(Serialize, Deserialize)]
struct JournalRecord {
    timestamp_ms: i64,
    category: JournalCategory,
    topic: Option<String>,
    headers: String,
    content: Vec<u8>,
}

/// Result of one paginated read.
#[derive(Debug)]
pub struct JournalReadResult {
    pub entries: Vec<JournalEntry>,
    /// Position to continue the read from.
    pub next: JournalPosition,
    /// True when fewer than the requested number of entries were available.
    pub end_of_journal: bool,
}

pub struct MessageJournal {
    tree: sled::Tree,
    next_position: AtomicU64,
}

impl MessageJournal {
    pub fn open(db: &sled::Db) -> Result<Self, JournalError> {
        let tree = db.open_tree(TREE_NAME)?;
        let next = match tree.last()? {
            Some((key, _)) => decode_key(&key)? + 1,
            None => 0,
        };
        Ok(Self {
            tree,
            next_position: AtomicU64::new(next),
        })
    }

    /// Append one entry, returning its newly allocated position.
    pub fn append(
        &self,
        message: &Message,
        category: JournalCategory,
    ) -> Result<JournalPosition, JournalError> {
        let position = JournalPosition(self.next_position.fetch_add(1, Ordering::SeqCst));
        let record = JournalRecord {
            timestamp_ms: Utc::now().timestamp_millis(),
            category,
            topic: message.headers().topic().map(str::to_string),
            headers: encode_headers(message.headers()),
            content: message.content().to_vec(),
        };
        let value = serde_json::to_vec(&record)?;
        self.tree.insert(position.key(), value)?;
        Ok(position)
    }

    /// The earliest valid read position.
    pub fn beginning(&self) -> Result<JournalPosition, JournalError> {
        match self.tree.first()? {
            Some((key, _)) => Ok(JournalPosition(decode_key(&key)?)),
            None => Ok(JournalPosition(0)),
        }
    }

    /// Read up to `count` entries matching `filter`, beginning at `start`.
    ///
    /// Re-reading with identical arguments yields identical entries in the
    /// same order. `next` continues the read; `end_of_journal` is set when
    /// the scan ran out of entries before filling the page.
    pub fn read(
        &self,
        start: JournalPosition,
        count: usize,
        filter: &JournalFilter,
    ) -> Result<JournalReadResult, JournalError> {
        let mut entries = Vec::new();
        let mut next = start;

        for item in self.tree.range(start.key()..) {
            let (key, value) = item?;
            let position = JournalPosition(decode_key(&key)?);
            let record: JournalRecord =
                serde_json::from_slice(&value).map_err(|e| JournalError::Corrupt {
                    position: position.0,
                    detail: e.to_string(),
                })?;

            if filter.matches(record.category, record.topic.as_deref()) {
                entries.push(decode_record(position, record)?);
                if entries.len() == count {
                    return Ok(JournalReadResult {
                        entries,
                        next: position.next(),
                        end_of_journal: false,
                    });
                }
            }
            next = position.next();
        }

        Ok(JournalReadResult {
            entries,
            next,
            end_of_journal: true,
        })
    }
}

fn decode_key(key: &[u8]) -> Result<u64, JournalError> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| JournalError::Corrupt {
        position: 0,
        detail: format!("malformed position key of {} bytes", key.len()),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_record(
    position: JournalPosition,
    record: JournalRecord,
) -> Result<JournalEntry, JournalError> {
    let headers = decode_headers(&record.headers).map_err(|e| JournalError::Corrupt {
        position: position.0,
        detail: e.to_string(),
    })?;
    let timestamp = Utc
        .timestamp_millis_opt(record.timestamp_ms)
        .single()
        .ok_or_else(|| JournalError::Corrupt {
            position: position.0,
            detail: format!("timestamp {} out of range", record.timestamp_ms),
        })?;
    Ok(JournalEntry {
        position,
        timestamp,
        category: record.category,
        message: Message::new(headers, record.content),
    })
}
