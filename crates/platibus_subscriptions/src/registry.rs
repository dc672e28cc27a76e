//! Subscription registry
//!
//! Backing storage is a single sled tree keyed by `topic NUL subscriber`,
//! the source of truth across restarts. A read-through cache grouped by
//! topic is rebuilt by full scan on open. The cache is sharded per topic:
//! the outer map is locked only to look up or create a topic's bucket, and
//! each mutation takes that bucket's own lock for the duration of its sled
//! write, so traffic on one topic never blocks another.
//!
//! Expiry is lazy: `get_subscribers` filters rows whose expiry has passed,
//! and expired rows may linger in storage until the pair is re-added or
//! removed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const TREE_NAME: &str = "subscriptions";

/// Sentinel expiry for non-expiring subscriptions (TTL of zero).
const NON_EXPIRING_MS: i64 = i64::MAX;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("failed to serialize subscription: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("corrupt subscription row {key:?}: {detail}")]
    Corrupt { key: String, detail: String },
}

#[derive(Serialize, Deserialize)]
struct SubscriptionRecord {
    topic: String,
    subscriber: String,
    expires_ms: i64,
}

/// One registered subscription, as surfaced to introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub subscriber: Url,
    /// `None` for non-expiring subscriptions.
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct CachedSubscription {
    subscriber: Url,
    expires_ms: i64,
}

/// Per-topic cache shard; mutations for a topic serialize on this lock.
type TopicBucket = Arc<RwLock<Vec<CachedSubscription>>>;

pub struct SubscriptionTrackingService {
    tree: sled::Tree,
    cache: RwLock<HashMap<String, TopicBucket>>,
}

impl SubscriptionTrackingService {
    /// Open the registry and rebuild the topic cache by full scan.
    pub fn open(db: &sled::Db) -> Result<Self, SubscriptionError> {
        let tree = db.open_tree(TREE_NAME)?;
        let mut entries: HashMap<String, Vec<CachedSubscription>> = HashMap::new();

        for item in tree.iter() {
            let (key, value) = item?;
            let record: SubscriptionRecord =
                serde_json::from_slice(&value).map_err(|e| SubscriptionError::Corrupt {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    detail: e.to_string(),
                })?;
            let subscriber =
                Url::parse(&record.subscriber).map_err(|e| SubscriptionError::Corrupt {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    detail: e.to_string(),
                })?;
            entries.entry(record.topic).or_default().push(CachedSubscription {
                subscriber,
                expires_ms: record.expires_ms,
            });
        }

        let cache = entries
            .into_iter()
            .map(|(topic, subscriptions)| (topic, Arc::new(RwLock::new(subscriptions))))
            .collect();

        Ok(Self {
            tree,
            cache: RwLock::new(cache),
        })
    }

    /// The bucket for a topic, if one exists.
    fn bucket(&self, topic: &str) -> Option<TopicBucket> {
        self.cache
            .read()
            .expect("subscription cache poisoned")
            .get(topic)
            .cloned()
    }

    /// The bucket for a topic, creating an empty one if needed. The outer
    /// map is write-locked only for the insertion itself.
    fn bucket_or_create(&self, topic: &str) -> TopicBucket {
        if let Some(bucket) = self.bucket(topic) {
            return bucket;
        }
        let mut cache = self.cache.write().expect("subscription cache poisoned");
        Arc::clone(cache.entry(topic.to_string()).or_default())
    }

    /// Upsert a `(topic, subscriber)` pair. A TTL of zero registers a
    /// non-expiring subscription; otherwise the expiry is refreshed to
    /// now + ttl.
    pub fn add_subscription(
        &self,
        topic: &str,
        subscriber: &Url,
        ttl: Duration,
    ) -> Result<(), SubscriptionError> {
        let expires_ms = if ttl.is_zero() {
            NON_EXPIRING_MS
        } else {
            Utc::now().timestamp_millis() + ttl.as_millis() as i64
        };
        let record = SubscriptionRecord {
            topic: topic.to_string(),
            subscriber: subscriber.as_str().to_string(),
            expires_ms,
        };
        let value = serde_json::to_vec(&record)?;

        let bucket = self.bucket_or_create(topic);
        let mut entries = bucket.write().expect("subscription bucket poisoned");
        self.tree.insert(key_of(topic, subscriber), value)?;

        match entries.iter_mut().find(|e| e.subscriber == *subscriber) {
            Some(entry) => entry.expires_ms = expires_ms,
            None => entries.push(CachedSubscription {
                subscriber: subscriber.clone(),
                expires_ms,
            }),
        }
        Ok(())
    }

    /// Delete a `(topic, subscriber)` pair.
    pub fn remove_subscription(
        &self,
        topic: &str,
        subscriber: &Url,
    ) -> Result<(), SubscriptionError> {
        match self.bucket(topic) {
            Some(bucket) => {
                let mut entries = bucket.write().expect("subscription bucket poisoned");
                self.tree.remove(key_of(topic, subscriber))?;
                entries.retain(|e| e.subscriber != *subscriber);
            }
            None => {
                self.tree.remove(key_of(topic, subscriber))?;
            }
        }
        Ok(())
    }

    /// Current (unexpired) subscribers for a topic.
    pub fn get_subscribers(&self, topic: &str) -> Vec<Url> {
        let Some(bucket) = self.bucket(topic) else {
            return Vec::new();
        };
        let now_ms = Utc::now().timestamp_millis();
        let guard = bucket.read().expect("subscription bucket poisoned");
        guard
            .iter()
            .filter(|e| e.expires_ms > now_ms)
            .map(|e| e.subscriber.clone())
            .collect()
    }

    /// Topics with at least one unexpired subscriber.
    pub fn topics(&self) -> Vec<String> {
        let now_ms = Utc::now().timestamp_millis();
        let buckets: Vec<(String, TopicBucket)> = {
            let cache = self.cache.read().expect("subscription cache poisoned");
            cache
                .iter()
                .map(|(topic, bucket)| (topic.clone(), Arc::clone(bucket)))
                .collect()
        };
        let mut topics: Vec<String> = buckets
            .into_iter()
            .filter(|(_, bucket)| {
                bucket
                    .read()
                    .expect("subscription bucket poisoned")
                    .iter()
                    .any(|e| e.expires_ms > now_ms)
            })
            .map(|(topic, _)| topic)
            .collect();
        topics.sort();
        topics
    }

    /// All unexpired subscriptions, for introspection.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let now_ms = Utc::now().timestamp_millis();
        let buckets: Vec<(String, TopicBucket)> = {
            let cache = self.cache.read().expect("subscription cache poisoned");
            cache
                .iter()
                .map(|(topic, bucket)| (topic.clone(), Arc::clone(bucket)))
                .collect()
        };
        let mut out = Vec::new();
        for (topic, bucket) in buckets {
            let entries = bucket.read().expect("subscription bucket poisoned");
            for entry in entries.iter().filter(|e| e.expires_ms > now_ms) {
                out.push(Subscription {
                    topic: topic.clone(),
                    subscriber: entry.subscriber.clone(),
                    expires: (entry.expires_ms != NON_EXPIRING_MS)
                        .then(|| Utc.timestamp_millis_opt(entry.expires_ms).single())
                        .flatten(),
                });
            }
        }
        out.sort_by(|a, b| (&a.topic, a.subscriber.as_str()).cmp(&(&b.topic, b.subscriber.as_str())));
        out
    }
}

fn key_of(topic: &str, subscriber: &Url) -> Vec<u8> {
    let mut key = Vec::with_capacity(topic.len() + subscriber.as_str().len() + 1);
    key.extend_from_slice(topic.as_bytes());
    key.push(0);
    key.extend_from_slice(subscriber.as_str().as_bytes());
    key
}
