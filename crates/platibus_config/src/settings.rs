use serde::Deserialize;

/// Top-level configuration for a bus process.
///
/// Aggregates the network identity of this node, storage and queue policy,
/// the peer endpoint table and the subscriptions started at boot.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub queue: QueueSettings,
    pub transport: TransportSettings,
    /// Peer endpoints this node may address by name.
    pub endpoints: Vec<EndpointSettings>,
    /// Subscriptions whose renewal loops start with the bus.
    pub subscriptions: Vec<SubscriptionSettings>,
}

/// Network identity of this bus node.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// The host address the HTTP host binds to.
    pub host: String,
    /// The port the HTTP host listens on.
    pub port: u16,
    /// Base URI peers use to reach this node; derived from host and port
    /// when not set explicitly.
    pub base_uri: Option<String>,
    /// Shared secret for issuing and validating security tokens.
    pub jwt_secret: String,
}

impl ServerSettings {
    pub fn effective_base_uri(&self) -> String {
        self.base_uri
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/", self.host, self.port))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Filesystem path of the sled database.
    pub path: String,
    /// Whether to keep a message journal.
    pub journal: bool,
}

/// Defaults applied to the outbound queue.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueSettings {
    pub concurrency_limit: usize,
    pub auto_acknowledge: bool,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportSettings {
    /// Deliver messages addressed to this node straight to the local handler.
    pub bypass_local_delivery: bool,
    pub request_timeout_secs: u64,
    /// Backoff before retrying a transient subscription renewal failure.
    pub retry_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointSettings {
    pub name: String,
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubscriptionSettings {
    /// Name of the publisher endpoint.
    pub endpoint: String,
    pub topic: String,
    /// Subscription TTL in seconds; 0 requests a non-expiring subscription.
    #[serde(default)]
    pub ttl_secs: u64,
}

/// Partial configuration loaded from files or the environment; missing
/// values fall back to `Settings::default`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub storage: Option<PartialStorageSettings>,
    pub queue: Option<PartialQueueSettings>,
    pub transport: Option<PartialTransportSettings>,
    pub endpoints: Option<Vec<EndpointSettings>>,
    pub subscriptions: Option<Vec<SubscriptionSettings>>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_uri: Option<String>,
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
    pub journal: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialQueueSettings {
    pub concurrency_limit: Option<usize>,
    pub auto_acknowledge: Option<bool>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialTransportSettings {
    pub bypass_local_delivery: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub retry_interval_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 52180,
                base_uri: None,
                jwt_secret: "platibus-dev-secret".to_string(),
            },
            storage: StorageSettings {
                path: "platibus_db".to_string(),
                journal: true,
            },
            queue: QueueSettings {
                concurrency_limit: 4,
                auto_acknowledge: false,
                max_attempts: 10,
                retry_delay_ms: 1000,
            },
            transport: TransportSettings {
                bypass_local_delivery: true,
                request_timeout_secs: 30,
                retry_interval_secs: 30,
            },
            endpoints: Vec::new(),
            subscriptions: Vec::new(),
        }
    }
}
