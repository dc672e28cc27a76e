//! platibus_config
//!
//! Declarative configuration for a bus node. Settings are layered:
//! `config/default.{toml,yaml,json}` under the working directory, then
//! `PLATIBUS__`-prefixed environment variables, merged over built-in
//! defaults so a bare process still starts.

pub mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::settings::{
    PartialSettings, QueueSettings, ServerSettings, StorageSettings, TransportSettings,
};

pub use settings::{
    EndpointSettings, PartialServerSettings, Settings, SubscriptionSettings,
};

pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("PLATIBUS").separator("__"));

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
            base_uri: partial
                .server
                .as_ref()
                .and_then(|s| s.base_uri.clone())
                .or(default.server.base_uri),
            jwt_secret: partial
                .server
                .as_ref()
                .and_then(|s| s.jwt_secret.clone())
                .unwrap_or(default.server.jwt_secret),
        },
        storage: StorageSettings {
            path: partial
                .storage
                .as_ref()
                .and_then(|s| s.path.clone())
                .unwrap_or(default.storage.path),
            journal: partial
                .storage
                .as_ref()
                .and_then(|s| s.journal)
                .unwrap_or(default.storage.journal),
        },
        queue: QueueSettings {
            concurrency_limit: partial
                .queue
                .as_ref()
                .and_then(|q| q.concurrency_limit)
                .unwrap_or(default.queue.concurrency_limit),
            auto_acknowledge: partial
                .queue
                .as_ref()
                .and_then(|q| q.auto_acknowledge)
                .unwrap_or(default.queue.auto_acknowledge),
            max_attempts: partial
                .queue
                .as_ref()
                .and_then(|q| q.max_attempts)
                .unwrap_or(default.queue.max_attempts),
            retry_delay_ms: partial
                .queue
                .as_ref()
                .and_then(|q| q.retry_delay_ms)
                .unwrap_or(default.queue.retry_delay_ms),
        },
        transport: TransportSettings {
            bypass_local_delivery: partial
                .transport
                .as_ref()
                .and_then(|t| t.bypass_local_delivery)
                .unwrap_or(default.transport.bypass_local_delivery),
            request_timeout_secs: partial
                .transport
                .as_ref()
                .and_then(|t| t.request_timeout_secs)
                .unwrap_or(default.transport.request_timeout_secs),
            retry_interval_secs: partial
                .transport
                .as_ref()
                .and_then(|t| t.retry_interval_secs)
                .unwrap_or(default.transport.retry_interval_secs),
        },
        endpoints: partial.endpoints.unwrap_or_default(),
        subscriptions: partial.subscriptions.unwrap_or_default(),
    })
}
