//! HTTP client pool
//!
//! One `reqwest::Client` per destination origin, shared by every concurrent
//! request to that origin. Credentials are looked up from the endpoint table
//! by origin and applied per request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use url::Url;

use crate::endpoint::{Credentials, EndpointRegistry};
use crate::error::TransportError;

pub(crate) struct ClientPool {
    timeout: Duration,
    endpoints: EndpointRegistry,
    clients: Mutex<HashMap<String, Client>>,
}

impl ClientPool {
    pub fn new(endpoints: EndpointRegistry, timeout: Duration) -> Self {
        Self {
            timeout,
            endpoints,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The pooled client for a destination, plus the credentials its
    /// configured endpoint (if any) carries.
    pub fn client_for(
        &self,
        destination: &Url,
    ) -> Result<(Client, Option<Credentials>), TransportError> {
        let origin = origin_key(destination);
        let credentials = self
            .endpoints
            .by_uri(destination)
            .and_then(|e| e.credentials.clone());

        let mut clients = self.clients.lock().expect("client pool poisoned");
        if let Some(client) = clients.get(&origin) {
            return Ok((client.clone(), credentials));
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| TransportError::TransportFailure {
                destination: destination.to_string(),
                status: None,
                detail: e.to_string(),
            })?;
        clients.insert(origin, client.clone());
        Ok((client, credentials))
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }
}

/// Apply endpoint credentials to an outgoing request.
pub(crate) fn authorize(
    request: RequestBuilder,
    credentials: Option<&Credentials>,
) -> RequestBuilder {
    match credentials {
        Some(Credentials::Basic { username, password }) => {
            request.basic_auth(username, Some(password))
        }
        Some(Credentials::Bearer { token }) => request.bearer_auth(token),
        None => request,
    }
}

fn origin_key(url: &Url) -> String {
    format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}
