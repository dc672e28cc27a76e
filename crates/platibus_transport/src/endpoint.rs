use url::Url;

use crate::error::TransportError;

/// Credentials presented to a peer endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// A named peer endpoint from configuration.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub base_uri: Url,
    pub credentials: Option<Credentials>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, base_uri: Url) -> Self {
        Self {
            name: name.into(),
            base_uri,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Read-only table of the endpoints this bus may address by name, also
/// consulted by URI when deciding which credentials a destination gets.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn by_name(&self, name: &str) -> Result<&Endpoint, TransportError> {
        self.endpoints
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| TransportError::EndpointNotFound {
                name: name.to_string(),
            })
    }

    /// The endpoint whose base URI shares `destination`'s origin, if any.
    pub fn by_uri(&self, destination: &Url) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| same_origin(&e.base_uri, destination))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }
}

/// Scheme, host and port equality.
pub(crate) fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}
