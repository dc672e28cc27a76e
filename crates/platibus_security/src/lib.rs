//! platibus_security
//!
//! Principal capture for queued messages and inbound requests. The queue
//! engine and the host never see a platform identity object; they depend on
//! the `SecurityTokenService` capability to turn a `Principal` into an
//! opaque token at enqueue time and back into a `Principal` when the row is
//! dispatched or a request arrives.

pub mod token;

pub use token::{JwtSecurityTokenService, SecurityTokenError, SecurityTokenService};

use serde::{Deserialize, Serialize};

/// The identity on whose behalf a message was enqueued or a request made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(name: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            name: name.into(),
            roles,
        }
    }
}
