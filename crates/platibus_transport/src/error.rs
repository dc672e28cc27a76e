//! Transport failure taxonomy
//!
//! Every wire-level failure is classified into one of these kinds so the
//! caller — usually the outbound queue's retry policy — can decide whether
//! another attempt can help. The subscription loop uses the same taxonomy to
//! split fatal from transient renewal failures.

use std::error::Error as StdError;
use std::io;

use platibus_journal::JournalError;
use platibus_queue::QueueError;
use platibus_subscriptions::SubscriptionError;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("message has no Destination header")]
    MissingDestination,

    #[error("no endpoint named {name:?} is configured")]
    EndpointNotFound { name: String },

    #[error("access denied by {destination}")]
    AccessDenied { destination: String },

    #[error("resource not found at {destination}")]
    ResourceNotFound { destination: String },

    #[error("message not acknowledged by {destination}")]
    MessageNotAcknowledged { destination: String },

    #[error("request rejected by {destination} with status {status}")]
    InvalidRequest { destination: String, status: u16 },

    #[error("transport failure against {destination}: {detail}")]
    TransportFailure {
        destination: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("name resolution failed for {destination}")]
    NameResolutionFailed { destination: String },

    #[error("connection refused by {destination}")]
    ConnectionRefused { destination: String },

    #[error("publish failed for {} of {total} subscriber(s)", failures.len())]
    PublishFailed {
        total: usize,
        failures: Vec<(Url, TransportError)>,
    },

    #[error("transport is not fully wired: {0}")]
    NotInitialized(&'static str),

    #[error("malformed destination URI: {0}")]
    InvalidUri(String),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Subscriptions(#[from] SubscriptionError),

    #[error(transparent)]
    Outbound(#[from] QueueError),
}

impl TransportError {
    /// Map an HTTP response status to a failure class. `None` means success.
    pub fn from_status(destination: &Url, status: u16) -> Option<TransportError> {
        let destination_str = destination.to_string();
        match status {
            200..=299 => None,
            401 => Some(TransportError::AccessDenied {
                destination: destination_str,
            }),
            404 => Some(TransportError::ResourceNotFound {
                destination: destination_str,
            }),
            422 => Some(TransportError::MessageNotAcknowledged {
                destination: destination_str,
            }),
            400..=499 => Some(TransportError::InvalidRequest {
                destination: destination_str,
                status,
            }),
            _ => Some(TransportError::TransportFailure {
                destination: destination_str,
                status: Some(status),
                detail: format!("server returned status {status}"),
            }),
        }
    }

    /// Classify a request-phase error from the HTTP client.
    pub fn from_request_error(destination: &Url, error: reqwest::Error) -> TransportError {
        let destination_str = destination.to_string();
        if error.is_connect() {
            if io_error_kind(&error) == Some(io::ErrorKind::ConnectionRefused) {
                return TransportError::ConnectionRefused {
                    destination: destination_str,
                };
            }
            return TransportError::NameResolutionFailed {
                destination: destination_str,
            };
        }
        TransportError::TransportFailure {
            destination: destination_str,
            status: None,
            detail: error.to_string(),
        }
    }

    /// Whether the subscription renewal loop should keep retrying after this
    /// failure. Network and resource conditions can change between renewals;
    /// a request the publisher positively rejects — malformed, unroutable,
    /// or unauthorized (endpoint credentials are fixed configuration) —
    /// cannot be fixed by waiting.
    pub fn is_transient_for_subscription(&self) -> bool {
        matches!(
            self,
            TransportError::NameResolutionFailed { .. }
                | TransportError::ConnectionRefused { .. }
                | TransportError::ResourceNotFound { .. }
                | TransportError::TransportFailure { .. }
                | TransportError::MessageNotAcknowledged { .. }
        )
    }

    /// The HTTP status behind this failure, when one was observed.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            TransportError::AccessDenied { .. } => Some(401),
            TransportError::ResourceNotFound { .. } => Some(404),
            TransportError::MessageNotAcknowledged { .. } => Some(422),
            TransportError::InvalidRequest { status, .. } => Some(*status),
            TransportError::TransportFailure { status, .. } => *status,
            _ => None,
        }
    }
}

/// Walk an error's source chain looking for the underlying I/O error kind.
fn io_error_kind(error: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = error.source();
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
        source = current.source();
    }
    None
}
