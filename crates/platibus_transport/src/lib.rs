//! platibus_transport
//!
//! Moves messages between bus processes over HTTP:
//!
//! - wire delivery of one message to its destination endpoint, with a
//!   failure-class taxonomy the retry policy can act on;
//! - the distinguished `Outbound` queue where critical sends are durably
//!   parked until delivered or exhausted;
//! - publish fan-out to every current subscriber of a topic;
//! - the long-lived subscription renewal loop run against each publisher;
//! - inbound handling and the host-agnostic request/response resources the
//!   HTTP host binds to.
//!
//! Concurrency and usage notes:
//! - The service is shared behind `Arc`; every operation takes `&self`.
//! - HTTP clients are pooled per destination origin and reused across
//!   concurrent requests.
//! - Renewal loops are independent tasks stopped through their
//!   `CancellationToken`; cancellation is a clean exit, not an error.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod resources;
pub mod service;
pub mod subscribe;

pub use endpoint::{Credentials, Endpoint, EndpointRegistry};
pub use error::TransportError;
pub use resources::{ResourceRequest, ResourceResponse, ResourceRouter};
pub use service::{
    HttpTransportService, InboundHandler, OutboundDeliveryListener, TransportOptions,
    OUTBOUND_QUEUE,
};
