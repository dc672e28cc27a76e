//! platibus
//!
//! The bus facade: wires storage, queues, the subscription registry, the
//! journal and the HTTP transport into one `Bus` exposing `send`, `publish`,
//! `subscribe` and handler registration. Binary crates call `Bus::init` with
//! loaded settings, serve `Bus::router` behind their HTTP host, and shut the
//! bus down on exit.

pub mod bus;
pub mod error;
pub mod handlers;

pub use bus::Bus;
pub use error::BusError;
pub use handlers::{HandlerRegistry, MessageHandler};

pub use platibus_config::{load_config, Settings};
pub use platibus_message::{Headers, Importance, Message};
pub use platibus_queue::QueueOptions;
pub use platibus_security::Principal;

#[cfg(test)]
mod tests;
