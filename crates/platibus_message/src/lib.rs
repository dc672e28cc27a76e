//! platibus_message
//!
//! The message crate contains the canonical in-memory representation of a
//! bus message and its header block:
//!
//! - `Message`: an immutable envelope of headers plus opaque content bytes.
//! - `Headers`: a case-insensitive, insertion-ordered header map with typed
//!   accessors for the fields the bus recognizes.
//! - `codec`: the line-oriented header block encoding used when headers are
//!   persisted alongside queued rows and journal entries.
//!
//! This crate is intended to be used by the queue, journal, subscription and
//! transport crates; it has no knowledge of storage or the wire.

pub mod codec;
pub mod headers;
pub mod message;

pub use codec::{decode_headers, encode_headers, HeaderCodecError};
pub use headers::{Headers, Importance};
pub use message::Message;

#[cfg(test)]
mod tests;
