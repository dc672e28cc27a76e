//! platibus_journal
//!
//! Append-only log of messages the bus has sent, received or published.
//! Entries are totally ordered by an opaque `JournalPosition`; reads are
//! filtered, paginated and repeatable, so a consumer can replay from a saved
//! position and observe the same entries in the same order.

pub mod entry;
pub mod journal;
pub mod position;

pub use entry::{JournalCategory, JournalEntry, JournalFilter};
pub use journal::{JournalError, JournalReadResult, MessageJournal};
pub use position::JournalPosition;

#[cfg(test)]
mod tests;
