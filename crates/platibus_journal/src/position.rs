use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Opaque, totally ordered token identifying a journal entry.
///
/// Positions are comparable and round-trippable: `to_string` then parse
/// yields the same position, so a consumer can persist where it stopped and
/// reopen the journal from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JournalPosition(pub(crate) u64);

impl JournalPosition {
    pub(crate) fn next(self) -> Self {
        JournalPosition(self.0 + 1)
    }

    pub(crate) fn key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for JournalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JournalPosition {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(JournalPosition)
    }
}
