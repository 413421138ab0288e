//! Per-driver sequence number.

use std::fmt;

/// Counts successfully delivered messages, starting at 1.
///
/// Stepping past `i32::MAX` wraps back to 1; the value is never 0 or
/// negative. Used for key disambiguation and the `$SEQNUM` macro only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceNumber(i32);

impl SequenceNumber {
    pub fn new() -> Self {
        Self(1)
    }

    pub fn get(self) -> i32 {
        self.0
    }

    pub fn step(&mut self) {
        self.0 = match self.0.checked_add(1) {
            Some(next) => next,
            None => 1,
        };
    }
}

impl Default for SequenceNumber {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn starts_at_one() {
        assert_eq!(SequenceNumber::new().get(), 1);
    }

    #[rstest]
    #[case(1, 2)]
    #[case(41, 42)]
    #[case(i32::MAX - 1, i32::MAX)]
    #[case(i32::MAX, 1)]
    fn step(#[case] from: i32, #[case] expected: i32) {
        let mut seq = SequenceNumber(from);
        seq.step();
        assert_eq!(seq.get(), expected);
    }
}
