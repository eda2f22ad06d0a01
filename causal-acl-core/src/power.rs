// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer authority rank of a participant.
///
/// Greater levels are assumed to contain all lower ones: a participant may only assign levels
/// (or revoke participants holding levels) strictly below their own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerLevel(i64);

impl PowerLevel {
    /// Level of regular participants.
    pub const USER: Self = Self(0);

    /// Level of participants allowed to manage regular users.
    pub const MODERATOR: Self = Self(50);

    /// Level of the graph creator.
    pub const ADMINISTRATOR: Self = Self(100);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Returns `true` if a holder of this level may assign or take away `other`.
    pub fn outranks(&self, other: &PowerLevel) -> bool {
        self > other
    }
}

impl From<i64> for PowerLevel {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::USER => write!(f, "user"),
            Self::MODERATOR => write!(f, "moderator"),
            Self::ADMINISTRATOR => write!(f, "administrator"),
            Self(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PowerLevel;

    #[test]
    fn named_levels_are_ordered() {
        assert!(PowerLevel::USER < PowerLevel::MODERATOR);
        assert!(PowerLevel::MODERATOR < PowerLevel::ADMINISTRATOR);
        assert_eq!(PowerLevel::default(), PowerLevel::USER);
    }

    #[test]
    fn outranks_is_strict() {
        let moderator = PowerLevel::MODERATOR;
        assert!(moderator.outranks(&PowerLevel::new(49)));
        assert!(!moderator.outranks(&PowerLevel::new(50)));
        assert!(!moderator.outranks(&PowerLevel::new(80)));
    }

    #[test]
    fn display() {
        assert_eq!(PowerLevel::ADMINISTRATOR.to_string(), "administrator");
        assert_eq!(PowerLevel::new(80).to_string(), "80");
    }
}
