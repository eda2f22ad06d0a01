// SPDX-License-Identifier: MIT OR Apache-2.0

use causal_acl_core::PowerLevel;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration shared by both resolvers and the state projector.
///
/// Every replica of a graph needs to use the same configuration, otherwise they will not converge
/// to the same access-control state.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResolverConfig {
    /// Level of participants which never received a grant or got revoked.
    pub default_power_level: PowerLevel,

    /// Level held by the author of the root operation.
    pub creator_power_level: PowerLevel,
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_power_level(mut self, level: PowerLevel) -> Self {
        self.default_power_level = level;
        self
    }

    pub fn with_creator_power_level(mut self, level: PowerLevel) -> Self {
        self.creator_power_level = level;
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_power_level: PowerLevel::USER,
            creator_power_level: PowerLevel::ADMINISTRATOR,
        }
    }
}
