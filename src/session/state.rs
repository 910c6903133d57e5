//! Session state machine types

use serde::{Deserialize, Serialize};

/// Configuration state of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationState {
    /// Graph not built yet.
    Unconfigured,
    /// Graph construction or start confirmation in flight.
    Configuring,
    /// Graph built; inputs and outputs bound.
    Configured,
}

impl Default for ConfigurationState {
    fn default() -> Self {
        Self::Unconfigured
    }
}
