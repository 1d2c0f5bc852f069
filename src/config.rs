//! Runtime configuration for the mutation core.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Which listener payload the notifier delivers. Decided once, at notifier
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerProtocol {
    /// Loosely typed referenceable projections; listener failures are
    /// wrapped in `NotificationFailed`.
    #[default]
    Legacy,
    /// Full typed entities; listener failures propagate unchanged.
    Typed,
}

/// Flags consulted by the deletion, propagation and notification engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Soft deletes flip status instead of removing (default: true)
    pub soft_delete_enabled: bool,

    /// Clear the single-valued inverse attribute when its edge goes away (default: true)
    pub update_inverse_references: bool,

    /// Recompute `__entityText` before notifying listeners (default: true)
    pub full_text_enabled: bool,

    /// Listener payload variant (default: legacy)
    pub listener_protocol: ListenerProtocol,

    /// Record per-operation timing metrics in the unit of work (default: false)
    pub metrics_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            soft_delete_enabled: true,
            update_inverse_references: true,
            full_text_enabled: true,
            listener_protocol: ListenerProtocol::Legacy,
            metrics_enabled: false,
        }
    }
}

impl CoreConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn hard_delete() -> Self {
        Self { soft_delete_enabled: false, ..Self::default() }
    }
}
