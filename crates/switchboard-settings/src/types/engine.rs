//! Embedded engine and logging settings.

use serde::{Deserialize, Serialize};
use switchboard_core::logging::LogFormat;

/// A tenant created at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSeed {
    /// Tenant id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// An entity registered at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySeed {
    /// Display name.
    pub name: String,
    /// Owning tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Tenants known to the server profile.
    pub tenants: Vec<TenantSeed>,
    /// Entities registered by the server profile.
    pub entities: Vec<EntitySeed>,
    /// Upper bound on directory size for the server profile.
    pub max_entities: usize,
    /// Conversation items retained per context.
    pub history_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tenants: Vec::new(),
            entities: vec![EntitySeed {
                name: "default".to_string(),
                tenant: None,
            }],
            max_entities: 32,
            history_limit: 1_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
