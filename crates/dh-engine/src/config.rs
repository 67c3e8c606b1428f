//! Engine configuration

use serde::{Deserialize, Serialize};

/// Parent id field stamped on every written row unless configured otherwise
pub const DEFAULT_PARENT_ID_FIELD: &str = "DrillHoleId";

/// Workflow permissions of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// May review and reject
    pub review: bool,
    /// May approve
    pub approve: bool,
    /// May toggle report inclusion on approved records
    pub exclude: bool,
}

impl Permissions {
    /// Every permission granted
    #[must_use]
    pub fn all() -> Self {
        Self {
            review: true,
            approve: true,
            exclude: true,
        }
    }
}

/// What a second operation on a busy section does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InFlightPolicy {
    /// Fail fast with `EngineError::Busy`
    #[default]
    Reject,
    /// Wait for the previous operation to settle
    Serialize,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Acting user, stamped into `ModifiedBy` and reviewer/approver fields
    pub user: String,
    /// Workflow permissions of the acting user
    pub permissions: Permissions,
    /// Behavior when a section already has an operation in flight
    pub in_flight: InFlightPolicy,
    /// Field linking each row to its aggregate
    pub parent_id_field: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            permissions: Permissions::default(),
            in_flight: InFlightPolicy::default(),
            parent_id_field: DEFAULT_PARENT_ID_FIELD.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create config for a user
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Set permissions
    #[inline]
    #[must_use]
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set in-flight policy
    #[inline]
    #[must_use]
    pub fn with_in_flight(mut self, policy: InFlightPolicy) -> Self {
        self.in_flight = policy;
        self
    }

    /// Set parent id field
    #[inline]
    #[must_use]
    pub fn with_parent_id_field(mut self, field: impl Into<String>) -> Self {
        self.parent_id_field = field.into();
        self
    }

    /// Parse from TOML; missing keys take their defaults
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed input
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }
}

/// Configuration could not be read
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed TOML or wrong field types
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
