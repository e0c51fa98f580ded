//! Link settings
//!
//! Settings that fix a session's identity and negotiation parameters:
//! - Service and channel identifiers
//! - Service name (peer-match key for the central role, advertised name for the peripheral)
//! - MTU payload size (0 selects the 512-byte default)
//! - What the peripheral does when a single peer drops

use crate::radio::{ATT_MTU_OVERHEAD, DEFAULT_MTU, MAX_MTU_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors that can occur during settings validation
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsError {
    #[error("Invalid service name: must not be empty")]
    EmptyServiceName,

    #[error("Invalid identity: {0} reuses an id already assigned to another role")]
    DuplicateId(String),

    #[error("Invalid MTU: must be 0-514, got {0}")]
    InvalidMtu(u16),

    #[error("Malformed settings: {0}")]
    Malformed(String),

    #[error("Settings file error: {0}")]
    Io(String),
}

// ============================================================================
// ENUMS
// ============================================================================

/// What a peripheral session does when one connected peer drops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectPolicy {
    /// Forget only the peer that dropped; other peers stay connected
    RemovePeer,

    /// Tear the whole server down and advertise again
    ///
    /// Guarantees re-discoverability but drops every other peer too.
    RestartSession,
}

impl std::fmt::Display for DisconnectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemovePeer => write!(f, "RemovePeer"),
            Self::RestartSession => write!(f, "RestartSession"),
        }
    }
}

impl std::str::FromStr for DisconnectPolicy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remove-peer" | "removepeer" => Ok(Self::RemovePeer),
            "restart-session" | "restartsession" => Ok(Self::RestartSession),
            other => Err(SettingsError::Malformed(format!(
                "unknown disconnect policy '{}'",
                other
            ))),
        }
    }
}

impl Default for DisconnectPolicy {
    fn default() -> Self {
        Self::RemovePeer
    }
}

// ============================================================================
// SESSION IDENTITY
// ============================================================================

/// Identifiers a session binds to for its whole lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Primary service id
    pub service_id: Uuid,
    /// Channel the central writes into
    pub write_channel: Uuid,
    /// Channel the central subscribes to
    pub read_channel: Uuid,
    /// Exact advertised name the central looks for
    pub service_name: String,
}

impl SessionIdentity {
    pub fn new(
        service_id: Uuid,
        write_channel: Uuid,
        read_channel: Uuid,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            service_id,
            write_channel,
            read_channel,
            service_name: service_name.into(),
        }
    }

    /// Validate identity
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.service_name.is_empty() {
            return Err(SettingsError::EmptyServiceName);
        }

        if self.write_channel == self.service_id {
            return Err(SettingsError::DuplicateId("write_channel".to_string()));
        }

        if self.read_channel == self.service_id || self.read_channel == self.write_channel {
            return Err(SettingsError::DuplicateId("read_channel".to_string()));
        }

        Ok(())
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self {
            service_id: Uuid::from_u128(0x0000_FFE0_0000_1000_8000_00805F9B34FB),
            write_channel: Uuid::from_u128(0x0000_FFE1_0000_1000_8000_00805F9B34FB),
            read_channel: Uuid::from_u128(0x0000_FFE2_0000_1000_8000_00805F9B34FB),
            service_name: "blelink".to_string(),
        }
    }
}

// ============================================================================
// LINK SETTINGS
// ============================================================================

/// Persistable link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSettings {
    pub identity: SessionIdentity,

    /// MTU payload size; 0 selects the default
    #[serde(default)]
    pub mtu_size: u16,

    /// Peripheral reaction to a single peer dropping
    #[serde(default)]
    pub disconnect_policy: DisconnectPolicy,
}

impl LinkSettings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.identity.validate()?;

        if self.mtu_size > MAX_MTU_PAYLOAD {
            return Err(SettingsError::InvalidMtu(self.mtu_size));
        }

        Ok(())
    }

    /// Payload size after applying the default
    pub fn effective_mtu(&self) -> u16 {
        effective_mtu(self.mtu_size)
    }

    /// Parse and validate a JSON settings document
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: LinkSettings =
            serde_json::from_str(json).map_err(|e| SettingsError::Malformed(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(|e| SettingsError::Malformed(e.to_string()))
    }

    /// Read and validate a settings file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Validate and write a settings file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::Io(format!("{}: {}", parent.display(), e)))?;
        }

        std::fs::write(path, self.to_json()?)
            .map_err(|e| SettingsError::Io(format!("{}: {}", path.display(), e)))
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            identity: SessionIdentity::default(),
            mtu_size: 0,
            disconnect_policy: DisconnectPolicy::RemovePeer,
        }
    }
}

/// Payload size after applying the 512-byte default to 0
pub fn effective_mtu(mtu_size: u16) -> u16 {
    if mtu_size == 0 {
        DEFAULT_MTU
    } else {
        mtu_size
    }
}

/// ATT MTU requested on the wire for a payload size
pub fn requested_mtu(mtu_size: u16) -> u16 {
    effective_mtu(mtu_size) + ATT_MTU_OVERHEAD
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        let settings = LinkSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.disconnect_policy, DisconnectPolicy::RemovePeer);
    }

    #[test]
    fn test_empty_service_name() {
        let mut settings = LinkSettings::default();
        settings.identity.service_name.clear();

        assert_eq!(settings.validate(), Err(SettingsError::EmptyServiceName));
    }

    #[test]
    fn test_duplicate_channel_ids() {
        let mut settings = LinkSettings::default();
        settings.identity.read_channel = settings.identity.write_channel;

        assert!(matches!(
            settings.validate(),
            Err(SettingsError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_write_channel_equal_to_service() {
        let mut identity = SessionIdentity::default();
        identity.write_channel = identity.service_id;

        assert!(identity.validate().is_err());
    }

    #[test]
    fn test_mtu_boundaries() {
        let mut settings = LinkSettings::default();

        settings.mtu_size = 0;
        assert!(settings.validate().is_ok());

        settings.mtu_size = MAX_MTU_PAYLOAD;
        assert!(settings.validate().is_ok());

        settings.mtu_size = MAX_MTU_PAYLOAD + 1;
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidMtu(MAX_MTU_PAYLOAD + 1))
        );
    }

    #[test]
    fn test_mtu_default_applied() {
        assert_eq!(effective_mtu(0), 512);
        assert_eq!(effective_mtu(185), 185);
        assert_eq!(requested_mtu(0), 515);
        assert_eq!(requested_mtu(244), 247);
    }

    #[test]
    fn test_disconnect_policy_parse() {
        assert_eq!(
            "restart-session".parse::<DisconnectPolicy>(),
            Ok(DisconnectPolicy::RestartSession)
        );
        assert_eq!(
            "RemovePeer".parse::<DisconnectPolicy>(),
            Ok(DisconnectPolicy::RemovePeer)
        );
        assert!("drop-everything".parse::<DisconnectPolicy>().is_err());
    }

    #[test]
    fn test_disconnect_policy_display() {
        assert_eq!(format!("{}", DisconnectPolicy::RemovePeer), "RemovePeer");
        assert_eq!(
            format!("{}", DisconnectPolicy::RestartSession),
            "RestartSession"
        );
    }

    #[test]
    fn test_from_json_missing_optional_fields() {
        let json = r#"{
            "identity": {
                "service_id": "0000ffe0-0000-1000-8000-00805f9b34fb",
                "write_channel": "0000ffe1-0000-1000-8000-00805f9b34fb",
                "read_channel": "0000ffe2-0000-1000-8000-00805f9b34fb",
                "service_name": "Widget-42"
            }
        }"#;

        let settings = LinkSettings::from_json(json).expect("valid settings");
        assert_eq!(settings.identity.service_name, "Widget-42");
        assert_eq!(settings.mtu_size, 0);
        assert_eq!(settings.effective_mtu(), 512);
        assert_eq!(settings.disconnect_policy, DisconnectPolicy::RemovePeer);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            LinkSettings::from_json("{ not json"),
            Err(SettingsError::Malformed(_))
        ));

        let mut settings = LinkSettings::default();
        settings.mtu_size = 600;
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(
            LinkSettings::from_json(&json),
            Err(SettingsError::InvalidMtu(600))
        );
    }
}
