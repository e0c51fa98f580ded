/// Value types shared by the radio facade and both session roles
///
/// Handles are opaque tokens minted by the platform; channels and services
/// describe the GATT layout a session publishes or resolves from a remote peer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use uuid::Uuid;

/// Default payload size requested when the configured MTU is 0
pub const DEFAULT_MTU: u16 = 512;

/// ATT header bytes added on top of the payload size in an MTU request
pub const ATT_MTU_OVERHEAD: u16 = 3;

/// Largest payload size that still fits the 517-byte ATT MTU ceiling
pub const MAX_MTU_PAYLOAD: u16 = 514;

/// Client Characteristic Configuration Descriptor (0x2902)
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_00805F9B34FB);

/// Descriptor value that switches notifications on
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Remote endpoint as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerHandle {
    /// Platform address (MAC or platform-specific identifier)
    pub address: String,
    /// Advertised device name, if the peer broadcast one
    pub name: Option<String>,
}

impl PeerHandle {
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_string),
        }
    }

    /// Byte-for-byte comparison of the advertised name; nameless peers never match
    pub fn name_matches(&self, expected: &str) -> bool {
        self.name
            .as_deref()
            .map(|name| name.as_bytes() == expected.as_bytes())
            .unwrap_or(false)
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Handle to an open central-side link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkHandle(pub u64);

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Handle to an open peripheral-side acceptor (GATT server)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceptorHandle(pub u64);

impl fmt::Display for AcceptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acceptor#{}", self.0)
    }
}

/// Platform status code attached to completion events (0 = success)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GattStatus(pub i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    pub const FAILURE: GattStatus = GattStatus(0x101);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Link state reported by connection-state notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Write mode for channel writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteMode {
    /// Acknowledged write
    WithResponse,
    /// Unacknowledged write (command)
    NoResponse,
    /// Authenticated signed write
    Signed,
}

impl Default for WriteMode {
    fn default() -> Self {
        Self::WithResponse
    }
}

/// Connection interval profile requested after connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkPriority {
    Balanced,
    High,
    LowPower,
}

/// Characteristic property bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelProperties(pub u8);

impl ChannelProperties {
    pub const READ: ChannelProperties = ChannelProperties(0x02);
    pub const WRITE_NO_RESPONSE: ChannelProperties = ChannelProperties(0x04);
    pub const WRITE: ChannelProperties = ChannelProperties(0x08);
    pub const NOTIFY: ChannelProperties = ChannelProperties(0x10);

    pub fn contains(&self, other: ChannelProperties) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChannelProperties {
    type Output = ChannelProperties;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChannelProperties(self.0 | rhs.0)
    }
}

/// Characteristic permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelPermissions(pub u16);

impl ChannelPermissions {
    pub const READ: ChannelPermissions = ChannelPermissions(0x01);
    pub const WRITE: ChannelPermissions = ChannelPermissions(0x10);

    pub fn contains(&self, other: ChannelPermissions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChannelPermissions {
    type Output = ChannelPermissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChannelPermissions(self.0 | rhs.0)
    }
}

/// A channel published by the peripheral role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub id: Uuid,
    pub properties: ChannelProperties,
    pub permissions: ChannelPermissions,
    /// Current value pushed to subscribers on notify
    pub value: Vec<u8>,
    pub write_mode: WriteMode,
}

impl ChannelDefinition {
    pub fn new(id: Uuid, properties: ChannelProperties, permissions: ChannelPermissions) -> Self {
        Self {
            id,
            properties,
            permissions,
            value: Vec::new(),
            write_mode: WriteMode::default(),
        }
    }

    /// Read-only channel that peers subscribe to
    pub fn default_read(id: Uuid) -> Self {
        Self::new(
            id,
            ChannelProperties::READ | ChannelProperties::NOTIFY,
            ChannelPermissions::READ,
        )
    }

    /// Channel peers write into and receive notifications from
    pub fn default_write(id: Uuid) -> Self {
        Self::new(
            id,
            ChannelProperties::WRITE | ChannelProperties::READ | ChannelProperties::NOTIFY,
            ChannelPermissions::WRITE | ChannelPermissions::READ,
        )
    }
}

/// Primary service registered with the acceptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: Uuid,
    pub read: ChannelDefinition,
    pub write: ChannelDefinition,
}

impl ServiceDefinition {
    pub fn channels(&self) -> [&ChannelDefinition; 2] {
        [&self.read, &self.write]
    }
}

/// Channel resolved from a remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: Uuid,
    pub properties: ChannelProperties,
    /// Descriptor ids attached to this channel
    pub descriptors: Vec<Uuid>,
}

impl ChannelInfo {
    /// Descriptors that configure notifications
    pub fn notification_descriptors(&self) -> impl Iterator<Item = &Uuid> {
        self.descriptors.iter().filter(|d| **d == CCCD_UUID)
    }
}

/// Service resolved from a remote peer after discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: Uuid,
    pub channels: Vec<ChannelInfo>,
}

impl ServiceInfo {
    pub fn channel(&self, id: Uuid) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.id == id)
    }
}

/// Advertising cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

/// Advertising transmit power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPower {
    UltraLow,
    Low,
    Medium,
    High,
}

/// Advertising parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiseSettings {
    pub connectable: bool,
    pub tx_power: TxPower,
    pub mode: AdvertiseMode,
    /// 0 disables the timeout
    pub timeout_ms: u32,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            connectable: true,
            tx_power: TxPower::High,
            mode: AdvertiseMode::LowLatency,
            timeout_ms: 0,
        }
    }
}

/// Advertisement payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiseData {
    pub include_device_name: bool,
    pub service_ids: Vec<Uuid>,
    pub include_tx_power: bool,
}

impl AdvertiseData {
    /// Device name + the given service id + power level
    pub fn for_service(service_id: Uuid) -> Self {
        Self {
            include_device_name: true,
            service_ids: vec![service_id],
            include_tx_power: true,
        }
    }
}

/// Remote write against a published channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub peer: PeerHandle,
    pub request_id: i32,
    pub channel: Uuid,
    /// Part of a prepared (multi-part) write
    pub prepared_write: bool,
    pub response_needed: bool,
    pub offset: usize,
    pub value: Vec<u8>,
}

/// Remote read against a published channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub peer: PeerHandle,
    pub request_id: i32,
    pub offset: usize,
    pub channel: Uuid,
}

/// Discovered advertiser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub peer: PeerHandle,
    /// RSSI in dBm
    pub rssi: i16,
}

impl ScanResult {
    pub fn new(peer: PeerHandle, rssi: i16) -> Self {
        Self { peer, rssi }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_match_is_exact() {
        let peer = PeerHandle::new("AA:BB", Some("Widget-42"));
        assert!(peer.name_matches("Widget-42"));
        assert!(!peer.name_matches("widget-42"));
        assert!(!peer.name_matches("Widget-4"));
        assert!(!peer.name_matches("Widget-42 "));
    }

    #[test]
    fn test_nameless_peer_never_matches() {
        let peer = PeerHandle::new("AA:BB", None);
        assert!(!peer.name_matches(""));
        assert!(!peer.name_matches("Widget-42"));
    }

    #[test]
    fn test_default_channel_layout() {
        let id = Uuid::from_u128(7);
        let read = ChannelDefinition::default_read(id);
        assert!(read.properties.contains(ChannelProperties::READ));
        assert!(read.properties.contains(ChannelProperties::NOTIFY));
        assert!(!read.properties.contains(ChannelProperties::WRITE));
        assert_eq!(read.permissions, ChannelPermissions::READ);

        let write = ChannelDefinition::default_write(id);
        assert!(write.properties.contains(ChannelProperties::WRITE));
        assert!(write.properties.contains(ChannelProperties::READ));
        assert!(write.properties.contains(ChannelProperties::NOTIFY));
        assert!(write.permissions.contains(ChannelPermissions::WRITE));
        assert!(write.permissions.contains(ChannelPermissions::READ));
    }

    #[test]
    fn test_notification_descriptor_filter() {
        let other = Uuid::from_u128(0x2901);
        let channel = ChannelInfo {
            id: Uuid::from_u128(1),
            properties: ChannelProperties::NOTIFY,
            descriptors: vec![other, CCCD_UUID],
        };
        let found: Vec<_> = channel.notification_descriptors().collect();
        assert_eq!(found, vec![&CCCD_UUID]);
    }

    #[test]
    fn test_default_advertise_settings() {
        let settings = AdvertiseSettings::default();
        assert!(settings.connectable);
        assert_eq!(settings.tx_power, TxPower::High);
        assert_eq!(settings.mode, AdvertiseMode::LowLatency);
    }

    #[test]
    fn test_gatt_status() {
        assert!(GattStatus::SUCCESS.is_success());
        assert!(!GattStatus::FAILURE.is_success());
        assert_eq!(format!("{}", GattStatus(133)), "status 133");
    }
}
