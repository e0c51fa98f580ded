/// Platform radio facade
///
/// Sessions never touch the Bluetooth stack directly. Platform code (Android,
/// CoreBluetooth, BlueZ bindings) implements these traits and feeds the
/// resulting asynchronous notifications back into the owning session as
/// `CentralRadioEvent` / `PeripheralRadioEvent` values.
///
/// Commands return immediately. A `bool` result mirrors the platform's
/// "request accepted" flag; completion arrives later as an event.

use super::types::{
    AcceptorHandle, AdvertiseData, AdvertiseSettings, ChannelDefinition, ConnectionState,
    GattStatus, LinkHandle, LinkPriority, PeerHandle, ReadRequest, ScanResult,
    ServiceDefinition, ServiceInfo, WriteMode, WriteRequest,
};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Capability queries shared by both roles
pub trait RadioPlatform: Send + Sync {
    /// Whether the device has a Bluetooth LE controller at all
    fn supports_low_energy(&self) -> bool;

    /// Whether the radio adapter is switched on
    fn is_radio_on(&self) -> bool;

    /// Whether the location provider is switched on
    fn is_location_on(&self) -> bool;

    /// Peers the platform currently reports as GATT-connected
    fn connected_peers(&self) -> BTreeSet<PeerHandle>;
}

/// Commands available to the initiating role
pub trait CentralRadio: RadioPlatform {
    fn start_scan(&self);

    fn stop_scan(&self);

    /// Open a link to a discovered peer
    fn connect(&self, peer: &PeerHandle) -> LinkHandle;

    fn disconnect(&self, link: LinkHandle);

    /// Release every platform resource held for the link
    fn close(&self, link: LinkHandle);

    /// Request an ATT MTU (payload + protocol overhead)
    fn request_mtu(&self, link: LinkHandle, mtu: u16) -> bool;

    fn request_link_priority(&self, link: LinkHandle, priority: LinkPriority) -> bool;

    fn discover_services(&self, link: LinkHandle) -> bool;

    /// Look up a discovered service on the remote side
    fn service(&self, link: LinkHandle, service_id: Uuid) -> Option<ServiceInfo>;

    fn set_notification(&self, link: LinkHandle, channel: Uuid, enabled: bool) -> bool;

    fn write_descriptor(&self, link: LinkHandle, channel: Uuid, descriptor: Uuid, value: &[u8])
        -> bool;

    fn write_channel(&self, link: LinkHandle, channel: Uuid, value: &[u8], mode: WriteMode)
        -> bool;

    fn read_channel(&self, link: LinkHandle, channel: Uuid) -> bool;
}

/// Commands available to the accepting role
pub trait PeripheralRadio: RadioPlatform {
    /// Set the adapter's locally advertised name
    fn set_local_name(&self, name: &str) -> bool;

    fn start_advertising(&self, settings: &AdvertiseSettings, data: &AdvertiseData);

    fn stop_advertising(&self);

    /// Open the GATT server that accepts connections
    fn open_acceptor(&self) -> Option<AcceptorHandle>;

    fn add_service(&self, acceptor: AcceptorHandle, service: &ServiceDefinition) -> bool;

    fn clear_services(&self, acceptor: AcceptorHandle);

    fn cancel_connection(&self, acceptor: AcceptorHandle, peer: &PeerHandle);

    fn close_acceptor(&self, acceptor: AcceptorHandle);

    /// Push the channel's current value to a subscribed peer
    fn notify_channel_changed(
        &self,
        acceptor: AcceptorHandle,
        peer: &PeerHandle,
        channel: &ChannelDefinition,
        confirm: bool,
    ) -> bool;

    /// Answer a remote read or write request
    fn send_response(
        &self,
        acceptor: AcceptorHandle,
        peer: &PeerHandle,
        request_id: i32,
        status: GattStatus,
        offset: usize,
        value: &[u8],
    ) -> bool;
}

/// Notifications delivered to a central session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralRadioEvent {
    ScanResult(ScanResult),
    ConnectionStateChanged {
        link: LinkHandle,
        status: GattStatus,
        state: ConnectionState,
    },
    ServicesDiscovered {
        link: LinkHandle,
        status: GattStatus,
    },
    /// Unsolicited notification from the remote side
    ChannelChanged {
        link: LinkHandle,
        channel: Uuid,
        value: Vec<u8>,
    },
    ChannelRead {
        link: LinkHandle,
        channel: Uuid,
        status: GattStatus,
        value: Vec<u8>,
    },
    ChannelWritten {
        link: LinkHandle,
        channel: Uuid,
        status: GattStatus,
    },
    MtuChanged {
        link: LinkHandle,
        mtu: u16,
        status: GattStatus,
    },
}

impl CentralRadioEvent {
    /// Link the event belongs to (scan results have none)
    pub fn link(&self) -> Option<LinkHandle> {
        match self {
            Self::ScanResult(_) => None,
            Self::ConnectionStateChanged { link, .. }
            | Self::ServicesDiscovered { link, .. }
            | Self::ChannelChanged { link, .. }
            | Self::ChannelRead { link, .. }
            | Self::ChannelWritten { link, .. }
            | Self::MtuChanged { link, .. } => Some(*link),
        }
    }
}

/// Notifications delivered to a peripheral session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralRadioEvent {
    AdvertiseStarted(AdvertiseSettings),
    AdvertiseFailed {
        error_code: i32,
    },
    ConnectionStateChanged {
        peer: PeerHandle,
        status: GattStatus,
        state: ConnectionState,
    },
    WriteRequest(WriteRequest),
    ReadRequest(ReadRequest),
    MtuChanged {
        peer: PeerHandle,
        mtu: u16,
    },
}

impl PeripheralRadioEvent {
    /// Whether the event reports on advertising rather than the acceptor
    pub fn is_advertise_result(&self) -> bool {
        matches!(self, Self::AdvertiseStarted(_) | Self::AdvertiseFailed { .. })
    }
}
