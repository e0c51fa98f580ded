//! Session callback contracts
//!
//! Application callbacks receive the high-level events a session derives from
//! the radio. Raw handlers take over a whole event category and bypass the
//! session state machine for it.
//!
//! Everything here is invoked synchronously from the event-delivery context,
//! after the session has released its own lock.

use crate::radio::{
    AdvertiseSettings, CentralRadioEvent, GattStatus, LinkHandle, PeerHandle,
    PeripheralRadioEvent, ReadRequest, ScanResult, WriteRequest,
};
use uuid::Uuid;

/// Application events for the initiating role
pub trait CentralCallback: Send + Sync {
    /// A scan result matched the configured service name
    fn on_peer_discovered(&self, peer: &PeerHandle);

    fn on_connecting(&self, link: LinkHandle, status: GattStatus);

    fn on_connected(&self, link: LinkHandle, status: GattStatus);

    fn on_disconnecting(&self, link: LinkHandle, status: GattStatus);

    /// The link dropped; the session is already scanning again
    fn on_connect_failed(&self, link: LinkHandle, status: GattStatus);

    /// Remote services were discovered and notifications are being enabled
    fn on_service_bound(&self, link: LinkHandle, status: GattStatus);

    /// Result of handing the MTU request to the platform
    fn on_mtu_requested(&self, accepted: bool);

    fn on_mtu_changed(&self, link: LinkHandle, mtu: u16, status: GattStatus);

    /// Unsolicited data pushed by the remote side
    fn on_notify(&self, link: LinkHandle, channel: Uuid, value: &[u8]);

    fn on_read_complete(&self, link: LinkHandle, channel: Uuid, status: GattStatus, value: &[u8]);

    fn on_write_complete(&self, link: LinkHandle, channel: Uuid, status: GattStatus);
}

/// Application events for the accepting role
pub trait PeripheralCallback: Send + Sync {
    fn on_advertise_started(&self, settings: &AdvertiseSettings);

    fn on_advertise_failed(&self, error_code: i32);

    fn on_peer_connecting(&self, peer: &PeerHandle, status: GattStatus);

    fn on_peer_connected(&self, peer: &PeerHandle, status: GattStatus);

    fn on_peer_disconnecting(&self, peer: &PeerHandle, status: GattStatus);

    /// A peer dropped; what happened to the server depends on the disconnect policy
    fn on_peer_disconnected(&self, peer: &PeerHandle, status: GattStatus);

    fn on_mtu_changed(&self, peer: &PeerHandle, mtu: u16);

    /// A remote write; answer through `PeripheralSession::respond` when
    /// `response_needed` is set
    fn on_write_request(&self, request: &WriteRequest);

    fn on_read_request(&self, request: &ReadRequest);
}

/// Replaces the central's default name matcher
pub trait ScanHandler: Send + Sync {
    fn on_scan_result(&self, result: &ScanResult);
}

/// Replaces the central's link state machine for every non-scan event
pub trait LinkHandler: Send + Sync {
    fn on_link_event(&self, event: &CentralRadioEvent);
}

/// Replaces the peripheral's handling of advertise results
pub trait AdvertiseHandler: Send + Sync {
    fn on_advertise_result(&self, event: &PeripheralRadioEvent);
}

/// Replaces the peripheral's handling of connection and request events
pub trait AcceptorHandler: Send + Sync {
    fn on_acceptor_event(&self, event: &PeripheralRadioEvent);
}
