/// In-memory radio facade that records every command
///
/// Used by the test suites and the CLI simulations. Capability flags and the
/// remote GATT layout are configurable; events are never generated on its own,
/// the driver feeds them to the session explicitly.

use super::facade::{CentralRadio, PeripheralRadio, RadioPlatform};
use super::types::{
    AcceptorHandle, AdvertiseData, AdvertiseSettings, ChannelDefinition, ChannelInfo,
    ChannelProperties, GattStatus, LinkHandle, LinkPriority, PeerHandle, ServiceDefinition,
    ServiceInfo, WriteMode, CCCD_UUID,
};
use crate::settings::SessionIdentity;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

/// A command issued to the facade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan,
    StopScan,
    Connect(PeerHandle),
    Disconnect(LinkHandle),
    Close(LinkHandle),
    RequestMtu(LinkHandle, u16),
    RequestLinkPriority(LinkHandle, LinkPriority),
    DiscoverServices(LinkHandle),
    SetNotification {
        link: LinkHandle,
        channel: Uuid,
        enabled: bool,
    },
    WriteDescriptor {
        link: LinkHandle,
        channel: Uuid,
        descriptor: Uuid,
        value: Vec<u8>,
    },
    WriteChannel {
        link: LinkHandle,
        channel: Uuid,
        value: Vec<u8>,
        mode: WriteMode,
    },
    ReadChannel {
        link: LinkHandle,
        channel: Uuid,
    },
    SetLocalName(String),
    StartAdvertising {
        settings: AdvertiseSettings,
        data: AdvertiseData,
    },
    StopAdvertising,
    OpenAcceptor(AcceptorHandle),
    AddService {
        acceptor: AcceptorHandle,
        service: Uuid,
    },
    ClearServices(AcceptorHandle),
    CancelConnection {
        acceptor: AcceptorHandle,
        peer: PeerHandle,
    },
    CloseAcceptor(AcceptorHandle),
    NotifyChannelChanged {
        acceptor: AcceptorHandle,
        peer: PeerHandle,
        channel: Uuid,
        value: Vec<u8>,
        write_mode: WriteMode,
        confirm: bool,
    },
    SendResponse {
        acceptor: AcceptorHandle,
        peer: PeerHandle,
        request_id: i32,
        status: GattStatus,
        offset: usize,
        value: Vec<u8>,
    },
}

/// Recording implementation of both facade roles
pub struct RecordingRadio {
    supports_le: AtomicBool,
    radio_on: AtomicBool,
    location_on: AtomicBool,
    acceptor_available: AtomicBool,
    next_handle: AtomicU64,
    remote_services: RwLock<Vec<ServiceInfo>>,
    connected: RwLock<BTreeSet<PeerHandle>>,
    calls: RwLock<Vec<RadioCall>>,
}

impl RecordingRadio {
    /// Radio with LE support, adapter and location switched on
    pub fn new() -> Self {
        Self {
            supports_le: AtomicBool::new(true),
            radio_on: AtomicBool::new(true),
            location_on: AtomicBool::new(true),
            acceptor_available: AtomicBool::new(true),
            next_handle: AtomicU64::new(1),
            remote_services: RwLock::new(Vec::new()),
            connected: RwLock::new(BTreeSet::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Remote layout a peer publishing `identity` would expose
    pub fn mirror_of(identity: &SessionIdentity) -> ServiceInfo {
        ServiceInfo {
            id: identity.service_id,
            channels: vec![
                ChannelInfo {
                    id: identity.read_channel,
                    properties: ChannelProperties::READ | ChannelProperties::NOTIFY,
                    descriptors: vec![CCCD_UUID],
                },
                ChannelInfo {
                    id: identity.write_channel,
                    properties: ChannelProperties::WRITE
                        | ChannelProperties::READ
                        | ChannelProperties::NOTIFY,
                    descriptors: vec![CCCD_UUID],
                },
            ],
        }
    }

    pub fn with_remote_service(self, service: ServiceInfo) -> Self {
        self.remote_services.write().push(service);
        self
    }

    pub fn set_supports_low_energy(&self, supported: bool) {
        self.supports_le.store(supported, Ordering::SeqCst);
    }

    pub fn set_radio_on(&self, on: bool) {
        self.radio_on.store(on, Ordering::SeqCst);
    }

    pub fn set_location_on(&self, on: bool) {
        self.location_on.store(on, Ordering::SeqCst);
    }

    pub fn set_acceptor_available(&self, available: bool) {
        self.acceptor_available.store(available, Ordering::SeqCst);
    }

    pub fn add_connected_peer(&self, peer: PeerHandle) {
        self.connected.write().insert(peer);
    }

    pub fn remove_connected_peer(&self, peer: &PeerHandle) {
        self.connected.write().remove(peer);
    }

    /// Snapshot of every command issued so far
    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.read().clone()
    }

    /// Drain the recorded commands
    pub fn take_calls(&self) -> Vec<RadioCall> {
        std::mem::take(&mut *self.calls.write())
    }

    /// Number of recorded commands matching `predicate`
    pub fn count(&self, predicate: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.read().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: RadioCall) {
        debug!("radio call: {:?}", call);
        self.calls.write().push(call);
    }

    fn mint(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for RecordingRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioPlatform for RecordingRadio {
    fn supports_low_energy(&self) -> bool {
        self.supports_le.load(Ordering::SeqCst)
    }

    fn is_radio_on(&self) -> bool {
        self.radio_on.load(Ordering::SeqCst)
    }

    fn is_location_on(&self) -> bool {
        self.location_on.load(Ordering::SeqCst)
    }

    fn connected_peers(&self) -> BTreeSet<PeerHandle> {
        self.connected.read().clone()
    }
}

impl CentralRadio for RecordingRadio {
    fn start_scan(&self) {
        self.record(RadioCall::StartScan);
    }

    fn stop_scan(&self) {
        self.record(RadioCall::StopScan);
    }

    fn connect(&self, peer: &PeerHandle) -> LinkHandle {
        self.record(RadioCall::Connect(peer.clone()));
        LinkHandle(self.mint())
    }

    fn disconnect(&self, link: LinkHandle) {
        self.record(RadioCall::Disconnect(link));
    }

    fn close(&self, link: LinkHandle) {
        self.record(RadioCall::Close(link));
    }

    fn request_mtu(&self, link: LinkHandle, mtu: u16) -> bool {
        self.record(RadioCall::RequestMtu(link, mtu));
        true
    }

    fn request_link_priority(&self, link: LinkHandle, priority: LinkPriority) -> bool {
        self.record(RadioCall::RequestLinkPriority(link, priority));
        true
    }

    fn discover_services(&self, link: LinkHandle) -> bool {
        self.record(RadioCall::DiscoverServices(link));
        true
    }

    fn service(&self, _link: LinkHandle, service_id: Uuid) -> Option<ServiceInfo> {
        self.remote_services
            .read()
            .iter()
            .find(|s| s.id == service_id)
            .cloned()
    }

    fn set_notification(&self, link: LinkHandle, channel: Uuid, enabled: bool) -> bool {
        self.record(RadioCall::SetNotification {
            link,
            channel,
            enabled,
        });
        true
    }

    fn write_descriptor(
        &self,
        link: LinkHandle,
        channel: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> bool {
        self.record(RadioCall::WriteDescriptor {
            link,
            channel,
            descriptor,
            value: value.to_vec(),
        });
        true
    }

    fn write_channel(&self, link: LinkHandle, channel: Uuid, value: &[u8], mode: WriteMode) -> bool {
        self.record(RadioCall::WriteChannel {
            link,
            channel,
            value: value.to_vec(),
            mode,
        });
        true
    }

    fn read_channel(&self, link: LinkHandle, channel: Uuid) -> bool {
        self.record(RadioCall::ReadChannel { link, channel });
        true
    }
}

impl PeripheralRadio for RecordingRadio {
    fn set_local_name(&self, name: &str) -> bool {
        self.record(RadioCall::SetLocalName(name.to_string()));
        true
    }

    fn start_advertising(&self, settings: &AdvertiseSettings, data: &AdvertiseData) {
        self.record(RadioCall::StartAdvertising {
            settings: settings.clone(),
            data: data.clone(),
        });
    }

    fn stop_advertising(&self) {
        self.record(RadioCall::StopAdvertising);
    }

    fn open_acceptor(&self) -> Option<AcceptorHandle> {
        if !self.acceptor_available.load(Ordering::SeqCst) {
            return None;
        }
        let acceptor = AcceptorHandle(self.mint());
        self.record(RadioCall::OpenAcceptor(acceptor));
        Some(acceptor)
    }

    fn add_service(&self, acceptor: AcceptorHandle, service: &ServiceDefinition) -> bool {
        self.record(RadioCall::AddService {
            acceptor,
            service: service.id,
        });
        true
    }

    fn clear_services(&self, acceptor: AcceptorHandle) {
        self.record(RadioCall::ClearServices(acceptor));
    }

    fn cancel_connection(&self, acceptor: AcceptorHandle, peer: &PeerHandle) {
        self.record(RadioCall::CancelConnection {
            acceptor,
            peer: peer.clone(),
        });
    }

    fn close_acceptor(&self, acceptor: AcceptorHandle) {
        self.record(RadioCall::CloseAcceptor(acceptor));
    }

    fn notify_channel_changed(
        &self,
        acceptor: AcceptorHandle,
        peer: &PeerHandle,
        channel: &ChannelDefinition,
        confirm: bool,
    ) -> bool {
        self.record(RadioCall::NotifyChannelChanged {
            acceptor,
            peer: peer.clone(),
            channel: channel.id,
            value: channel.value.clone(),
            write_mode: channel.write_mode,
            confirm,
        });
        true
    }

    fn send_response(
        &self,
        acceptor: AcceptorHandle,
        peer: &PeerHandle,
        request_id: i32,
        status: GattStatus,
        offset: usize,
        value: &[u8],
    ) -> bool {
        self.record(RadioCall::SendResponse {
            acceptor,
            peer: peer.clone(),
            request_id,
            status,
            offset,
            value: value.to_vec(),
        });
        true
    }
}
