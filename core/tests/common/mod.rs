#![allow(dead_code)]

use blelink_core::radio::{AdvertiseSettings, ReadRequest, WriteRequest};
use blelink_core::{
    CentralCallback, GattStatus, LinkHandle, PeerHandle, PeripheralCallback, Prompt, UserPrompt,
};
use parking_lot::Mutex;
use uuid::Uuid;

/// Central callback that records every event as a short line
#[derive(Default)]
pub struct CentralLog {
    lines: Mutex<Vec<String>>,
}

impl CentralLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn push(&self, line: String) {
        self.lines.lock().push(line);
    }
}

impl CentralCallback for CentralLog {
    fn on_peer_discovered(&self, peer: &PeerHandle) {
        self.push(format!("discovered {}", peer.address));
    }
    fn on_connecting(&self, link: LinkHandle, _status: GattStatus) {
        self.push(format!("connecting {}", link));
    }
    fn on_connected(&self, link: LinkHandle, _status: GattStatus) {
        self.push(format!("connected {}", link));
    }
    fn on_disconnecting(&self, link: LinkHandle, _status: GattStatus) {
        self.push(format!("disconnecting {}", link));
    }
    fn on_connect_failed(&self, link: LinkHandle, status: GattStatus) {
        self.push(format!("connect-failed {} {}", link, status.0));
    }
    fn on_service_bound(&self, link: LinkHandle, _status: GattStatus) {
        self.push(format!("bound {}", link));
    }
    fn on_mtu_requested(&self, accepted: bool) {
        self.push(format!("mtu-requested {}", accepted));
    }
    fn on_mtu_changed(&self, _link: LinkHandle, mtu: u16, _status: GattStatus) {
        self.push(format!("mtu {}", mtu));
    }
    fn on_notify(&self, _link: LinkHandle, _channel: Uuid, value: &[u8]) {
        self.push(format!("notify {}", String::from_utf8_lossy(value)));
    }
    fn on_read_complete(&self, _link: LinkHandle, _channel: Uuid, _status: GattStatus, value: &[u8]) {
        self.push(format!("read {}", String::from_utf8_lossy(value)));
    }
    fn on_write_complete(&self, _link: LinkHandle, _channel: Uuid, status: GattStatus) {
        self.push(format!("written {}", status.0));
    }
}

/// Peripheral callback that records every event as a short line
#[derive(Default)]
pub struct PeripheralLog {
    lines: Mutex<Vec<String>>,
}

impl PeripheralLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn push(&self, line: String) {
        self.lines.lock().push(line);
    }
}

impl PeripheralCallback for PeripheralLog {
    fn on_advertise_started(&self, _settings: &AdvertiseSettings) {
        self.push("advertising".to_string());
    }
    fn on_advertise_failed(&self, error_code: i32) {
        self.push(format!("advertise-failed {}", error_code));
    }
    fn on_peer_connecting(&self, peer: &PeerHandle, _status: GattStatus) {
        self.push(format!("peer-connecting {}", peer.address));
    }
    fn on_peer_connected(&self, peer: &PeerHandle, _status: GattStatus) {
        self.push(format!("peer-connected {}", peer.address));
    }
    fn on_peer_disconnecting(&self, peer: &PeerHandle, _status: GattStatus) {
        self.push(format!("peer-disconnecting {}", peer.address));
    }
    fn on_peer_disconnected(&self, peer: &PeerHandle, _status: GattStatus) {
        self.push(format!("peer-disconnected {}", peer.address));
    }
    fn on_mtu_changed(&self, peer: &PeerHandle, mtu: u16) {
        self.push(format!("mtu {} {}", peer.address, mtu));
    }
    fn on_write_request(&self, request: &WriteRequest) {
        self.push(format!(
            "write {} {}",
            request.request_id,
            String::from_utf8_lossy(&request.value)
        ));
    }
    fn on_read_request(&self, request: &ReadRequest) {
        self.push(format!("read {}", request.request_id));
    }
}

/// Prompt sink that remembers what it was asked to show
#[derive(Default)]
pub struct PromptLog {
    shown: Mutex<Vec<Prompt>>,
}

impl PromptLog {
    pub fn shown(&self) -> Vec<Prompt> {
        self.shown.lock().clone()
    }
}

impl UserPrompt for PromptLog {
    fn show(&self, prompt: Prompt) {
        self.shown.lock().push(prompt);
    }
}
