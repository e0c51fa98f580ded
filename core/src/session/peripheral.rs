//! Peripheral session
//!
//! Drives the accepting role: advertise the service name, publish the service
//! once advertising is confirmed, track connected peers, relay remote
//! read/write requests and fan data out through change notifications.

use super::base::{OwnerScope, Role, ScopeObserver, SessionBase, StartOutcome};
use super::callbacks::{AcceptorHandler, AdvertiseHandler, PeripheralCallback};
use super::pump::EventPump;
use crate::environment::{CapabilityListener, EnvironmentSource, LogPrompt, UserPrompt};
use crate::radio::{
    AcceptorHandle, AdvertiseData, AdvertiseSettings, ChannelDefinition, ConnectionState,
    GattStatus, PeerHandle, PeripheralRadio, PeripheralRadioEvent, ReadRequest,
    ServiceDefinition, WriteMode, WriteRequest,
};
use crate::settings::{DisconnectPolicy, LinkSettings, SessionIdentity};
use crate::LinkError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

// ============================================================================
// STATE
// ============================================================================

/// Lifecycle of a peripheral session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeripheralState {
    /// Not advertising, no acceptor
    Idle,
    /// Advertising requested, waiting for the platform result
    Advertising,
    /// Service registered, accepting connections
    Published,
}

impl std::fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Advertising => write!(f, "Advertising"),
            Self::Published => write!(f, "Published"),
        }
    }
}

struct PeripheralInner {
    state: PeripheralState,
    acceptor: Option<AcceptorHandle>,
    service: Option<ServiceDefinition>,
    peers: BTreeSet<PeerHandle>,
}

impl PeripheralInner {
    fn enter(&mut self, next: PeripheralState) {
        debug!("Peripheral state {} -> {}", self.state, next);
        self.state = next;
    }
}

enum PeripheralNotice {
    AdvertiseStarted(AdvertiseSettings),
    AdvertiseFailed(i32),
    PeerConnecting(PeerHandle, GattStatus),
    PeerConnected(PeerHandle, GattStatus),
    PeerDisconnecting(PeerHandle, GattStatus),
    PeerDisconnected(PeerHandle, GattStatus),
    MtuChanged(PeerHandle, u16),
    WriteRequest(WriteRequest),
    ReadRequest(ReadRequest),
}

// ============================================================================
// SESSION
// ============================================================================

/// Accepting-role session bound to one service identity
pub struct PeripheralSession {
    base: SessionBase<dyn PeripheralRadio>,
    identity: SessionIdentity,
    advertise_settings: AdvertiseSettings,
    advertise_data: AdvertiseData,
    read_channel: Option<ChannelDefinition>,
    write_channel: Option<ChannelDefinition>,
    disconnect_policy: DisconnectPolicy,
    callback: Option<Arc<dyn PeripheralCallback>>,
    advertise_handler: Option<Arc<dyn AdvertiseHandler>>,
    acceptor_handler: Option<Arc<dyn AcceptorHandler>>,
    inner: Mutex<PeripheralInner>,
    pump: EventPump<PeripheralRadioEvent>,
}

impl PeripheralSession {
    pub fn builder(identity: SessionIdentity) -> PeripheralSessionBuilder {
        PeripheralSessionBuilder::new(identity)
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn state(&self) -> PeripheralState {
        self.inner.lock().state
    }

    pub fn disconnect_policy(&self) -> DisconnectPolicy {
        self.disconnect_policy
    }

    /// Peers currently tracked as connected
    pub fn connected_peers(&self) -> BTreeSet<PeerHandle> {
        self.inner.lock().peers.clone()
    }

    /// Service registered with the acceptor, if published
    pub fn published_service(&self) -> Option<ServiceDefinition> {
        self.inner.lock().service.clone()
    }

    pub fn is_radio_on(&self) -> bool {
        self.base.is_radio_on()
    }

    pub fn is_location_on(&self) -> bool {
        self.base.is_location_on()
    }

    pub fn list_connected_peers(&self) -> BTreeSet<PeerHandle> {
        self.base.list_connected_peers()
    }

    pub fn is_destroyed(&self) -> bool {
        self.base.is_destroyed()
    }

    /// Set the local name and start advertising
    pub fn start_advertising(&self) -> Result<StartOutcome, LinkError> {
        if self.base.is_destroyed() {
            return Err(LinkError::Destroyed(Role::Peripheral));
        }

        if self.callback.is_none()
            && (self.advertise_handler.is_none() || self.acceptor_handler.is_none())
        {
            return Err(LinkError::MissingCallbacks(Role::Peripheral));
        }

        if !self.base.capability_gate() {
            return Ok(StartOutcome::CapabilityOff);
        }

        {
            let mut inner = self.inner.lock();
            if inner.state != PeripheralState::Idle {
                debug!("Advertising requested while {}", inner.state);
                return Ok(StartOutcome::AlreadyActive);
            }
            inner.enter(PeripheralState::Advertising);
        }

        self.command(|| self.begin_advertising());
        Ok(StartOutcome::Started)
    }

    /// Feed a facade event into the session
    pub fn handle_event(&self, event: PeripheralRadioEvent) {
        self.pump.push(event);
        self.pump.drain(|event| self.process(event));
    }

    /// Notify every tracked peer with `payload`; returns notifications issued
    pub fn send_data_to_all(&self, payload: &[u8]) -> usize {
        let (acceptor, channel, peers) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let (Some(acceptor), Some(service)) = (inner.acceptor, inner.service.as_mut()) else {
                debug!("Service not published; dropping {} bytes", payload.len());
                return 0;
            };
            if inner.peers.is_empty() {
                debug!("No connected peers; dropping {} bytes", payload.len());
                return 0;
            }
            (acceptor, stage_payload(service, payload), inner.peers.clone())
        };

        let radio = self.base.radio();
        self.command(|| {
            peers
                .iter()
                .filter(|peer| radio.notify_channel_changed(acceptor, peer, &channel, false))
                .count()
        })
    }

    /// Notify a single peer with `payload`
    pub fn send_data_to_one(&self, peer: &PeerHandle, payload: &[u8]) -> bool {
        let (acceptor, channel) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let (Some(acceptor), Some(service)) = (inner.acceptor, inner.service.as_mut()) else {
                debug!("Service not published; dropping {} bytes", payload.len());
                return false;
            };
            if !inner.peers.contains(peer) {
                debug!("Sending to untracked peer {}", peer);
            }
            (acceptor, stage_payload(service, payload))
        };

        self.command(|| {
            self.base
                .radio()
                .notify_channel_changed(acceptor, peer, &channel, false)
        })
    }

    /// Answer a remote read or write request
    pub fn respond(
        &self,
        peer: &PeerHandle,
        request_id: i32,
        status: GattStatus,
        offset: usize,
        value: &[u8],
    ) -> bool {
        let Some(acceptor) = self.inner.lock().acceptor else {
            debug!("No acceptor; response {} to {} dropped", request_id, peer);
            return false;
        };

        self.command(|| {
            self.base
                .radio()
                .send_response(acceptor, peer, request_id, status, offset, value)
        })
    }

    /// Stop advertising, drop every peer and close the acceptor
    pub fn stop_server(&self) {
        let teardown = {
            let mut inner = self.inner.lock();
            if inner.state == PeripheralState::Idle && inner.acceptor.is_none() {
                return;
            }
            take_server(&mut inner)
        };

        self.command(|| self.issue_teardown(teardown));
        info!("Peripheral server for '{}' stopped", self.identity.service_name);
    }

    /// Tear the session down; later calls are ignored
    pub fn destroy(&self) {
        if !self.base.begin_teardown() {
            return;
        }

        self.on_destroy();
        info!("Peripheral session for '{}' closed", self.identity.service_name);
    }

    fn on_destroy(&self) {
        self.stop_server();
    }

    /// Issue radio commands with events they trigger queued behind them
    ///
    /// Callers release the state lock first: another thread's drain may hand
    /// the pump to this thread while the platform is still inside the command.
    fn command<R>(&self, command: impl FnOnce() -> R) -> R {
        self.pump.run(command, |event| self.process(event))
    }

    fn begin_advertising(&self) {
        let radio = self.base.radio();
        if !radio.set_local_name(&self.identity.service_name) {
            warn!("Platform refused local name '{}'", self.identity.service_name);
        }
        radio.start_advertising(&self.advertise_settings, &self.advertise_data);
        info!("Advertising '{}'", self.identity.service_name);
    }

    /// Cancel tracked and platform-reported peers, then close the acceptor
    fn issue_teardown(&self, teardown: Teardown) {
        let radio = self.base.radio();
        if teardown.advertising {
            radio.stop_advertising();
        }

        if let Some(acceptor) = teardown.acceptor {
            radio.clear_services(acceptor);
            let mut peers = teardown.peers;
            peers.extend(radio.connected_peers());
            for peer in &peers {
                radio.cancel_connection(acceptor, peer);
            }
            radio.close_acceptor(acceptor);
        }
    }

    // ===== EVENT PROCESSING =====

    fn process(&self, event: PeripheralRadioEvent) {
        if self.forward_raw(&event) {
            return;
        }

        let notices = self.apply(event);
        self.dispatch(notices);
    }

    fn forward_raw(&self, event: &PeripheralRadioEvent) -> bool {
        if event.is_advertise_result() {
            if let Some(handler) = &self.advertise_handler {
                handler.on_advertise_result(event);
                return true;
            }
        } else if let Some(handler) = &self.acceptor_handler {
            handler.on_acceptor_event(event);
            return true;
        }
        false
    }

    fn apply(&self, event: PeripheralRadioEvent) -> Vec<PeripheralNotice> {
        let mut inner = self.inner.lock();
        let mut notices = Vec::new();

        match event {
            PeripheralRadioEvent::AdvertiseStarted(settings) => {
                if inner.state != PeripheralState::Advertising {
                    warn!("Advertise success while {}; ignoring", inner.state);
                    return notices;
                }
                notices.push(PeripheralNotice::AdvertiseStarted(settings));
                self.publish(&mut inner);
            }
            PeripheralRadioEvent::AdvertiseFailed { error_code } => {
                if inner.state != PeripheralState::Advertising {
                    warn!("Advertise failure while {}; ignoring", inner.state);
                    return notices;
                }
                error!("Advertising '{}' failed with code {}", self.identity.service_name, error_code);
                inner.enter(PeripheralState::Idle);
                notices.push(PeripheralNotice::AdvertiseFailed(error_code));
            }
            other => {
                if inner.state != PeripheralState::Published {
                    warn!("Acceptor event while {}; ignoring: {:?}", inner.state, other);
                    return notices;
                }
                self.on_acceptor_event(&mut inner, other, &mut notices);
            }
        }

        notices
    }

    fn on_acceptor_event(
        &self,
        inner: &mut PeripheralInner,
        event: PeripheralRadioEvent,
        notices: &mut Vec<PeripheralNotice>,
    ) {
        match event {
            PeripheralRadioEvent::AdvertiseStarted(_) | PeripheralRadioEvent::AdvertiseFailed { .. } => {}
            PeripheralRadioEvent::ConnectionStateChanged {
                peer,
                status,
                state,
            } => match state {
                ConnectionState::Connected => {
                    info!("Peer {} connected", peer);
                    inner.peers.insert(peer.clone());
                    notices.push(PeripheralNotice::PeerConnected(peer, status));
                }
                ConnectionState::Connecting => {
                    notices.push(PeripheralNotice::PeerConnecting(peer, status))
                }
                ConnectionState::Disconnecting => {
                    notices.push(PeripheralNotice::PeerDisconnecting(peer, status))
                }
                ConnectionState::Disconnected => {
                    inner.peers.remove(&peer);
                    match self.disconnect_policy {
                        DisconnectPolicy::RemovePeer => {
                            info!("Peer {} disconnected ({})", peer, status);
                            notices.push(PeripheralNotice::PeerDisconnected(peer, status));
                        }
                        DisconnectPolicy::RestartSession => {
                            info!("Peer {} disconnected ({}); restarting server", peer, status);
                            notices.push(PeripheralNotice::PeerDisconnected(peer, status));

                            let teardown = take_server(inner);
                            // Their own platform reports arrive while advertising and are ignored.
                            for other in &teardown.peers {
                                notices.push(PeripheralNotice::PeerDisconnected(
                                    other.clone(),
                                    GattStatus::SUCCESS,
                                ));
                            }
                            self.issue_teardown(teardown);

                            if self.base.capability_gate() {
                                inner.enter(PeripheralState::Advertising);
                                self.begin_advertising();
                            }
                        }
                    }
                }
            },
            PeripheralRadioEvent::WriteRequest(request) => {
                debug!(
                    "Write request {} from {}: {} bytes",
                    request.request_id,
                    request.peer,
                    request.value.len()
                );
                notices.push(PeripheralNotice::WriteRequest(request));
            }
            PeripheralRadioEvent::ReadRequest(request) => {
                debug!("Read request {} from {}", request.request_id, request.peer);
                notices.push(PeripheralNotice::ReadRequest(request));
            }
            PeripheralRadioEvent::MtuChanged { peer, mtu } => {
                debug!("MTU for {} is {}", peer, mtu);
                notices.push(PeripheralNotice::MtuChanged(peer, mtu));
            }
        }
    }

    /// Build the channels, open the acceptor and register the service
    fn publish(&self, inner: &mut PeripheralInner) {
        let service = ServiceDefinition {
            id: self.identity.service_id,
            read: self
                .read_channel
                .clone()
                .unwrap_or_else(|| ChannelDefinition::default_read(self.identity.read_channel)),
            write: self
                .write_channel
                .clone()
                .unwrap_or_else(|| ChannelDefinition::default_write(self.identity.write_channel)),
        };

        let radio = self.base.radio();
        let Some(acceptor) = radio.open_acceptor() else {
            error!(
                "Could not open acceptor; service {} not published",
                service.id
            );
            return;
        };

        if !radio.add_service(acceptor, &service) {
            warn!("Platform rejected service {}", service.id);
        }

        inner.acceptor = Some(acceptor);
        inner.service = Some(service);
        inner.enter(PeripheralState::Published);
        info!(
            "Service {} published on {}",
            self.identity.service_id, acceptor
        );
    }

    fn dispatch(&self, notices: Vec<PeripheralNotice>) {
        let Some(callback) = &self.callback else {
            return;
        };

        for notice in notices {
            match notice {
                PeripheralNotice::AdvertiseStarted(settings) => {
                    callback.on_advertise_started(&settings)
                }
                PeripheralNotice::AdvertiseFailed(code) => callback.on_advertise_failed(code),
                PeripheralNotice::PeerConnecting(peer, status) => {
                    callback.on_peer_connecting(&peer, status)
                }
                PeripheralNotice::PeerConnected(peer, status) => {
                    callback.on_peer_connected(&peer, status)
                }
                PeripheralNotice::PeerDisconnecting(peer, status) => {
                    callback.on_peer_disconnecting(&peer, status)
                }
                PeripheralNotice::PeerDisconnected(peer, status) => {
                    callback.on_peer_disconnected(&peer, status)
                }
                PeripheralNotice::MtuChanged(peer, mtu) => callback.on_mtu_changed(&peer, mtu),
                PeripheralNotice::WriteRequest(request) => callback.on_write_request(&request),
                PeripheralNotice::ReadRequest(request) => callback.on_read_request(&request),
            }
        }
    }
}

/// Server resources detached under the state lock, released afterwards
struct Teardown {
    advertising: bool,
    acceptor: Option<AcceptorHandle>,
    peers: BTreeSet<PeerHandle>,
}

fn take_server(inner: &mut PeripheralInner) -> Teardown {
    let teardown = Teardown {
        advertising: inner.state != PeripheralState::Idle,
        acceptor: inner.acceptor.take(),
        peers: std::mem::take(&mut inner.peers),
    };
    inner.service = None;
    inner.enter(PeripheralState::Idle);
    teardown
}

/// Load `payload` into the write channel and return the value to notify
fn stage_payload(service: &mut ServiceDefinition, payload: &[u8]) -> ChannelDefinition {
    service.write.value = payload.to_vec();
    service.write.write_mode = WriteMode::NoResponse;
    service.write.clone()
}

impl ScopeObserver for PeripheralSession {
    fn on_scope_destroyed(&self) {
        self.destroy();
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Construction-time configuration for a peripheral session
pub struct PeripheralSessionBuilder {
    identity: SessionIdentity,
    advertise_settings: Option<AdvertiseSettings>,
    advertise_data: Option<AdvertiseData>,
    read_channel: Option<ChannelDefinition>,
    write_channel: Option<ChannelDefinition>,
    disconnect_policy: DisconnectPolicy,
    callback: Option<Arc<dyn PeripheralCallback>>,
    advertise_handler: Option<Arc<dyn AdvertiseHandler>>,
    acceptor_handler: Option<Arc<dyn AcceptorHandler>>,
    capability_listener: Option<Arc<dyn CapabilityListener>>,
    prompt: Option<Arc<dyn UserPrompt>>,
    owner: Option<Arc<OwnerScope>>,
}

impl PeripheralSessionBuilder {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            advertise_settings: None,
            advertise_data: None,
            read_channel: None,
            write_channel: None,
            disconnect_policy: DisconnectPolicy::default(),
            callback: None,
            advertise_handler: None,
            acceptor_handler: None,
            capability_listener: None,
            prompt: None,
            owner: None,
        }
    }

    pub fn from_settings(settings: &LinkSettings) -> Self {
        Self::new(settings.identity.clone()).disconnect_policy(settings.disconnect_policy)
    }

    pub fn advertise_settings(mut self, settings: AdvertiseSettings) -> Self {
        self.advertise_settings = Some(settings);
        self
    }

    pub fn advertise_data(mut self, data: AdvertiseData) -> Self {
        self.advertise_data = Some(data);
        self
    }

    /// Pre-built read channel; defaults to READ|NOTIFY on the identity's read id
    pub fn read_channel(mut self, channel: ChannelDefinition) -> Self {
        self.read_channel = Some(channel);
        self
    }

    pub fn write_channel(mut self, channel: ChannelDefinition) -> Self {
        self.write_channel = Some(channel);
        self
    }

    pub fn disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn PeripheralCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn advertise_handler(mut self, handler: Arc<dyn AdvertiseHandler>) -> Self {
        self.advertise_handler = Some(handler);
        self
    }

    pub fn acceptor_handler(mut self, handler: Arc<dyn AcceptorHandler>) -> Self {
        self.acceptor_handler = Some(handler);
        self
    }

    pub fn capability_listener(mut self, listener: Arc<dyn CapabilityListener>) -> Self {
        self.capability_listener = Some(listener);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn owner(mut self, scope: &Arc<OwnerScope>) -> Self {
        self.owner = Some(scope.clone());
        self
    }

    pub fn build(
        self,
        radio: Arc<dyn PeripheralRadio>,
        environment: Arc<dyn EnvironmentSource>,
    ) -> Result<Arc<PeripheralSession>, LinkError> {
        self.identity.validate()?;
        for channel in self.read_channel.iter().chain(self.write_channel.iter()) {
            if channel.id == self.identity.service_id {
                return Err(LinkError::InvalidConfig(format!(
                    "channel {} reuses the service id",
                    channel.id
                )));
            }
        }
        if self.owner.as_ref().map_or(false, |scope| scope.is_destroyed()) {
            return Err(LinkError::InvalidConfig(
                "owner scope already destroyed".to_string(),
            ));
        }

        let prompt = self
            .prompt
            .unwrap_or_else(|| Arc::new(LogPrompt) as Arc<dyn UserPrompt>);
        let base = SessionBase::new(
            Role::Peripheral,
            radio,
            environment,
            self.capability_listener,
            prompt,
        )?;

        let advertise_data = self
            .advertise_data
            .unwrap_or_else(|| AdvertiseData::for_service(self.identity.service_id));

        let session = Arc::new(PeripheralSession {
            base,
            identity: self.identity,
            advertise_settings: self.advertise_settings.unwrap_or_default(),
            advertise_data,
            read_channel: self.read_channel,
            write_channel: self.write_channel,
            disconnect_policy: self.disconnect_policy,
            callback: self.callback,
            advertise_handler: self.advertise_handler,
            acceptor_handler: self.acceptor_handler,
            inner: Mutex::new(PeripheralInner {
                state: PeripheralState::Idle,
                acceptor: None,
                service: None,
                peers: BTreeSet::new(),
            }),
            pump: EventPump::new(),
        });

        if let Some(scope) = self.owner {
            let observer: Weak<PeripheralSession> = Arc::downgrade(&session);
            scope.observe(observer);
        }

        info!(
            "Peripheral session created for '{}' ({})",
            session.identity.service_name, session.disconnect_policy
        );
        Ok(session)
    }
}

// ============================================================================
// TESTS
// ============================================================================
