//! Central session
//!
//! Drives the initiating role: scan for the configured service name, connect,
//! negotiate the MTU, discover the service, enable notifications on the read
//! channel and exchange data. A dropped link always sends the session back to
//! scanning; only `stop_connection` or `destroy` end the cycle.

use super::base::{OwnerScope, Role, ScopeObserver, SessionBase, StartOutcome};
use super::callbacks::{CentralCallback, LinkHandler, ScanHandler};
use super::pump::EventPump;
use crate::environment::{CapabilityListener, EnvironmentSource, LogPrompt, UserPrompt};
use crate::radio::{
    CentralRadio, CentralRadioEvent, ConnectionState, GattStatus, LinkHandle, LinkPriority,
    PeerHandle, WriteMode, ENABLE_NOTIFICATION_VALUE, MAX_MTU_PAYLOAD,
};
use crate::settings::{effective_mtu, requested_mtu, LinkSettings, SessionIdentity, SettingsError};
use crate::LinkError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// STATE
// ============================================================================

/// Lifecycle of a central session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentralState {
    /// Not scanning, no link
    Idle,
    /// Looking for a peer advertising the service name
    Scanning,
    /// Connection requested, waiting for the platform
    Connecting,
    /// Connected, waiting for the MTU result
    Negotiating,
    /// Service discovery issued
    ServiceBinding,
    /// Notifications enabled, data may flow
    Ready,
}

impl std::fmt::Display for CentralState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Negotiating => write!(f, "Negotiating"),
            Self::ServiceBinding => write!(f, "ServiceBinding"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

struct CentralInner {
    state: CentralState,
    link: Option<LinkHandle>,
}

impl CentralInner {
    fn enter(&mut self, next: CentralState) {
        debug!("Central state {} -> {}", self.state, next);
        self.state = next;
    }
}

enum CentralStep {
    Radio(CentralRadioEvent),
    DiscoverServices(LinkHandle),
}

/// Callback invocation collected under the state lock
enum CentralNotice {
    PeerDiscovered(PeerHandle),
    Connecting(LinkHandle, GattStatus),
    Connected(LinkHandle, GattStatus),
    Disconnecting(LinkHandle, GattStatus),
    ConnectFailed(LinkHandle, GattStatus),
    ServiceBound(LinkHandle, GattStatus),
    MtuRequested(bool),
    MtuChanged(LinkHandle, u16, GattStatus),
    Notify(LinkHandle, Uuid, Vec<u8>),
    ReadComplete(LinkHandle, Uuid, GattStatus, Vec<u8>),
    WriteComplete(LinkHandle, Uuid, GattStatus),
}

// ============================================================================
// SESSION
// ============================================================================

/// Initiating-role session bound to one service identity
pub struct CentralSession {
    base: SessionBase<dyn CentralRadio>,
    identity: SessionIdentity,
    mtu_size: u16,
    callback: Option<Arc<dyn CentralCallback>>,
    scan_handler: Option<Arc<dyn ScanHandler>>,
    link_handler: Option<Arc<dyn LinkHandler>>,
    inner: Mutex<CentralInner>,
    pump: EventPump<CentralStep>,
}

impl CentralSession {
    pub fn builder(identity: SessionIdentity) -> CentralSessionBuilder {
        CentralSessionBuilder::new(identity)
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn state(&self) -> CentralState {
        self.inner.lock().state
    }

    /// Handle of the current link, if any
    pub fn link(&self) -> Option<LinkHandle> {
        self.inner.lock().link
    }

    /// Payload MTU after the default was applied
    pub fn effective_mtu(&self) -> u16 {
        self.mtu_size
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

    /// Start scanning for the configured service name
    pub fn start_discovery(&self) -> Result<StartOutcome, LinkError> {
        if self.base.is_destroyed() {
            return Err(LinkError::Destroyed(Role::Central));
        }

        if self.callback.is_none() && (self.scan_handler.is_none() || self.link_handler.is_none())
        {
            return Err(LinkError::MissingCallbacks(Role::Central));
        }

        if !self.base.capability_gate() {
            return Ok(StartOutcome::CapabilityOff);
        }

        {
            let mut inner = self.inner.lock();
            if inner.state != CentralState::Idle {
                debug!("Discovery requested while {}", inner.state);
                return Ok(StartOutcome::AlreadyActive);
            }
            inner.enter(CentralState::Scanning);
        }

        self.command(|| self.base.radio().start_scan());
        info!("Scanning for '{}'", self.identity.service_name);
        Ok(StartOutcome::Started)
    }

    /// Feed a facade event into the session
    pub fn handle_event(&self, event: CentralRadioEvent) {
        self.pump.push(CentralStep::Radio(event));
        self.pump.drain(|step| self.process(step));
    }

    /// Write `payload` to the remote write channel
    ///
    /// Returns false without touching the radio until the service is bound.
    pub fn send_data(&self, payload: &[u8], mode: WriteMode) -> bool {
        let Some(link) = self.bound_link() else {
            debug!("Service not bound; dropping {} bytes", payload.len());
            return false;
        };
        let Some(channel) = self.remote_channel(link, self.identity.write_channel) else {
            warn!("Write channel {} not found on {}", self.identity.write_channel, link);
            return false;
        };

        let radio = self.base.radio();
        self.command(|| {
            radio.set_notification(link, channel, true);
            radio.write_channel(link, channel, payload, mode)
        })
    }

    /// Read the remote read channel; the value arrives as a read completion
    pub fn request_read(&self) -> bool {
        let Some(link) = self.bound_link() else {
            debug!("Service not bound; read skipped");
            return false;
        };
        let Some(channel) = self.remote_channel(link, self.identity.read_channel) else {
            warn!("Read channel {} not found on {}", self.identity.read_channel, link);
            return false;
        };

        self.command(|| self.base.radio().read_channel(link, channel))
    }

    /// Drop the link and stop scanning
    pub fn stop_connection(&self) {
        let (link, was_scanning) = {
            let mut inner = self.inner.lock();
            if inner.state == CentralState::Idle && inner.link.is_none() {
                return;
            }
            let was_scanning = inner.state == CentralState::Scanning;
            inner.enter(CentralState::Idle);
            (inner.link.take(), was_scanning)
        };

        let radio = self.base.radio();
        self.command(|| {
            if let Some(link) = link {
                radio.disconnect(link);
                radio.close(link);
            }
            if was_scanning {
                radio.stop_scan();
            }
        });

        info!("Central session for '{}' stopped", self.identity.service_name);
    }

    pub fn stop_discovery(&self) {
        self.stop_connection();
    }

    /// Tear the session down; later calls are ignored
    pub fn destroy(&self) {
        if !self.base.begin_teardown() {
            return;
        }

        self.on_destroy();
        info!("Central session for '{}' closed", self.identity.service_name);
    }

    fn on_destroy(&self) {
        self.stop_connection();
    }

    /// Issue radio commands with events they trigger queued behind them
    fn command<R>(&self, command: impl FnOnce() -> R) -> R {
        self.pump.run(command, |step| self.process(step))
    }

    fn bound_link(&self) -> Option<LinkHandle> {
        let inner = self.inner.lock();
        if inner.state == CentralState::Ready {
            inner.link
        } else {
            None
        }
    }

    fn remote_channel(&self, link: LinkHandle, channel: Uuid) -> Option<Uuid> {
        let service = self.base.radio().service(link, self.identity.service_id)?;
        service.channel(channel).map(|c| c.id)
    }

    // ===== EVENT PROCESSING =====

    fn process(&self, step: CentralStep) {
        let notices = match step {
            CentralStep::Radio(event) => {
                if self.forward_raw(&event) {
                    return;
                }
                self.apply(event)
            }
            CentralStep::DiscoverServices(link) => {
                self.discover_services(link);
                Vec::new()
            }
        };

        self.dispatch(notices);
    }

    /// Hand the event to a raw handler if one owns its category
    fn forward_raw(&self, event: &CentralRadioEvent) -> bool {
        if let CentralRadioEvent::ScanResult(result) = event {
            if let Some(handler) = &self.scan_handler {
                handler.on_scan_result(result);
                return true;
            }
        } else if let Some(handler) = &self.link_handler {
            handler.on_link_event(event);
            return true;
        }
        false
    }

    fn apply(&self, event: CentralRadioEvent) -> Vec<CentralNotice> {
        let mut inner = self.inner.lock();
        let mut notices = Vec::new();

        if let CentralRadioEvent::ScanResult(result) = event {
            self.on_scan_result(&mut inner, result.peer, &mut notices);
            return notices;
        }

        if event.link().is_none() || event.link() != inner.link {
            debug!("Dropping event for stale link: {:?}", event);
            return notices;
        }

        match event {
            CentralRadioEvent::ScanResult(_) => {}
            CentralRadioEvent::ConnectionStateChanged {
                link,
                status,
                state,
            } => self.on_connection_state(&mut inner, link, status, state, &mut notices),
            CentralRadioEvent::MtuChanged { link, mtu, status } => {
                debug!("MTU on {} is {} ({})", link, mtu, status);
                notices.push(CentralNotice::MtuChanged(link, mtu, status));
                // Renegotiation on a bound link is reported without rediscovery.
                if inner.state == CentralState::Negotiating {
                    self.pump.push(CentralStep::DiscoverServices(link));
                }
            }
            CentralRadioEvent::ServicesDiscovered { link, status } => {
                if inner.state != CentralState::ServiceBinding {
                    warn!("Service discovery result on {} while {}; ignoring", link, inner.state);
                } else {
                    if !status.is_success() {
                        warn!("Service discovery on {} finished with {}", link, status);
                    }
                    notices.push(CentralNotice::ServiceBound(link, status));
                    self.enable_notifications(link);
                    inner.enter(CentralState::Ready);
                    info!("Link {} ready", link);
                }
            }
            CentralRadioEvent::ChannelChanged {
                link,
                channel,
                value,
            } => notices.push(CentralNotice::Notify(link, channel, value)),
            CentralRadioEvent::ChannelRead {
                link,
                channel,
                status,
                value,
            } => notices.push(CentralNotice::ReadComplete(link, channel, status, value)),
            CentralRadioEvent::ChannelWritten {
                link,
                channel,
                status,
            } => notices.push(CentralNotice::WriteComplete(link, channel, status)),
        }

        notices
    }

    fn on_scan_result(
        &self,
        inner: &mut CentralInner,
        peer: PeerHandle,
        notices: &mut Vec<CentralNotice>,
    ) {
        if inner.state != CentralState::Scanning {
            debug!("Ignoring scan result from {} while {}", peer, inner.state);
            return;
        }

        if !peer.name_matches(&self.identity.service_name) {
            return;
        }

        info!("Matched peer {} for '{}'", peer, self.identity.service_name);
        let radio = self.base.radio();
        radio.stop_scan();
        let link = radio.connect(&peer);
        inner.link = Some(link);
        inner.enter(CentralState::Connecting);
        notices.push(CentralNotice::PeerDiscovered(peer));
    }

    fn on_connection_state(
        &self,
        inner: &mut CentralInner,
        link: LinkHandle,
        status: GattStatus,
        state: ConnectionState,
        notices: &mut Vec<CentralNotice>,
    ) {
        let radio = self.base.radio();

        match state {
            ConnectionState::Connected => {
                if inner.state != CentralState::Connecting {
                    warn!("Connected event on {} while {}; ignoring", link, inner.state);
                    return;
                }

                notices.push(CentralNotice::Connected(link, status));
                let accepted = radio.request_mtu(link, requested_mtu(self.mtu_size));
                notices.push(CentralNotice::MtuRequested(accepted));
                radio.request_link_priority(link, LinkPriority::Balanced);
                inner.enter(CentralState::Negotiating);
            }
            ConnectionState::Connecting => notices.push(CentralNotice::Connecting(link, status)),
            ConnectionState::Disconnecting => {
                notices.push(CentralNotice::Disconnecting(link, status))
            }
            ConnectionState::Disconnected => {
                radio.close(link);
                inner.link = None;
                radio.start_scan();
                inner.enter(CentralState::Scanning);
                info!(
                    "Link {} dropped ({}); scanning for '{}' again",
                    link, status, self.identity.service_name
                );
                notices.push(CentralNotice::ConnectFailed(link, status));
            }
        }
    }

    /// Continuation queued by the MTU result
    fn discover_services(&self, link: LinkHandle) {
        let mut inner = self.inner.lock();
        if inner.link != Some(link) || inner.state != CentralState::Negotiating {
            debug!("Discarding service discovery for {}", link);
            return;
        }

        if !self.base.radio().discover_services(link) {
            warn!("Platform refused service discovery on {}", link);
        }
        inner.enter(CentralState::ServiceBinding);
    }

    /// Subscribe to the read channel and write every CCCD
    fn enable_notifications(&self, link: LinkHandle) {
        let radio = self.base.radio();
        let Some(service) = radio.service(link, self.identity.service_id) else {
            warn!("Service {} not found on {}", self.identity.service_id, link);
            return;
        };
        let Some(channel) = service.channel(self.identity.read_channel) else {
            warn!("Read channel {} not found on {}", self.identity.read_channel, link);
            return;
        };

        if !radio.set_notification(link, channel.id, true) {
            warn!("Platform refused notifications on {}", channel.id);
            return;
        }

        for descriptor in channel.notification_descriptors() {
            radio.write_descriptor(link, channel.id, *descriptor, &ENABLE_NOTIFICATION_VALUE);
        }
    }

    fn dispatch(&self, notices: Vec<CentralNotice>) {
        let Some(callback) = &self.callback else {
            return;
        };

        for notice in notices {
            match notice {
                CentralNotice::PeerDiscovered(peer) => callback.on_peer_discovered(&peer),
                CentralNotice::Connecting(link, status) => callback.on_connecting(link, status),
                CentralNotice::Connected(link, status) => callback.on_connected(link, status),
                CentralNotice::Disconnecting(link, status) => {
                    callback.on_disconnecting(link, status)
                }
                CentralNotice::ConnectFailed(link, status) => {
                    callback.on_connect_failed(link, status)
                }
                CentralNotice::ServiceBound(link, status) => {
                    callback.on_service_bound(link, status)
                }
                CentralNotice::MtuRequested(accepted) => callback.on_mtu_requested(accepted),
                CentralNotice::MtuChanged(link, mtu, status) => {
                    callback.on_mtu_changed(link, mtu, status)
                }
                CentralNotice::Notify(link, channel, value) => {
                    callback.on_notify(link, channel, &value)
                }
                CentralNotice::ReadComplete(link, channel, status, value) => {
                    callback.on_read_complete(link, channel, status, &value)
                }
                CentralNotice::WriteComplete(link, channel, status) => {
                    callback.on_write_complete(link, channel, status)
                }
            }
        }
    }
}

impl ScopeObserver for CentralSession {
    fn on_scope_destroyed(&self) {
        self.destroy();
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Construction-time configuration for a central session
pub struct CentralSessionBuilder {
    identity: SessionIdentity,
    mtu_size: u16,
    callback: Option<Arc<dyn CentralCallback>>,
    scan_handler: Option<Arc<dyn ScanHandler>>,
    link_handler: Option<Arc<dyn LinkHandler>>,
    capability_listener: Option<Arc<dyn CapabilityListener>>,
    prompt: Option<Arc<dyn UserPrompt>>,
    owner: Option<Arc<OwnerScope>>,
}

impl CentralSessionBuilder {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            mtu_size: 0,
            callback: None,
            scan_handler: None,
            link_handler: None,
            capability_listener: None,
            prompt: None,
            owner: None,
        }
    }

    pub fn from_settings(settings: &LinkSettings) -> Self {
        Self::new(settings.identity.clone()).mtu_size(settings.mtu_size)
    }

    /// Payload MTU; 0 selects the default
    pub fn mtu_size(mut self, mtu_size: u16) -> Self {
        self.mtu_size = mtu_size;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn CentralCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn scan_handler(mut self, handler: Arc<dyn ScanHandler>) -> Self {
        self.scan_handler = Some(handler);
        self
    }

    pub fn link_handler(mut self, handler: Arc<dyn LinkHandler>) -> Self {
        self.link_handler = Some(handler);
        self
    }

    /// Replace the default prompting listener
    pub fn capability_listener(mut self, listener: Arc<dyn CapabilityListener>) -> Self {
        self.capability_listener = Some(listener);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Destroy the session together with `scope`
    pub fn owner(mut self, scope: &Arc<OwnerScope>) -> Self {
        self.owner = Some(scope.clone());
        self
    }

    pub fn build(
        self,
        radio: Arc<dyn CentralRadio>,
        environment: Arc<dyn EnvironmentSource>,
    ) -> Result<Arc<CentralSession>, LinkError> {
        self.identity.validate()?;
        if self.mtu_size > MAX_MTU_PAYLOAD {
            return Err(SettingsError::InvalidMtu(self.mtu_size).into());
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
            Role::Central,
            radio,
            environment,
            self.capability_listener,
            prompt,
        )?;

        let mtu_size = effective_mtu(self.mtu_size);
        if self.mtu_size == 0 {
            debug!("MTU unset; using {}", mtu_size);
        }

        let session = Arc::new(CentralSession {
            base,
            identity: self.identity,
            mtu_size,
            callback: self.callback,
            scan_handler: self.scan_handler,
            link_handler: self.link_handler,
            inner: Mutex::new(CentralInner {
                state: CentralState::Idle,
                link: None,
            }),
            pump: EventPump::new(),
        });

        if let Some(scope) = self.owner {
            let observer: Weak<CentralSession> = Arc::downgrade(&session);
            scope.observe(observer);
        }

        info!(
            "Central session created for '{}'",
            session.identity.service_name
        );
        Ok(session)
    }
}

// ============================================================================
// TESTS
// ============================================================================
