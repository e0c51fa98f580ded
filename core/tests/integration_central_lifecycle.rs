mod common;

use blelink_core::radio::{
    ConnectionState, LinkPriority, ScanResult, ServiceInfo, CCCD_UUID, ENABLE_NOTIFICATION_VALUE,
};
use blelink_core::{
    CentralRadio, CentralRadioEvent, CentralSession, CentralState, EnvironmentBus,
    EnvironmentSignal, GattStatus, LinkHandle, LinkSettings, OwnerScope, PeerHandle, Prompt,
    RadioCall, RadioPlatform, RecordingRadio, SessionIdentity, StartOutcome, WriteMode,
};
use common::{CentralLog, PromptLog};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use uuid::Uuid;

fn widget_identity() -> SessionIdentity {
    SessionIdentity::new(
        Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e),
        Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e),
        Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e24dcca9e),
        "Widget-42",
    )
}

fn radio_for(identity: &SessionIdentity) -> Arc<RecordingRadio> {
    Arc::new(RecordingRadio::new().with_remote_service(RecordingRadio::mirror_of(identity)))
}

fn scan(session: &CentralSession, address: &str, name: Option<&str>) {
    session.handle_event(CentralRadioEvent::ScanResult(ScanResult::new(
        PeerHandle::new(address, name),
        -55,
    )));
}

fn set_state(session: &CentralSession, link: LinkHandle, state: ConnectionState, status: i32) {
    session.handle_event(CentralRadioEvent::ConnectionStateChanged {
        link,
        status: GattStatus(status),
        state,
    });
}

fn bind(session: &CentralSession, link: LinkHandle) {
    set_state(session, link, ConnectionState::Connected, 0);
    session.handle_event(CentralRadioEvent::MtuChanged {
        link,
        mtu: 515,
        status: GattStatus::SUCCESS,
    });
    session.handle_event(CentralRadioEvent::ServicesDiscovered {
        link,
        status: GattStatus::SUCCESS,
    });
}

#[test]
fn test_widget_42_exact_match() {
    let identity = widget_identity();
    let radio = radio_for(&identity);
    let log = Arc::new(CentralLog::default());
    let session = CentralSession::builder(identity)
        .callback(log.clone())
        .build(radio.clone(), Arc::new(EnvironmentBus::new()))
        .unwrap();

    assert_eq!(session.start_discovery(), Ok(StartOutcome::Started));
    scan(&session, "00:00:00:00:00:01", Some("Widget-4"));
    scan(&session, "00:00:00:00:00:02", Some("widget-42"));
    scan(&session, "00:00:00:00:00:03", None);
    assert!(session.link().is_none());

    scan(&session, "00:00:00:00:00:04", Some("Widget-42"));
    assert_eq!(session.state(), CentralState::Connecting);
    assert_eq!(log.lines(), vec!["discovered 00:00:00:00:00:04".to_string()]);
    assert_eq!(
        radio.count(|c| matches!(c, RadioCall::Connect(p) if p.address == "00:00:00:00:00:04")),
        1
    );

    // Later scan results do not open a second link.
    scan(&session, "00:00:00:00:00:05", Some("Widget-42"));
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Connect(_))), 1);
}

#[test]
fn test_full_session_with_reconnect() {
    let identity = widget_identity();
    let radio = radio_for(&identity);
    let log = Arc::new(CentralLog::default());
    let settings = LinkSettings {
        identity: identity.clone(),
        ..LinkSettings::default()
    };
    let session = blelink_core::CentralSessionBuilder::from_settings(&settings)
        .callback(log.clone())
        .build(radio.clone(), Arc::new(EnvironmentBus::new()))
        .unwrap();

    session.start_discovery().unwrap();
    scan(&session, "11", Some("Widget-42"));
    let first = session.link().unwrap();
    bind(&session, first);
    assert_eq!(session.state(), CentralState::Ready);

    assert!(radio.calls().contains(&RadioCall::RequestMtu(first, 515)));
    assert!(radio
        .calls()
        .contains(&RadioCall::RequestLinkPriority(first, LinkPriority::Balanced)));
    assert!(radio.calls().contains(&RadioCall::WriteDescriptor {
        link: first,
        channel: identity.read_channel,
        descriptor: CCCD_UUID,
        value: ENABLE_NOTIFICATION_VALUE.to_vec(),
    }));

    assert!(session.send_data(b"hi", WriteMode::WithResponse));
    session.handle_event(CentralRadioEvent::ChannelWritten {
        link: first,
        channel: identity.write_channel,
        status: GattStatus::SUCCESS,
    });
    session.handle_event(CentralRadioEvent::ChannelChanged {
        link: first,
        channel: identity.read_channel,
        value: b"pong".to_vec(),
    });

    set_state(&session, first, ConnectionState::Disconnected, 8);
    assert_eq!(session.state(), CentralState::Scanning);
    assert!(!session.send_data(b"lost", WriteMode::WithResponse));

    scan(&session, "22", Some("Widget-42"));
    let second = session.link().unwrap();
    assert_ne!(first, second);
    bind(&session, second);

    assert_eq!(
        log.lines(),
        vec![
            "discovered 11".to_string(),
            format!("connected {}", first),
            "mtu-requested true".to_string(),
            "mtu 515".to_string(),
            format!("bound {}", first),
            "written 0".to_string(),
            "notify pong".to_string(),
            format!("connect-failed {} 8", first),
            "discovered 22".to_string(),
            format!("connected {}", second),
            "mtu-requested true".to_string(),
            "mtu 515".to_string(),
            format!("bound {}", second),
        ]
    );
    assert_eq!(radio.count(|c| *c == RadioCall::StartScan), 2);
}

#[test]
fn test_transitional_connection_events_are_reported() {
    let identity = widget_identity();
    let log = Arc::new(CentralLog::default());
    let session = CentralSession::builder(identity.clone())
        .callback(log.clone())
        .build(radio_for(&identity), Arc::new(EnvironmentBus::new()))
        .unwrap();

    session.start_discovery().unwrap();
    scan(&session, "11", Some("Widget-42"));
    let link = session.link().unwrap();
    set_state(&session, link, ConnectionState::Connecting, 0);
    set_state(&session, link, ConnectionState::Disconnecting, 0);

    assert_eq!(log.count("connecting"), 1);
    assert_eq!(log.count("disconnecting"), 1);
    assert_eq!(session.state(), CentralState::Connecting);
}

#[test]
fn test_location_off_gate() {
    let identity = widget_identity();
    let radio = radio_for(&identity);
    radio.set_location_on(false);
    let log = Arc::new(CentralLog::default());
    let prompts = Arc::new(PromptLog::default());
    let session = CentralSession::builder(identity)
        .callback(log.clone())
        .prompt(prompts.clone())
        .build(radio.clone(), Arc::new(EnvironmentBus::new()))
        .unwrap();

    assert_eq!(session.start_discovery(), Ok(StartOutcome::CapabilityOff));
    assert!(radio.calls().is_empty());
    assert!(log.lines().is_empty());
    assert_eq!(prompts.shown(), vec![Prompt::EnableRadioAndLocation]);

    radio.set_location_on(true);
    assert_eq!(session.start_discovery(), Ok(StartOutcome::Started));
}

#[test]
fn test_environment_prompts_until_destroyed() {
    let bus = Arc::new(EnvironmentBus::new());
    let prompts = Arc::new(PromptLog::default());
    let scope = Arc::new(OwnerScope::new());
    let session = CentralSession::builder(widget_identity())
        .callback(Arc::new(CentralLog::default()))
        .prompt(prompts.clone())
        .owner(&scope)
        .build(Arc::new(RecordingRadio::new()), bus.clone())
        .unwrap();

    bus.publish(EnvironmentSignal::LocationModeChanged(Some(false)));
    bus.publish(EnvironmentSignal::LocationModeChanged(None));
    assert_eq!(prompts.shown(), vec![Prompt::EnableLocation]);

    scope.destroy();
    assert!(session.is_destroyed());

    bus.publish(EnvironmentSignal::LocationModeChanged(Some(false)));
    assert_eq!(prompts.shown().len(), 1);
}

/// Facade that answers scans, MTU, discovery and reads synchronously from
/// inside the command, the way some platform stacks do.
struct EagerRadio {
    inner: RecordingRadio,
    session: Mutex<Weak<CentralSession>>,
}

impl EagerRadio {
    fn session(&self) -> Option<Arc<CentralSession>> {
        self.session.lock().upgrade()
    }
}

impl RadioPlatform for EagerRadio {
    fn supports_low_energy(&self) -> bool {
        self.inner.supports_low_energy()
    }
    fn is_radio_on(&self) -> bool {
        self.inner.is_radio_on()
    }
    fn is_location_on(&self) -> bool {
        self.inner.is_location_on()
    }
    fn connected_peers(&self) -> BTreeSet<PeerHandle> {
        self.inner.connected_peers()
    }
}

impl CentralRadio for EagerRadio {
    fn start_scan(&self) {
        self.inner.start_scan();
        if let Some(session) = self.session() {
            session.handle_event(CentralRadioEvent::ScanResult(ScanResult::new(
                PeerHandle::new("11", Some("Widget-42")),
                -40,
            )));
        }
    }
    fn stop_scan(&self) {
        self.inner.stop_scan()
    }
    fn connect(&self, peer: &PeerHandle) -> LinkHandle {
        self.inner.connect(peer)
    }
    fn disconnect(&self, link: LinkHandle) {
        self.inner.disconnect(link)
    }
    fn close(&self, link: LinkHandle) {
        self.inner.close(link)
    }
    fn request_mtu(&self, link: LinkHandle, mtu: u16) -> bool {
        self.inner.request_mtu(link, mtu);
        if let Some(session) = self.session() {
            session.handle_event(CentralRadioEvent::MtuChanged {
                link,
                mtu,
                status: GattStatus::SUCCESS,
            });
        }
        true
    }
    fn request_link_priority(&self, link: LinkHandle, priority: LinkPriority) -> bool {
        self.inner.request_link_priority(link, priority)
    }
    fn discover_services(&self, link: LinkHandle) -> bool {
        self.inner.discover_services(link);
        if let Some(session) = self.session() {
            session.handle_event(CentralRadioEvent::ServicesDiscovered {
                link,
                status: GattStatus::SUCCESS,
            });
        }
        true
    }
    fn service(&self, link: LinkHandle, service_id: Uuid) -> Option<ServiceInfo> {
        self.inner.service(link, service_id)
    }
    fn set_notification(&self, link: LinkHandle, channel: Uuid, enabled: bool) -> bool {
        self.inner.set_notification(link, channel, enabled)
    }
    fn write_descriptor(&self, link: LinkHandle, channel: Uuid, descriptor: Uuid, value: &[u8]) -> bool {
        self.inner.write_descriptor(link, channel, descriptor, value)
    }
    fn write_channel(&self, link: LinkHandle, channel: Uuid, value: &[u8], mode: WriteMode) -> bool {
        self.inner.write_channel(link, channel, value, mode)
    }
    fn read_channel(&self, link: LinkHandle, channel: Uuid) -> bool {
        self.inner.read_channel(link, channel);
        if let Some(session) = self.session() {
            session.handle_event(CentralRadioEvent::ChannelRead {
                link,
                channel,
                status: GattStatus::SUCCESS,
                value: b"42".to_vec(),
            });
        }
        true
    }
}

#[test]
fn test_synchronous_platform_events_are_sequenced() {
    let identity = widget_identity();
    let radio = Arc::new(EagerRadio {
        inner: RecordingRadio::new().with_remote_service(RecordingRadio::mirror_of(&identity)),
        session: Mutex::new(Weak::new()),
    });
    let log = Arc::new(CentralLog::default());
    let session = CentralSession::builder(identity)
        .callback(log.clone())
        .build(radio.clone(), Arc::new(EnvironmentBus::new()))
        .unwrap();
    *radio.session.lock() = Arc::downgrade(&session);

    session.start_discovery().unwrap();
    assert_eq!(session.state(), CentralState::Connecting);
    let link = session.link().unwrap();
    set_state(&session, link, ConnectionState::Connected, 0);

    assert_eq!(session.state(), CentralState::Ready);
    assert!(session.request_read());

    let calls = radio.inner.calls();
    let mtu_at = calls
        .iter()
        .position(|c| matches!(c, RadioCall::RequestMtu(..)))
        .unwrap();
    let priority_at = calls
        .iter()
        .position(|c| matches!(c, RadioCall::RequestLinkPriority(..)))
        .unwrap();
    let discover_at = calls
        .iter()
        .position(|c| matches!(c, RadioCall::DiscoverServices(_)))
        .unwrap();
    assert!(mtu_at < priority_at);
    assert!(priority_at < discover_at);
    assert_eq!(
        log.lines(),
        vec![
            "discovered 11".to_string(),
            format!("connected {}", link),
            "mtu-requested true".to_string(),
            "mtu 515".to_string(),
            format!("bound {}", link),
            "read 42".to_string(),
        ]
    );
}
