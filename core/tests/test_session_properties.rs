mod common;

use blelink_core::radio::{ConnectionState, ScanResult};
use blelink_core::settings::{effective_mtu, requested_mtu};
use blelink_core::{
    CentralRadioEvent, CentralSession, CentralState, EnvironmentBus, GattStatus, LinkHandle,
    PeerHandle, RadioCall, RecordingRadio, SessionIdentity,
};
use common::CentralLog;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Start,
    Stop,
    Scan { matching: bool },
    Connected,
    Disconnected,
    StaleDisconnected,
    Mtu,
    Discovered,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Start),
        1 => Just(Op::Stop),
        3 => any::<bool>().prop_map(|matching| Op::Scan { matching }),
        3 => Just(Op::Connected),
        3 => Just(Op::Disconnected),
        1 => Just(Op::StaleDisconnected),
        3 => Just(Op::Mtu),
        3 => Just(Op::Discovered),
    ]
}

const STALE: LinkHandle = LinkHandle(u64::MAX);

fn start_scans(radio: &RecordingRadio) -> usize {
    radio.count(|c| *c == RadioCall::StartScan)
}

fn link_is_live(state: CentralState) -> bool {
    matches!(
        state,
        CentralState::Connecting
            | CentralState::Negotiating
            | CentralState::ServiceBinding
            | CentralState::Ready
    )
}

proptest! {
    #[test]
    fn prop_central_link_invariants(ops in prop::collection::vec(op(), 1..60)) {
        let identity = SessionIdentity::default();
        let radio = Arc::new(
            RecordingRadio::new().with_remote_service(RecordingRadio::mirror_of(&identity)),
        );
        let session = CentralSession::builder(identity.clone())
            .callback(Arc::new(CentralLog::default()))
            .build(radio.clone(), Arc::new(EnvironmentBus::new()))
            .unwrap();
        session.start_discovery().unwrap();

        let mut mtu_seen: HashSet<LinkHandle> = HashSet::new();

        for op in ops {
            let link = session.link().unwrap_or(STALE);
            let scans_before = start_scans(&radio);

            match op {
                Op::Start => {
                    let _ = session.start_discovery();
                }
                Op::Stop => session.stop_connection(),
                Op::Scan { matching } => {
                    let name = if matching { identity.service_name.as_str() } else { "other" };
                    session.handle_event(CentralRadioEvent::ScanResult(ScanResult::new(
                        PeerHandle::new("AA", Some(name)),
                        -40,
                    )));
                }
                Op::Connected => session.handle_event(CentralRadioEvent::ConnectionStateChanged {
                    link,
                    status: GattStatus::SUCCESS,
                    state: ConnectionState::Connected,
                }),
                Op::Disconnected => {
                    session.handle_event(CentralRadioEvent::ConnectionStateChanged {
                        link,
                        status: GattStatus::FAILURE,
                        state: ConnectionState::Disconnected,
                    });
                    if link != STALE {
                        prop_assert!(session.link().is_none());
                        prop_assert_eq!(session.state(), CentralState::Scanning);
                        prop_assert_eq!(start_scans(&radio), scans_before + 1);
                    }
                }
                Op::StaleDisconnected => {
                    session.handle_event(CentralRadioEvent::ConnectionStateChanged {
                        link: STALE,
                        status: GattStatus::FAILURE,
                        state: ConnectionState::Disconnected,
                    });
                    prop_assert_eq!(session.link(), if link == STALE { None } else { Some(link) });
                    prop_assert_eq!(start_scans(&radio), scans_before);
                }
                Op::Mtu => {
                    mtu_seen.insert(link);
                    session.handle_event(CentralRadioEvent::MtuChanged {
                        link,
                        mtu: 515,
                        status: GattStatus::SUCCESS,
                    });
                }
                Op::Discovered => session.handle_event(CentralRadioEvent::ServicesDiscovered {
                    link,
                    status: GattStatus::SUCCESS,
                }),
            }

            // At most one live link, and only in a linked state.
            let state = session.state();
            prop_assert_eq!(session.link().is_some(), link_is_live(state));
            let connects = radio.count(|c| matches!(c, RadioCall::Connect(_)));
            let closes = radio.count(|c| matches!(c, RadioCall::Close(_)));
            prop_assert_eq!(connects - closes, usize::from(session.link().is_some()));

            // Service discovery only ever follows an MTU result for the same link.
            for call in radio.calls() {
                if let RadioCall::DiscoverServices(discovered) = call {
                    prop_assert!(mtu_seen.contains(&discovered));
                }
            }
        }
    }

    #[test]
    fn prop_requested_mtu_adds_overhead(mtu in 1u16..=514) {
        prop_assert_eq!(effective_mtu(mtu), mtu);
        prop_assert_eq!(requested_mtu(mtu), mtu + 3);
    }

    #[test]
    fn prop_name_match_is_exact(name in "[ -~]{1,24}", suffix in "[ -~]{1,4}") {
        let peer = PeerHandle::new("AA", Some(&name));
        prop_assert!(peer.name_matches(&name));

        let longer = format!("{}{}", name, suffix);
        prop_assert!(!peer.name_matches(&longer));
        prop_assert!(!PeerHandle::new("AA", None).name_matches(&name));
    }
}

#[test]
fn test_default_mtu_request_is_515() {
    assert_eq!(requested_mtu(0), 515);
}
