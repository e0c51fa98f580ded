// Scripted session runs over the recording radio
//
// Each run feeds the platform events a real stack would deliver and prints
// both the callbacks the session raises and the radio commands it issues.

use anyhow::{Context, Result};
use blelink_core::radio::{
    AdvertiseSettings, ConnectionState, ReadRequest, ScanResult, WriteRequest,
};
use blelink_core::settings::requested_mtu;
use blelink_core::{
    CentralCallback, CentralRadioEvent, CentralSessionBuilder, DisconnectPolicy, EnvironmentBus,
    GattStatus, LinkHandle, LinkSettings, OwnerScope, PeerHandle, PeripheralCallback,
    PeripheralRadioEvent, PeripheralSessionBuilder, Prompt, RecordingRadio, StartOutcome,
    UserPrompt, WriteMode,
};
use colored::*;
use std::sync::Arc;
use uuid::Uuid;

// ===== CONSOLE SINKS =====

struct ConsolePrompt;

impl UserPrompt for ConsolePrompt {
    fn show(&self, prompt: Prompt) {
        println!("  {} {}", "!".yellow().bold(), prompt.to_string().yellow());
    }
}

struct ConsoleCentral;

impl ConsoleCentral {
    fn event(&self, text: String) {
        println!("  {} {}", "◆".bright_cyan(), text);
    }
}

impl CentralCallback for ConsoleCentral {
    fn on_peer_discovered(&self, peer: &PeerHandle) {
        self.event(format!("peer discovered: {}", peer.to_string().bright_green()));
    }
    fn on_connecting(&self, link: LinkHandle, status: GattStatus) {
        self.event(format!("{} connecting ({})", link, status));
    }
    fn on_connected(&self, link: LinkHandle, status: GattStatus) {
        self.event(format!("{} connected ({})", link, status));
    }
    fn on_disconnecting(&self, link: LinkHandle, status: GattStatus) {
        self.event(format!("{} disconnecting ({})", link, status));
    }
    fn on_connect_failed(&self, link: LinkHandle, status: GattStatus) {
        self.event(format!("{} {} ({})", link, "dropped".red(), status));
    }
    fn on_service_bound(&self, link: LinkHandle, status: GattStatus) {
        self.event(format!("service bound on {} ({})", link, status));
    }
    fn on_mtu_requested(&self, accepted: bool) {
        self.event(format!("MTU request accepted: {}", accepted));
    }
    fn on_mtu_changed(&self, link: LinkHandle, mtu: u16, status: GattStatus) {
        self.event(format!("MTU on {} is {} ({})", link, mtu, status));
    }
    fn on_notify(&self, _link: LinkHandle, channel: Uuid, value: &[u8]) {
        self.event(format!(
            "notification on {}: {}",
            channel,
            String::from_utf8_lossy(value).bright_yellow()
        ));
    }
    fn on_read_complete(&self, _link: LinkHandle, channel: Uuid, status: GattStatus, value: &[u8]) {
        self.event(format!(
            "read {} ({}): {}",
            channel,
            status,
            String::from_utf8_lossy(value).bright_yellow()
        ));
    }
    fn on_write_complete(&self, _link: LinkHandle, channel: Uuid, status: GattStatus) {
        self.event(format!("write to {} complete ({})", channel, status));
    }
}

struct ConsolePeripheral;

impl ConsolePeripheral {
    fn event(&self, text: String) {
        println!("  {} {}", "◆".bright_magenta(), text);
    }
}

impl PeripheralCallback for ConsolePeripheral {
    fn on_advertise_started(&self, settings: &AdvertiseSettings) {
        self.event(format!(
            "advertising ({:?}, {:?})",
            settings.mode, settings.tx_power
        ));
    }
    fn on_advertise_failed(&self, error_code: i32) {
        self.event(format!("{} code {}", "advertise failed".red(), error_code));
    }
    fn on_peer_connecting(&self, peer: &PeerHandle, status: GattStatus) {
        self.event(format!("{} connecting ({})", peer, status));
    }
    fn on_peer_connected(&self, peer: &PeerHandle, status: GattStatus) {
        self.event(format!("{} connected ({})", peer.to_string().bright_green(), status));
    }
    fn on_peer_disconnecting(&self, peer: &PeerHandle, status: GattStatus) {
        self.event(format!("{} disconnecting ({})", peer, status));
    }
    fn on_peer_disconnected(&self, peer: &PeerHandle, status: GattStatus) {
        self.event(format!("{} {} ({})", peer, "dropped".red(), status));
    }
    fn on_mtu_changed(&self, peer: &PeerHandle, mtu: u16) {
        self.event(format!("MTU for {} is {}", peer, mtu));
    }
    fn on_write_request(&self, request: &WriteRequest) {
        self.event(format!(
            "write request #{} from {}: {}",
            request.request_id,
            request.peer,
            String::from_utf8_lossy(&request.value).bright_yellow()
        ));
    }
    fn on_read_request(&self, request: &ReadRequest) {
        self.event(format!(
            "read request #{} from {} at offset {}",
            request.request_id, request.peer, request.offset
        ));
    }
}

fn step(title: &str) {
    println!();
    println!("{}", title.bold());
}

fn outcome_label(accepted: bool) -> ColoredString {
    if accepted {
        "yes".bright_green()
    } else {
        "no".red()
    }
}

/// Print and clear the radio commands issued since the last call
fn flush_calls(radio: &RecordingRadio) {
    for call in radio.take_calls() {
        println!("    {} {}", "→".dimmed(), format!("{:?}", call).dimmed());
    }
}

// ===== CENTRAL =====

pub fn run_central(
    settings: &LinkSettings,
    peer_name: Option<String>,
    location_off: bool,
) -> Result<()> {
    let identity = settings.identity.clone();
    let radio = Arc::new(
        RecordingRadio::new().with_remote_service(RecordingRadio::mirror_of(&identity)),
    );
    if location_off {
        radio.set_location_on(false);
    }
    let scope = Arc::new(OwnerScope::new());

    let session = CentralSessionBuilder::from_settings(settings)
        .callback(Arc::new(ConsoleCentral))
        .prompt(Arc::new(ConsolePrompt))
        .owner(&scope)
        .build(radio.clone(), Arc::new(EnvironmentBus::new()))
        .context("Failed to create central session")?;

    println!(
        "{} central looking for '{}' (MTU {})",
        "Simulating".bold(),
        identity.service_name.bright_cyan(),
        session.effective_mtu()
    );

    step("Start discovery");
    let outcome = session
        .start_discovery()
        .context("Failed to start discovery")?;
    flush_calls(&radio);
    if outcome != StartOutcome::Started {
        println!("  {} {:?}", "Not started:".yellow(), outcome);
        scope.destroy();
        return Ok(());
    }

    step("Scan results");
    let target = peer_name.unwrap_or_else(|| identity.service_name.clone());
    let advertisers = [
        ("5A:11:00:00:00:01", "Kitchen-Speaker"),
        ("5A:11:00:00:00:02", target.as_str()),
    ];
    for (address, name) in advertisers {
        session.handle_event(CentralRadioEvent::ScanResult(ScanResult::new(
            PeerHandle::new(address, Some(name)),
            -58,
        )));
    }
    flush_calls(&radio);

    let Some(link) = session.link() else {
        println!("  {} no advertised name matched", "✗".red());
        scope.destroy();
        flush_calls(&radio);
        return Ok(());
    };

    step("Connect and negotiate");
    session.handle_event(CentralRadioEvent::ConnectionStateChanged {
        link,
        status: GattStatus::SUCCESS,
        state: ConnectionState::Connected,
    });
    session.handle_event(CentralRadioEvent::MtuChanged {
        link,
        mtu: requested_mtu(settings.mtu_size),
        status: GattStatus::SUCCESS,
    });
    session.handle_event(CentralRadioEvent::ServicesDiscovered {
        link,
        status: GattStatus::SUCCESS,
    });
    flush_calls(&radio);
    println!("  state: {}", session.state().to_string().bright_green());

    step("Exchange data");
    let queued = session.send_data(b"hello", WriteMode::WithResponse);
    println!("  write queued: {}", outcome_label(queued));
    session.handle_event(CentralRadioEvent::ChannelWritten {
        link,
        channel: identity.write_channel,
        status: GattStatus::SUCCESS,
    });
    session.handle_event(CentralRadioEvent::ChannelChanged {
        link,
        channel: identity.read_channel,
        value: b"pong".to_vec(),
    });
    let requested = session.request_read();
    println!("  read requested: {}", outcome_label(requested));
    session.handle_event(CentralRadioEvent::ChannelRead {
        link,
        channel: identity.read_channel,
        status: GattStatus::SUCCESS,
        value: b"42".to_vec(),
    });
    flush_calls(&radio);

    step("Link loss");
    session.handle_event(CentralRadioEvent::ConnectionStateChanged {
        link,
        status: GattStatus(8),
        state: ConnectionState::Disconnected,
    });
    flush_calls(&radio);
    println!("  state: {}", session.state().to_string().bright_green());

    step("Owner destroyed");
    scope.destroy();
    flush_calls(&radio);

    Ok(())
}

// ===== PERIPHERAL =====

pub fn run_peripheral(settings: &LinkSettings, peers: usize) -> Result<()> {
    let identity = settings.identity.clone();
    let radio = Arc::new(RecordingRadio::new());
    let scope = Arc::new(OwnerScope::new());

    let session = PeripheralSessionBuilder::from_settings(settings)
        .callback(Arc::new(ConsolePeripheral))
        .prompt(Arc::new(ConsolePrompt))
        .owner(&scope)
        .build(radio.clone(), Arc::new(EnvironmentBus::new()))
        .context("Failed to create peripheral session")?;

    println!(
        "{} peripheral advertising '{}' ({} on drop)",
        "Simulating".bold(),
        identity.service_name.bright_cyan(),
        settings.disconnect_policy
    );

    step("Start advertising");
    let outcome = session
        .start_advertising()
        .context("Failed to start advertising")?;
    flush_calls(&radio);
    if outcome != StartOutcome::Started {
        println!("  {} {:?}", "Not started:".yellow(), outcome);
        scope.destroy();
        return Ok(());
    }
    session.handle_event(PeripheralRadioEvent::AdvertiseStarted(
        AdvertiseSettings::default(),
    ));
    flush_calls(&radio);

    step("Peers connect");
    let handles: Vec<PeerHandle> = (1..=peers)
        .map(|n| PeerHandle::new(format!("C0:FF:EE:00:00:{:02X}", n), Some("phone")))
        .collect();
    for peer in &handles {
        session.handle_event(PeripheralRadioEvent::ConnectionStateChanged {
            peer: peer.clone(),
            status: GattStatus::SUCCESS,
            state: ConnectionState::Connected,
        });
    }
    flush_calls(&radio);

    step("Fan out");
    let sent = session.send_data_to_all(b"broadcast");
    flush_calls(&radio);
    println!("  notifications issued: {}", sent.to_string().bright_green());

    if let Some(first) = handles.first() {
        step("Requests");
        session.handle_event(PeripheralRadioEvent::WriteRequest(WriteRequest {
            peer: first.clone(),
            request_id: 1,
            channel: identity.write_channel,
            prepared_write: false,
            response_needed: true,
            offset: 0,
            value: b"set-mode 2".to_vec(),
        }));
        let answered = session.respond(first, 1, GattStatus::SUCCESS, 0, &[]);
        println!("  write response sent: {}", outcome_label(answered));
        session.handle_event(PeripheralRadioEvent::ReadRequest(ReadRequest {
            peer: first.clone(),
            request_id: 2,
            offset: 0,
            channel: identity.read_channel,
        }));
        let answered = session.respond(first, 2, GattStatus::SUCCESS, 0, b"mode 2");
        println!("  read response sent: {}", outcome_label(answered));
        flush_calls(&radio);

        step("One peer drops");
        session.handle_event(PeripheralRadioEvent::ConnectionStateChanged {
            peer: first.clone(),
            status: GattStatus(19),
            state: ConnectionState::Disconnected,
        });
        flush_calls(&radio);
        if settings.disconnect_policy == DisconnectPolicy::RestartSession {
            session.handle_event(PeripheralRadioEvent::AdvertiseStarted(
                AdvertiseSettings::default(),
            ));
            flush_calls(&radio);
        }
        println!(
            "  state: {}, tracked peers: {}",
            session.state().to_string().bright_green(),
            session.connected_peers().len()
        );
    }

    step("Owner destroyed");
    scope.destroy();
    flush_calls(&radio);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_label() {
        assert_eq!(&*outcome_label(true), "yes");
        assert_eq!(&*outcome_label(false), "no");
    }

    #[test]
    fn test_scripted_runs_complete() {
        let settings = LinkSettings::default();
        run_central(&settings, None, false).unwrap();
        run_peripheral(&settings, 2).unwrap();

        let mut restart = settings.clone();
        restart.disconnect_policy = DisconnectPolicy::RestartSession;
        run_peripheral(&restart, 2).unwrap();
    }
}
