//! Environment monitoring
//!
//! Relays radio-adapter and location-service state changes from the host's
//! broadcast channel to a `CapabilityListener`. The monitor itself keeps no
//! state; sessions subscribe one at construction and unsubscribe it at teardown.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Radio adapter power state as broadcast by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Off,
    TurningOn,
    On,
    TurningOff,
}

/// A state-change broadcast; the payload may be missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    RadioStateChanged(Option<AdapterState>),
    LocationModeChanged(Option<bool>),
}

/// User-visible request to restore a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    EnableRadio,
    EnableLocation,
    EnableRadioAndLocation,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnableRadio => write!(f, "Please turn on Bluetooth"),
            Self::EnableLocation => write!(f, "Please turn on location services"),
            Self::EnableRadioAndLocation => {
                write!(f, "Please turn on Bluetooth and location services")
            }
        }
    }
}

/// Surface for user-visible prompts (toast, notification, dialog)
pub trait UserPrompt: Send + Sync {
    fn show(&self, prompt: Prompt);
}

/// Prompt sink that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPrompt;

impl UserPrompt for LogPrompt {
    fn show(&self, prompt: Prompt) {
        warn!("{}", prompt);
    }
}

/// Receives capability transitions
#[cfg_attr(test, mockall::automock)]
pub trait CapabilityListener: Send + Sync {
    fn on_radio_on(&self);
    fn on_radio_off(&self);
    fn on_location_on(&self);
    fn on_location_off(&self);
}

/// Default listener: prompt when a capability turns off, ignore turning on
pub struct PromptingListener {
    prompt: Arc<dyn UserPrompt>,
}

impl PromptingListener {
    pub fn new(prompt: Arc<dyn UserPrompt>) -> Self {
        Self { prompt }
    }
}

impl CapabilityListener for PromptingListener {
    fn on_radio_on(&self) {}

    fn on_radio_off(&self) {
        self.prompt.show(Prompt::EnableRadio);
    }

    fn on_location_on(&self) {}

    fn on_location_off(&self) {
        self.prompt.show(Prompt::EnableLocation);
    }
}

/// Stateless relay from environment signals to a listener
pub struct EnvironmentMonitor {
    listener: Arc<dyn CapabilityListener>,
}

impl EnvironmentMonitor {
    pub fn new(listener: Arc<dyn CapabilityListener>) -> Self {
        Self { listener }
    }

    /// Forward a broadcast; signals without an actionable payload are dropped
    pub fn on_signal(&self, signal: EnvironmentSignal) {
        match signal {
            EnvironmentSignal::RadioStateChanged(Some(AdapterState::On)) => {
                self.listener.on_radio_on()
            }
            EnvironmentSignal::RadioStateChanged(Some(AdapterState::Off)) => {
                self.listener.on_radio_off()
            }
            EnvironmentSignal::LocationModeChanged(Some(true)) => self.listener.on_location_on(),
            EnvironmentSignal::LocationModeChanged(Some(false)) => {
                self.listener.on_location_off()
            }
            other => debug!("Ignoring environment signal without payload: {:?}", other),
        }
    }
}

/// Registration token returned by `EnvironmentSource::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Host broadcast channel for environment state
pub trait EnvironmentSource: Send + Sync {
    fn subscribe(&self, monitor: Arc<EnvironmentMonitor>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-process environment broadcast channel
pub struct EnvironmentBus {
    next_id: AtomicU64,
    monitors: RwLock<BTreeMap<SubscriptionId, Arc<EnvironmentMonitor>>>,
}

impl EnvironmentBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            monitors: RwLock::new(BTreeMap::new()),
        }
    }

    /// Deliver a signal to every subscribed monitor
    pub fn publish(&self, signal: EnvironmentSignal) {
        let monitors: Vec<_> = self.monitors.read().values().cloned().collect();
        for monitor in monitors {
            monitor.on_signal(signal);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.monitors.read().len()
    }
}

impl Default for EnvironmentBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentSource for EnvironmentBus {
    fn subscribe(&self, monitor: Arc<EnvironmentMonitor>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.monitors.write().insert(id, monitor);
        debug!("Environment monitor subscribed: {:?}", id);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.monitors.write().remove(&id).is_none() {
            debug!("Unsubscribe for unknown environment subscription {:?}", id);
        }
    }
}
