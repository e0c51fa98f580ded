//! Session base shared by both roles
//!
//! Owns the radio facade handle, the environment-monitor subscription and the
//! user-prompt hook. Construction fails fast on hardware without Bluetooth LE;
//! teardown unsubscribes the monitor exactly once and hands over to the
//! role-specific hook.

use crate::environment::{
    CapabilityListener, EnvironmentMonitor, EnvironmentSource, Prompt, PromptingListener,
    SubscriptionId, UserPrompt,
};
use crate::radio::{PeerHandle, RadioPlatform};
use crate::LinkError;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Which end of the link a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Central,
    Peripheral,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Central => write!(f, "central"),
            Self::Peripheral => write!(f, "peripheral"),
        }
    }
}

/// Result of a start request that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Scanning or advertising was requested from the platform
    Started,
    /// The session was already past `Idle`; nothing was issued
    AlreadyActive,
    /// Radio or location is off; the user was prompted and nothing was issued
    CapabilityOff,
}

/// Receives the owning scope's terminal "destroyed" signal
pub trait ScopeObserver: Send + Sync {
    fn on_scope_destroyed(&self);
}

/// Single-shot lifecycle of whatever owns the sessions (screen, service, app)
pub struct OwnerScope {
    observers: Mutex<Vec<Weak<dyn ScopeObserver>>>,
    destroyed: AtomicBool,
}

impl OwnerScope {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Register an observer; it is held weakly
    pub fn observe(&self, observer: Weak<dyn ScopeObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Fire the destroyed signal; later calls do nothing
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("Owner scope already destroyed");
            return;
        }

        let observers = std::mem::take(&mut *self.observers.lock());
        for observer in observers.iter().filter_map(Weak::upgrade) {
            observer.on_scope_destroyed();
        }
    }
}

impl Default for OwnerScope {
    fn default() -> Self {
        Self::new()
    }
}

/// State and services common to central and peripheral sessions
pub struct SessionBase<R: ?Sized + RadioPlatform> {
    role: Role,
    radio: Arc<R>,
    prompt: Arc<dyn UserPrompt>,
    environment: Arc<dyn EnvironmentSource>,
    subscription: Mutex<Option<SubscriptionId>>,
    destroyed: AtomicBool,
}

impl<R: ?Sized + RadioPlatform> SessionBase<R> {
    /// Check hardware support and subscribe the environment monitor
    pub(crate) fn new(
        role: Role,
        radio: Arc<R>,
        environment: Arc<dyn EnvironmentSource>,
        listener: Option<Arc<dyn CapabilityListener>>,
        prompt: Arc<dyn UserPrompt>,
    ) -> Result<Self, LinkError> {
        if !radio.supports_low_energy() {
            error!("Device has no Bluetooth LE support; {} session not created", role);
            return Err(LinkError::UnsupportedHardware);
        }

        let listener = listener.unwrap_or_else(|| {
            Arc::new(PromptingListener::new(prompt.clone())) as Arc<dyn CapabilityListener>
        });
        let subscription = environment.subscribe(Arc::new(EnvironmentMonitor::new(listener)));

        Ok(Self {
            role,
            radio,
            prompt,
            environment,
            subscription: Mutex::new(Some(subscription)),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn radio(&self) -> &Arc<R> {
        &self.radio
    }

    pub fn is_radio_on(&self) -> bool {
        self.radio.is_radio_on()
    }

    pub fn is_location_on(&self) -> bool {
        self.radio.is_location_on()
    }

    pub fn list_connected_peers(&self) -> BTreeSet<PeerHandle> {
        self.radio.connected_peers()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// True when both capabilities are on; otherwise prompts the user
    pub(crate) fn capability_gate(&self) -> bool {
        if self.is_radio_on() && self.is_location_on() {
            return true;
        }

        warn!("{} start declined: radio or location is off", self.role);
        self.prompt.show(Prompt::EnableRadioAndLocation);
        false
    }

    /// Mark destroyed and unsubscribe; false if teardown already ran
    pub(crate) fn begin_teardown(&self) -> bool {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            warn!("{} session destroyed twice; ignoring", self.role);
            return false;
        }

        if let Some(id) = self.subscription.lock().take() {
            self.environment.unsubscribe(id);
        }
        true
    }
}
