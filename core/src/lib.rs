// blelink core: Bluetooth LE link sessions
//
// Central and peripheral session state machines driven by a platform radio
// facade. The platform owns the radio; this crate owns the sequencing.

pub mod environment;
pub mod radio;
pub mod session;
pub mod settings;

use thiserror::Error;

pub use environment::{
    AdapterState, CapabilityListener, EnvironmentBus, EnvironmentMonitor, EnvironmentSignal,
    EnvironmentSource, LogPrompt, Prompt, PromptingListener, SubscriptionId, UserPrompt,
};
pub use radio::{
    CentralRadio, CentralRadioEvent, GattStatus, LinkHandle, PeerHandle, PeripheralRadio,
    PeripheralRadioEvent, RadioCall, RadioPlatform, RecordingRadio, WriteMode,
};
pub use session::{
    AcceptorHandler, AdvertiseHandler, CentralCallback, CentralSession, CentralSessionBuilder,
    CentralState, LinkHandler, OwnerScope, PeripheralCallback, PeripheralSession,
    PeripheralSessionBuilder, PeripheralState, Role, ScanHandler, ScopeObserver, StartOutcome,
};
pub use settings::{DisconnectPolicy, LinkSettings, SessionIdentity, SettingsError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors surfaced by session construction and start calls
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Bluetooth LE is not supported on this device")]
    UnsupportedHardware,

    #[error("No {0} callback configured and raw handlers incomplete")]
    MissingCallbacks(Role),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("The {0} session has been destroyed")]
    Destroyed(Role),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}
