//! Radio facade layer
//!
//! - **types**: handles, channel/service layouts, statuses, advertise parameters
//! - **facade**: the traits platform code implements and the events it delivers
//! - **recording**: an in-memory facade that records every command

pub mod facade;
pub mod recording;
pub mod types;

pub use facade::{
    CentralRadio, CentralRadioEvent, PeripheralRadio, PeripheralRadioEvent, RadioPlatform,
};
pub use recording::{RadioCall, RecordingRadio};
pub use types::{
    AcceptorHandle, AdvertiseData, AdvertiseMode, AdvertiseSettings, ChannelDefinition,
    ChannelInfo, ChannelPermissions, ChannelProperties, ConnectionState, GattStatus, LinkHandle,
    LinkPriority, PeerHandle, ReadRequest, ScanResult, ServiceDefinition, ServiceInfo, TxPower,
    WriteMode, WriteRequest, ATT_MTU_OVERHEAD, CCCD_UUID, DEFAULT_MTU, ENABLE_NOTIFICATION_VALUE,
    MAX_MTU_PAYLOAD,
};
