//! Link sessions
//!
//! - **base**: capability gate, environment subscription, owner-scope teardown
//! - **central**: scan → connect → negotiate → bind → exchange, re-scan on drop
//! - **peripheral**: advertise → publish → accept peers → fan out
//! - **callbacks**: application and raw-handler contracts

pub mod base;
pub mod callbacks;
pub mod central;
pub mod peripheral;
mod pump;

pub use base::{OwnerScope, Role, ScopeObserver, SessionBase, StartOutcome};
pub use callbacks::{
    AcceptorHandler, AdvertiseHandler, CentralCallback, LinkHandler, PeripheralCallback,
    ScanHandler,
};
pub use central::{CentralSession, CentralSessionBuilder, CentralState};
pub use peripheral::{PeripheralSession, PeripheralSessionBuilder, PeripheralState};
