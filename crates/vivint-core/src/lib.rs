//! Typed site/panel/device graph for the Vivint Sky cloud.
//!
//! Builds on `vivint-api`: an [`Account`] materializes the systems a
//! user can reach, keeps them live from the realtime push channel, and
//! surfaces per-entity events. Every node is an observable
//! [`Entity`](entity::Entity) holding a raw attribute map (authoritative,
//! forward-compatible) and a typed projection of it.

pub mod account;
pub mod devices;
pub mod entity;
pub mod enums;
pub mod system;
pub mod user;

// ── Primary re-exports ──────────────────────────────────────────────
pub use account::{Account, AccountConfig, AccountState, MessageTap};
pub use devices::{
    AlarmPanel, Camera, Device, DoorLock, GarageDoor, Switch, Thermostat, WirelessSensor,
    DEVICE_DELETED, DEVICE_DISCOVERED,
};
pub use entity::{Entity, Subscription, UPDATE};
pub use enums::{
    ArmedState, DeviceType, EmergencyType, EquipmentCode, EquipmentType, FanMode,
    GarageDoorState, HoldMode, OperatingMode, OperatingState, SensorType, ZoneBypass,
};
pub use system::{SettleRequest, System};
pub use user::User;
