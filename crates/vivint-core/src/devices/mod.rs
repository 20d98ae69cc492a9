// ── Device variants ──
//
// The wire's `t` tag selects the variant; anything unrecognized becomes
// `Unknown` (lookup never fails). Every variant embeds an observable
// [`Entity`] so raw/typed/event behavior is uniform, and the enum
// surfaces the accessors shared by all devices.
//
// Back references are copied ids, not parent pointers: a device knows
// its `panel_id` (and its panel knows its devices), so the ownership
// graph stays a tree.

pub mod alarm_panel;
pub mod camera;
pub mod door_lock;
pub mod garage_door;
pub mod switch;
pub mod thermostat;
pub mod wireless_sensor;

use serde_json::{Map, Value};

use crate::entity::{Entity, Subscription};
use crate::enums::DeviceType;
use vivint_api::models::DeviceData;

pub use alarm_panel::{AlarmPanel, DEVICE_DELETED, DEVICE_DISCOVERED};
pub use camera::{Camera, DOORBELL_DING, MOTION_DETECTED, THUMBNAIL_READY, VIDEO_READY};
pub use door_lock::DoorLock;
pub use garage_door::GarageDoor;
pub use switch::Switch;
pub use thermostat::Thermostat;
pub use wireless_sensor::WirelessSensor;

/// A device with no variant-specific behavior (panels inside the device
/// list, services, and anything unrecognized).
pub struct GenericDevice {
    pub(crate) entity: Entity<DeviceData>,
}

impl GenericDevice {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            entity: Entity::new(data),
        }
    }
}

/// A device attached to an alarm panel.
pub enum Device {
    BinarySwitch(Switch),
    MultilevelSwitch(Switch),
    Camera(Camera),
    DoorLock(DoorLock),
    GarageDoor(GarageDoor),
    Thermostat(Thermostat),
    WirelessSensor(WirelessSensor),
    Panel(GenericDevice),
    Unknown(GenericDevice),
}

/// Run `$body` with `$entity` bound to the variant's entity.
macro_rules! with_entity {
    ($self:expr, $entity:ident => $body:expr) => {
        match $self {
            Device::BinarySwitch(d) | Device::MultilevelSwitch(d) => {
                let $entity = &d.entity;
                $body
            }
            Device::Camera(d) => {
                let $entity = &d.entity;
                $body
            }
            Device::DoorLock(d) => {
                let $entity = &d.entity;
                $body
            }
            Device::GarageDoor(d) => {
                let $entity = &d.entity;
                $body
            }
            Device::Thermostat(d) => {
                let $entity = &d.entity;
                $body
            }
            Device::WirelessSensor(d) => {
                let $entity = &d.entity;
                $body
            }
            Device::Panel(d) | Device::Unknown(d) => {
                let $entity = &d.entity;
                $body
            }
        }
    };
}

macro_rules! with_entity_mut {
    ($self:expr, $entity:ident => $body:expr) => {
        match $self {
            Device::BinarySwitch(d) | Device::MultilevelSwitch(d) => {
                let $entity = &mut d.entity;
                $body
            }
            Device::Camera(d) => {
                let $entity = &mut d.entity;
                $body
            }
            Device::DoorLock(d) => {
                let $entity = &mut d.entity;
                $body
            }
            Device::GarageDoor(d) => {
                let $entity = &mut d.entity;
                $body
            }
            Device::Thermostat(d) => {
                let $entity = &mut d.entity;
                $body
            }
            Device::WirelessSensor(d) => {
                let $entity = &mut d.entity;
                $body
            }
            Device::Panel(d) | Device::Unknown(d) => {
                let $entity = &mut d.entity;
                $body
            }
        }
    };
}

impl Device {
    /// Build the right variant for a raw device payload. The `t` tag
    /// drives selection; unmatched tags produce [`Device::Unknown`].
    pub fn new(data: Map<String, Value>) -> Self {
        let tag = data.get("t").and_then(Value::as_str).unwrap_or_default();
        match DeviceType::from_tag(tag) {
            DeviceType::BinarySwitch => Self::BinarySwitch(Switch::new(data)),
            DeviceType::MultiLevelSwitch => Self::MultilevelSwitch(Switch::new(data)),
            DeviceType::Camera => Self::Camera(Camera::new(data)),
            DeviceType::DoorLock => Self::DoorLock(DoorLock::new(data)),
            DeviceType::GarageDoor => Self::GarageDoor(GarageDoor::new(data)),
            DeviceType::Thermostat => Self::Thermostat(Thermostat::new(data)),
            DeviceType::WirelessSensor => Self::WirelessSensor(WirelessSensor::new(data)),
            DeviceType::Panel => Self::Panel(GenericDevice::new(data)),
            _ => Self::Unknown(GenericDevice::new(data)),
        }
    }

    // ── Raw access ───────────────────────────────────────────────────

    pub fn raw(&self) -> &Map<String, Value> {
        with_entity!(self, entity => entity.raw())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        with_entity!(self, entity => entity.get(key))
    }

    pub fn on(
        &self,
        event: &str,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        with_entity!(self, entity => entity.on(event, listener))
    }

    pub fn emit(&self, event: &str, payload: Value) {
        with_entity!(self, entity => entity.emit(event, payload))
    }

    pub fn update_data(&mut self, delta: Map<String, Value>, override_raw: bool) {
        with_entity_mut!(self, entity => entity.update_data(delta, override_raw))
    }

    /// Dispatch a push delta to the variant's handler.
    pub fn handle_message(&mut self, message: Map<String, Value>) {
        match self {
            Self::Camera(camera) => camera.handle_message(message),
            _ => with_entity_mut!(self, entity => entity.handle_message(message)),
        }
    }

    // ── Common accessors ─────────────────────────────────────────────

    pub fn id(&self) -> i64 {
        raw_i64(self.raw(), "_id").unwrap_or_default()
    }

    pub fn panel_id(&self) -> i64 {
        raw_i64(self.raw(), "panid").unwrap_or_default()
    }

    pub fn device_type(&self) -> DeviceType {
        DeviceType::from_tag(self.type_tag())
    }

    /// The raw `t` tag, preserved even for unknown types.
    pub fn type_tag(&self) -> &str {
        self.get("t").and_then(Value::as_str).unwrap_or_default()
    }

    /// User-assigned name, or a synthesized `"<Type> <id>"`.
    pub fn name(&self) -> String {
        match self.get("n").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => format!("{} {}", self.device_type().label(), self.id()),
        }
    }

    pub fn is_online(&self) -> bool {
        truthy(self.get("ol").unwrap_or(&Value::Null))
    }

    /// `true` when the payload carries any battery detail at all.
    pub fn has_battery(&self) -> bool {
        non_empty(self.get("bl")) || non_empty(self.get("lb"))
    }

    pub fn low_battery(&self) -> Option<bool> {
        if !self.has_battery() {
            return None;
        }
        Some(truthy(self.get("lb").unwrap_or(&Value::Null)))
    }

    /// Battery level: the explicit level wins; otherwise the low-battery
    /// flag maps to 0 or 100; no battery detail at all yields `None`.
    pub fn battery_level(&self) -> Option<i64> {
        if !self.has_battery() {
            return None;
        }
        if let Some(level) = self.get("bl").and_then(Value::as_i64) {
            return Some(level);
        }
        Some(if self.low_battery().unwrap_or(false) {
            0
        } else {
            100
        })
    }

    /// Serial number, 32-bit key first; normalized to a string.
    pub fn serial_number(&self) -> Option<String> {
        scalar_string(self.get("ser32")).or_else(|| scalar_string(self.get("ser")))
    }

    /// Software version, from `csv` or the polymorphic `fwv` shapes
    /// (int, list of ints, list of lists).
    pub fn software_version(&self) -> Option<String> {
        if let Some(csv) = scalar_string(self.get("csv")) {
            return Some(csv);
        }
        format_firmware(self.get("fwv")?)
    }

    /// Whether the device is usable. Most variants are always valid;
    /// wireless sensors can be provisioned-but-unused.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::WirelessSensor(sensor) => sensor.is_valid(),
            _ => true,
        }
    }

    // ── Variant accessors ────────────────────────────────────────────

    pub fn as_camera(&self) -> Option<&Camera> {
        match self {
            Self::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn as_door_lock(&self) -> Option<&DoorLock> {
        match self {
            Self::DoorLock(lock) => Some(lock),
            _ => None,
        }
    }

    pub fn as_garage_door(&self) -> Option<&GarageDoor> {
        match self {
            Self::GarageDoor(door) => Some(door),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<&Switch> {
        match self {
            Self::BinarySwitch(switch) | Self::MultilevelSwitch(switch) => Some(switch),
            _ => None,
        }
    }

    pub fn as_thermostat(&self) -> Option<&Thermostat> {
        match self {
            Self::Thermostat(thermostat) => Some(thermostat),
            _ => None,
        }
    }

    pub fn as_wireless_sensor(&self) -> Option<&WirelessSensor> {
        match self {
            Self::WirelessSensor(sensor) => Some(sensor),
            _ => None,
        }
    }
}

// ── Raw-value helpers ───────────────────────────────────────────────

pub(crate) fn raw_i64(map: &Map<String, Value>, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Python-style truthiness for wire values.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Present and neither null nor empty string.
fn non_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Normalize an int-or-string scalar to a string, treating `""` as
/// absent.
pub(crate) fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn format_firmware(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(parts) => {
            let mut flat = Vec::new();
            for part in parts {
                match part {
                    Value::Number(n) => flat.push(n.to_string()),
                    Value::Array(inner) => {
                        flat.extend(inner.iter().filter_map(|v| v.as_i64()).map(|v| v.to_string()))
                    }
                    _ => return None,
                }
            }
            if flat.is_empty() {
                None
            } else {
                Some(flat.join("."))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(value: Value) -> Device {
        Device::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn registry_selects_variant_by_tag() {
        assert!(matches!(
            device(json!({ "_id": 1, "panid": 9, "t": "camera_device" })),
            Device::Camera(_)
        ));
        assert!(matches!(
            device(json!({ "_id": 2, "panid": 9, "t": "door_lock_device" })),
            Device::DoorLock(_)
        ));
        assert!(matches!(
            device(json!({ "_id": 3, "panid": 9, "t": "primary_touch_link_device" })),
            Device::Panel(_)
        ));
    }

    #[test]
    fn registry_falls_back_to_unknown_without_erroring() {
        let dev = device(json!({ "_id": 4, "panid": 9, "t": "teleporter_device" }));
        assert!(matches!(dev, Device::Unknown(_)));
        assert_eq!(dev.type_tag(), "teleporter_device");
        assert_eq!(dev.id(), 4);

        // Even a payload with no tag at all builds something.
        let dev = device(json!({ "_id": 5, "panid": 9 }));
        assert!(matches!(dev, Device::Unknown(_)));
    }

    #[test]
    fn name_falls_back_to_type_and_id() {
        let named = device(json!({ "_id": 1, "panid": 9, "t": "camera_device", "n": "Porch" }));
        assert_eq!(named.name(), "Porch");

        let unnamed = device(json!({ "_id": 7, "panid": 9, "t": "camera_device" }));
        assert_eq!(unnamed.name(), "Camera 7");

        let empty = device(json!({ "_id": 8, "panid": 9, "t": "binary_switch_device", "n": "" }));
        assert_eq!(empty.name(), "Binary Switch 8");
    }

    #[test]
    fn battery_level_boundaries() {
        // Explicit level wins.
        let dev = device(json!({ "_id": 1, "panid": 9, "t": "wireless_sensor", "bl": 42, "lb": true }));
        assert_eq!(dev.battery_level(), Some(42));

        // Low-battery flag alone maps to 0.
        let dev = device(json!({ "_id": 1, "panid": 9, "t": "wireless_sensor", "lb": true }));
        assert_eq!(dev.battery_level(), Some(0));

        // Battery present, not low: 100.
        let dev = device(json!({ "_id": 1, "panid": 9, "t": "wireless_sensor", "lb": false }));
        assert_eq!(dev.battery_level(), Some(100));

        // No battery details at all.
        let dev = device(json!({ "_id": 1, "panid": 9, "t": "wireless_sensor" }));
        assert_eq!(dev.battery_level(), None);
        assert_eq!(dev.low_battery(), None);
    }

    #[test]
    fn serial_prefers_32_bit_key() {
        let dev = device(json!({
            "_id": 1, "panid": 9, "t": "wireless_sensor", "ser32": 1234567, "ser": 999
        }));
        assert_eq!(dev.serial_number().as_deref(), Some("1234567"));

        let dev = device(json!({ "_id": 1, "panid": 9, "t": "wireless_sensor", "ser": "abc" }));
        assert_eq!(dev.serial_number().as_deref(), Some("abc"));
    }

    #[test]
    fn firmware_version_shapes() {
        let dev = device(json!({ "_id": 1, "panid": 9, "t": "door_lock_device", "fwv": 15 }));
        assert_eq!(dev.software_version().as_deref(), Some("15"));

        let dev = device(json!({ "_id": 1, "panid": 9, "t": "door_lock_device", "fwv": [3, 1, 0] }));
        assert_eq!(dev.software_version().as_deref(), Some("3.1.0"));

        let dev = device(
            json!({ "_id": 1, "panid": 9, "t": "door_lock_device", "fwv": [[3], [1], [0]] }),
        );
        assert_eq!(dev.software_version().as_deref(), Some("3.1.0"));

        let dev = device(json!({
            "_id": 1, "panid": 9, "t": "door_lock_device", "csv": "2.0.1", "fwv": [3, 1]
        }));
        assert_eq!(dev.software_version().as_deref(), Some("2.0.1"));
    }

    #[test]
    fn update_merges_delta_into_raw() {
        let mut dev = device(json!({ "_id": 1, "panid": 9, "t": "binary_switch_device", "s": false }));
        dev.update_data(json!({ "s": true }).as_object().unwrap().clone(), false);
        assert_eq!(dev.get("s"), Some(&json!(true)));
        assert_eq!(dev.get("panid"), Some(&json!(9)));
    }
}
