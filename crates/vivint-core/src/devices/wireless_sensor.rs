use serde_json::{Map, Value};

use crate::devices::{scalar_string, truthy};
use crate::entity::Entity;
use crate::enums::{EquipmentCode, EquipmentType, SensorType, ZoneBypass};
use vivint_api::models::WirelessSensorData;

pub struct WirelessSensor {
    pub(crate) entity: Entity<WirelessSensorData>,
}

impl WirelessSensor {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            entity: Entity::new(data),
        }
    }

    pub fn equipment_code(&self) -> EquipmentCode {
        self.entity
            .get("ec")
            .and_then(Value::as_i64)
            .map_or(EquipmentCode::Unknown, EquipmentCode::from_i64)
    }

    pub fn equipment_type(&self) -> EquipmentType {
        self.entity
            .get("eqt")
            .and_then(Value::as_i64)
            .map_or(EquipmentType::Unknown, EquipmentType::from_i64)
    }

    pub fn sensor_type(&self) -> SensorType {
        self.entity
            .get("set")
            .and_then(Value::as_i64)
            .map_or(SensorType::Unknown, SensorType::from_i64)
    }

    pub fn is_on(&self) -> bool {
        truthy(self.entity.get("s").unwrap_or(&Value::Null))
    }

    pub fn is_bypassed(&self) -> bool {
        match self.entity.get("b").and_then(Value::as_i64) {
            Some(value) => ZoneBypass::from_i64(value) != ZoneBypass::Unbypassed,
            None => false,
        }
    }

    pub fn is_tampered(&self) -> bool {
        truthy(self.entity.get("ta").unwrap_or(&Value::Null))
    }

    fn serial(&self) -> Option<String> {
        scalar_string(self.entity.get("ser32")).or_else(|| scalar_string(self.entity.get("ser")))
    }

    /// A sensor is usable once it has a serial number and is actually
    /// provisioned: equipment code not `Other`, sensor type not
    /// `Unused`. Newly paired sensors flip to valid a few seconds after
    /// the create push.
    pub fn is_valid(&self) -> bool {
        self.serial().is_some()
            && self.equipment_code() != EquipmentCode::Other
            && self.sensor_type() != SensorType::Unused
    }
}
