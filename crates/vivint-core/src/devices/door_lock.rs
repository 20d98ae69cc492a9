use serde_json::{Map, Value};

use crate::devices::truthy;
use crate::entity::Entity;
use crate::enums::ZoneBypass;
use vivint_api::models::DoorLockData;

pub struct DoorLock {
    pub(crate) entity: Entity<DoorLockData>,
}

impl DoorLock {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            entity: Entity::new(data),
        }
    }

    pub fn is_locked(&self) -> bool {
        truthy(self.entity.get("s").unwrap_or(&Value::Null))
    }

    pub fn is_online(&self) -> bool {
        truthy(self.entity.get("ol").unwrap_or(&Value::Null))
    }

    pub fn user_code_list(&self) -> Vec<i64> {
        self.entity
            .model()
            .map(|m| m.user_code_list.clone())
            .unwrap_or_default()
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
}
