// Binary and multilevel switches. Both share one payload shape; the
// variant tag decides whether `val` is a level or mirrors the state.

use serde_json::{Map, Value};

use crate::devices::truthy;
use crate::entity::Entity;
use vivint_api::models::SwitchData;

pub struct Switch {
    pub(crate) entity: Entity<SwitchData>,
}

impl Switch {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            entity: Entity::new(data),
        }
    }

    pub fn is_on(&self) -> bool {
        truthy(self.entity.get("s").unwrap_or(&Value::Null))
    }

    pub fn is_online(&self) -> bool {
        truthy(self.entity.get("ol").unwrap_or(&Value::Null))
    }

    /// Dimmer level in 0..=100 (0 when unreported).
    pub fn level(&self) -> i64 {
        match self.entity.get("val") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::Bool(true)) => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn switch(value: serde_json::Value) -> Switch {
        Switch::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn state_and_level() {
        let sw = switch(json!({
            "_id": 1, "panid": 9, "t": "multilevel_switch_device", "s": true, "val": 65, "ol": true
        }));
        assert!(sw.is_on());
        assert!(sw.is_online());
        assert_eq!(sw.level(), 65);
    }

    #[test]
    fn missing_value_defaults_to_zero() {
        let sw = switch(json!({ "_id": 1, "panid": 9, "t": "binary_switch_device", "s": false }));
        assert!(!sw.is_on());
        assert_eq!(sw.level(), 0);
    }
}
