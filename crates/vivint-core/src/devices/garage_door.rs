use serde_json::{Map, Value};

use crate::devices::truthy;
use crate::entity::Entity;
use crate::enums::GarageDoorState;
use vivint_api::models::GarageDoorData;

pub struct GarageDoor {
    pub(crate) entity: Entity<GarageDoorData>,
}

impl GarageDoor {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            entity: Entity::new(data),
        }
    }

    pub fn state(&self) -> GarageDoorState {
        self.entity
            .get("s")
            .and_then(Value::as_i64)
            .map_or(GarageDoorState::Unknown, GarageDoorState::from_i64)
    }

    /// `None` when the door's position is unknown.
    pub fn is_closed(&self) -> Option<bool> {
        match self.state() {
            GarageDoorState::Unknown | GarageDoorState::NoState => None,
            state => Some(state == GarageDoorState::Closed),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.state() == GarageDoorState::Closing
    }

    pub fn is_opening(&self) -> bool {
        self.state() == GarageDoorState::Opening
    }

    pub fn is_online(&self) -> bool {
        truthy(self.entity.get("ol").unwrap_or(&Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn door(state: serde_json::Value) -> GarageDoor {
        GarageDoor::new(
            json!({ "_id": 6, "panid": 9, "t": "garage_door_device", "s": state })
                .as_object()
                .unwrap()
                .clone(),
        )
    }

    #[test]
    fn state_mapping() {
        assert_eq!(door(json!(1)).is_closed(), Some(true));
        assert_eq!(door(json!(5)).is_closed(), Some(false));
        assert!(door(json!(2)).is_closing());
        assert!(door(json!(4)).is_opening());
    }

    #[test]
    fn unknown_position_is_none() {
        assert_eq!(door(json!(0)).is_closed(), None);
        assert_eq!(door(json!(null)).is_closed(), None);
    }
}
