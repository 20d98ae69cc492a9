// A user within a system (panel users, not the cloud login).

use serde_json::{Map, Value};

use crate::entity::Entity;
use vivint_api::models::SystemUserData;

/// Sentinel key the push channel uses to append a single lock id:
/// the `lids` wire key with a `.1` suffix.
const ADD_LOCK: &str = "lids.1";

pub struct User {
    pub(crate) entity: Entity<SystemUserData>,
}

impl User {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            entity: Entity::new(data),
        }
    }

    pub fn id(&self) -> i64 {
        self.entity.get("_id").and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.entity
            .get("n")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }

    pub fn is_admin(&self) -> bool {
        self.entity.get("ad").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn is_registered(&self) -> bool {
        self.entity.get("reg").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn has_remote_access(&self) -> bool {
        self.entity.get("ra").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn has_lock_pin(&self) -> bool {
        self.entity.get("hlp").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn has_panel_pin(&self) -> bool {
        self.entity.get("hpp").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn has_pins(&self) -> bool {
        self.entity.get("hp").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn lock_ids(&self) -> Vec<i64> {
        self.entity
            .model()
            .map(|m| m.lock_ids.clone())
            .unwrap_or_default()
    }

    /// Push handling: the add-one-lock sentinel appends to `lids`
    /// before the default merge.
    pub fn handle_message(&mut self, mut message: Map<String, Value>) {
        if let Some(added) = message.remove(ADD_LOCK) {
            let mut lock_ids = self.lock_ids();
            if let Some(id) = added.as_i64() {
                lock_ids.push(id);
            }
            message.insert("lids".into(), lock_ids.into());
        }
        self.entity.update_data(message, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(value: Value) -> User {
        User::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn add_one_lock_sentinel_appends() {
        let mut u = user(json!({ "_id": 9, "n": "Jane", "lids": [1, 2] }));
        u.handle_message(json!({ "lids.1": 5 }).as_object().unwrap().clone());

        assert_eq!(u.lock_ids(), vec![1, 2, 5]);
        assert!(u.entity.get("lids.1").is_none());
    }

    #[test]
    fn plain_updates_merge() {
        let mut u = user(json!({ "_id": 9, "n": "Jane", "ad": false }));
        u.handle_message(json!({ "ad": true }).as_object().unwrap().clone());
        assert!(u.is_admin());
        assert_eq!(u.name(), "Jane");
    }
}
