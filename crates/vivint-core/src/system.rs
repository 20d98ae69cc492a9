// ── System (a customer site) ──
//
// Owns the alarm panels (one per partition) and the panel users, and
// routes every realtime push that names this system's panel id.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::devices::AlarmPanel;
use crate::entity::{Entity, Subscription};
use crate::user::User;
use vivint_api::models::SystemData;

/// A newly created device that needs an arrival settle (§ the account
/// layer polls it until valid, then fetches its full payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleRequest {
    pub panel_id: i64,
    pub partition_id: i64,
    pub device_id: i64,
}

pub struct System {
    pub(crate) entity: Entity<SystemData>,
    name: String,
    is_admin: bool,
    pub panels: Vec<AlarmPanel>,
    pub users: Vec<User>,
}

impl System {
    /// Build a system from the full payload (the `{"system": ...}`
    /// envelope), plus the name/admin flag from the auth-user listing.
    pub fn new(raw: Map<String, Value>, name: String, is_admin: bool) -> Self {
        let mut system = Self {
            entity: Entity::new(raw),
            name,
            is_admin,
            panels: Vec::new(),
            users: Vec::new(),
        };
        system.build_children();
        system
    }

    fn build_children(&mut self) {
        let body = self.entity.get("system").cloned().unwrap_or(Value::Null);

        self.panels = body
            .get("par")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .map(|partition| AlarmPanel::new(partition.clone()))
            .collect();

        self.users = body
            .get("u")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .map(|user| User::new(user.clone()))
            .collect();
    }

    pub fn id(&self) -> i64 {
        self.entity
            .model()
            .map(|m| m.system.panid)
            .or_else(|| {
                self.entity
                    .get("system")
                    .and_then(|s| s.get("panid"))
                    .and_then(Value::as_i64)
            })
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn panel(&self, partition_id: i64) -> Option<&AlarmPanel> {
        self.panels.iter().find(|p| p.partition_id() == partition_id)
    }

    pub fn panel_mut(&mut self, partition_id: i64) -> Option<&mut AlarmPanel> {
        self.panels
            .iter_mut()
            .find(|p| p.partition_id() == partition_id)
    }

    /// The site's primary panel (partitions are 1-based; the first panel
    /// answers site-level queries).
    pub fn primary_panel(&self) -> Option<&AlarmPanel> {
        self.panels.first()
    }

    pub fn on(
        &self,
        event: &str,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.entity.on(event, listener)
    }

    pub fn update_data(&mut self, delta: Map<String, Value>, override_raw: bool) {
        self.entity.update_data(delta, override_raw);
    }

    /// Apply a freshly fetched system payload: replace the raw map, then
    /// reconcile panels by `(panel_id, partition_id)` — refresh matches
    /// in place, append the rest.
    pub fn apply_refresh(&mut self, raw: Map<String, Value>) {
        self.entity.update_data(raw.clone(), true);

        let partitions: Vec<Map<String, Value>> = raw
            .get("system")
            .and_then(|s| s.get("par"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .cloned()
            .collect();

        for partition in partitions {
            let panel_id = partition.get("panid").and_then(Value::as_i64);
            let partition_id = partition.get("parid").and_then(Value::as_i64);
            let existing = self.panels.iter_mut().find(|panel| {
                Some(panel.id()) == panel_id && Some(panel.partition_id()) == partition_id
            });
            match existing {
                Some(panel) => panel.refresh(&partition, false),
                None => self.panels.push(AlarmPanel::new(partition)),
            }
        }
    }

    /// Route a user subarray: each entry goes to its User entity by id.
    pub fn update_users(&mut self, entries: &[Value]) {
        for entry in entries.iter().filter_map(Value::as_object) {
            let id = entry.get("_id").and_then(Value::as_i64);
            let Some(user) = self.users.iter_mut().find(|u| Some(u.id()) == id) else {
                debug!(system_id = self.id(), ?id, "user not found for push");
                return;
            };
            user.handle_message(entry.clone());
        }
    }

    /// Dispatch one realtime push addressed to this system. Returns the
    /// arrival-settle requests produced by create pushes.
    pub fn handle_message(&mut self, message: &Map<String, Value>) -> Vec<SettleRequest> {
        let message_type = message
            .get("t")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match message_type {
            "account_system" => {
                let operation = message.get("op").and_then(Value::as_str);
                let data = message.get("da").and_then(Value::as_object).cloned();

                if let (Some("u"), Some(mut data)) = (operation, data) {
                    if !data.is_empty() {
                        if let Some(users) = data.remove("u") {
                            if let Some(users) = users.as_array() {
                                self.update_users(users);
                            }
                        }
                        self.update_data(data, false);
                    }
                }
                Vec::new()
            }
            "account_partition" => {
                let Some(partition_id) = message.get("parid").and_then(Value::as_i64) else {
                    debug!(
                        system_id = self.id(),
                        "ignoring partition message with no partition id"
                    );
                    return Vec::new();
                };
                // Heartbeats carry no `da` key at all. An empty mapping
                // is NOT a heartbeat and must reach the panel.
                if !message.contains_key("da") {
                    debug!(
                        system_id = self.id(),
                        partition_id, "ignoring partition heartbeat"
                    );
                    return Vec::new();
                }

                let panel_id = self.id();
                let Some(panel) = self.panel_mut(partition_id) else {
                    debug!(
                        system_id = panel_id,
                        partition_id, "no panel for partition message"
                    );
                    return Vec::new();
                };

                panel
                    .handle_message(message)
                    .into_iter()
                    .map(|device_id| SettleRequest {
                        panel_id,
                        partition_id,
                        device_id,
                    })
                    .collect()
            }
            other => {
                warn!(system_id = self.id(), message_type = other, "unknown push type");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn system() -> System {
        System::new(
            json!({
                "system": {
                    "panid": 123,
                    "par": [{
                        "panid": 123, "parid": 1, "s": 0,
                        "d": [
                            { "_id": 42, "panid": 123, "t": "camera_device", "n": "Porch" }
                        ]
                    }],
                    "u": [{ "_id": 9, "n": "Jane", "ad": true, "lids": [1] }]
                }
            })
            .as_object()
            .unwrap()
            .clone(),
            "Home".into(),
            true,
        )
    }

    fn msg(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn construction_builds_panels_and_users() {
        let system = system();
        assert_eq!(system.id(), 123);
        assert_eq!(system.name(), "Home");
        assert!(system.is_admin());
        assert_eq!(system.panels.len(), 1);
        assert_eq!(system.users.len(), 1);
        assert_eq!(system.panels[0].devices.len(), 1);
    }

    #[test]
    fn account_system_update_routes_users_then_merges() {
        let mut system = system();
        let settles = system.handle_message(&msg(json!({
            "t": "account_system", "op": "u",
            "da": {
                "u": [{ "_id": 9, "lids.1": 5 }],
                "sinfo": { "x": 1 }
            }
        })));

        assert!(settles.is_empty());
        assert_eq!(system.users[0].lock_ids(), vec![1, 5]);
        // The users subarray was stripped before the system merge.
        assert_eq!(system.entity.get("u"), None);
        assert_eq!(system.entity.get("sinfo"), Some(&json!({ "x": 1 })));
    }

    #[test]
    fn partition_message_without_partition_id_is_dropped() {
        let mut system = system();
        let settles = system.handle_message(&msg(json!({
            "t": "account_partition", "panid": 123,
            "da": { "s": 4 }
        })));
        assert!(settles.is_empty());
        assert_eq!(system.panels[0].state(), crate::enums::ArmedState::Disarmed);
    }

    #[test]
    fn partition_heartbeat_without_data_key_is_dropped() {
        let mut system = system();
        let settles = system.handle_message(&msg(json!({
            "t": "account_partition", "panid": 123, "parid": 1
        })));
        assert!(settles.is_empty());
    }

    #[test]
    fn partition_message_with_empty_data_reaches_the_panel() {
        let mut system = system();
        let before = system.panels[0].raw().clone();
        system.handle_message(&msg(json!({
            "t": "account_partition", "panid": 123, "parid": 1, "da": {}
        })));
        assert_eq!(system.panels[0].raw(), &before);
    }

    #[test]
    fn unknown_message_type_is_dropped() {
        let mut system = system();
        let settles = system.handle_message(&msg(json!({
            "t": "account_mystery", "panid": 123, "da": { "s": 4 }
        })));
        assert!(settles.is_empty());
    }

    #[test]
    fn create_push_produces_settle_requests() {
        let mut system = system();
        let settles = system.handle_message(&msg(json!({
            "t": "account_partition", "panid": 123, "parid": 1, "op": "c",
            "da": { "d": [{ "_id": 99, "panid": 123, "t": "binary_switch_device" }] }
        })));
        assert_eq!(
            settles,
            vec![SettleRequest {
                panel_id: 123,
                partition_id: 1,
                device_id: 99
            }]
        );
    }

    #[test]
    fn refresh_matches_panels_by_panel_and_partition_id() {
        let mut system = system();
        system.apply_refresh(
            json!({
                "system": {
                    "panid": 123,
                    "par": [
                        { "panid": 123, "parid": 1, "s": 3, "d": [] },
                        { "panid": 123, "parid": 2, "s": 0, "d": [] }
                    ]
                }
            })
            .as_object()
            .unwrap()
            .clone(),
        );

        assert_eq!(system.panels.len(), 2);
        assert_eq!(
            system.panel(1).unwrap().state(),
            crate::enums::ArmedState::ArmedStay
        );
        // The camera survived the in-place panel refresh.
        assert!(system.panel(1).unwrap().device(42).is_some());
    }
}
