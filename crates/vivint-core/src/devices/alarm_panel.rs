// ── Alarm panel ──
//
// One panel per site partition. Owns the devices of its partition and
// absorbs every device-scoped push: panel-level merges, per-device
// updates, deletions (devices move into the unregistered map), and
// creations (which the caller follows up with an arrival settle).

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::devices::{raw_i64, Device};
use crate::entity::{Entity, Subscription};
use crate::enums::{ArmedState, DeviceType};
use vivint_api::models::{AlarmPanelData, PanelCredentialsData};

/// Emitted when a delete push removes a device from this panel.
pub const DEVICE_DELETED: &str = "device_deleted";
/// Emitted when a newly created device finishes its arrival settle.
pub const DEVICE_DISCOVERED: &str = "device_discovered";

pub struct AlarmPanel {
    pub(crate) entity: Entity<AlarmPanelData>,
    pub devices: Vec<Device>,
    /// Devices removed from the partition: id → (name, type).
    pub unregistered_devices: HashMap<i64, (String, DeviceType)>,
    credentials: Option<PanelCredentialsData>,
}

impl AlarmPanel {
    pub fn new(mut data: Map<String, Value>) -> Self {
        normalize_keys(&mut data);
        let mut panel = Self {
            entity: Entity::new(data.clone()),
            devices: Vec::new(),
            unregistered_devices: HashMap::new(),
            credentials: None,
        };
        panel.parse_data(&data, true);
        panel
    }

    // ── Identity & state ─────────────────────────────────────────────

    pub fn id(&self) -> i64 {
        self.entity
            .model()
            .map(|m| m.panel_id)
            .or_else(|| raw_i64(self.entity.raw(), "panid"))
            .unwrap_or_default()
    }

    pub fn partition_id(&self) -> i64 {
        self.entity
            .model()
            .map(|m| m.partition_id)
            .or_else(|| raw_i64(self.entity.raw(), "parid"))
            .unwrap_or_default()
    }

    pub fn mac_address(&self) -> Option<String> {
        self.entity
            .get("pmac")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    pub fn state(&self) -> ArmedState {
        ArmedState::decode(self.entity.get("s"))
    }

    pub fn is_disarmed(&self) -> bool {
        self.state() == ArmedState::Disarmed
    }

    pub fn is_armed_stay(&self) -> bool {
        self.state() == ArmedState::ArmedStay
    }

    pub fn is_armed_away(&self) -> bool {
        self.state() == ArmedState::ArmedAway
    }

    pub fn manufacturer(&self) -> &'static str {
        "Vivint"
    }

    /// Hardware generation, read off the physical panel device.
    pub fn model_name(&self) -> &'static str {
        let is_sky_control = self
            .panel_device()
            .and_then(|device| device.get("pant"))
            .and_then(Value::as_i64)
            == Some(1);
        if is_sky_control {
            "Sky Control"
        } else {
            "Smart Hub"
        }
    }

    pub fn software_version(&self) -> Option<String> {
        self.panel_device().and_then(Device::software_version)
    }

    fn panel_device(&self) -> Option<&Device> {
        self.devices
            .iter()
            .find(|device| device.device_type() == DeviceType::Panel)
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub fn device(&self, device_id: i64) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == device_id)
    }

    pub fn device_mut(&mut self, device_id: i64) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id() == device_id)
    }

    // ── Credentials cache ────────────────────────────────────────────

    pub fn credentials(&self) -> Option<&PanelCredentialsData> {
        self.credentials.as_ref()
    }

    pub fn store_credentials(&mut self, credentials: PanelCredentialsData) {
        self.credentials = Some(credentials);
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn on(
        &self,
        event: &str,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.entity.on(event, listener)
    }

    pub fn emit(&self, event: &str, payload: Value) {
        self.entity.emit(event, payload)
    }

    pub fn raw(&self) -> &Map<String, Value> {
        self.entity.raw()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    pub fn update_data(&mut self, delta: Map<String, Value>, override_raw: bool) {
        self.entity.update_data(delta, override_raw);
    }

    /// Refresh from a partition payload.
    ///
    /// `new_device = false` replaces the panel's raw data outright and
    /// reconciles every device (update in place by id, create missing).
    /// `new_device = true` extends the device list with entries not yet
    /// present and parses only those — the form used for create pushes
    /// and arrival settles.
    pub fn refresh(&mut self, data: &Map<String, Value>, new_device: bool) {
        let mut data = data.clone();
        normalize_keys(&mut data);

        if !new_device {
            self.entity.update_data(data.clone(), true);
        } else {
            let incoming: Vec<Value> = data
                .get("d")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            self.entity.mutate_raw(|raw| {
                let list = raw
                    .entry("d")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(list) = list.as_array_mut() {
                    for entry in incoming {
                        let id = entry.get("_id").and_then(Value::as_i64);
                        let already_known = id.is_some()
                            && list
                                .iter()
                                .any(|e| e.get("_id").and_then(Value::as_i64) == id);
                        if !already_known {
                            list.push(entry);
                        }
                    }
                }
            });
        }

        self.parse_data(&data, false);
    }

    /// Handle a device-scoped push. Returns the ids of newly created
    /// devices; the account layer runs an arrival settle for each.
    pub fn handle_message(&mut self, message: &Map<String, Value>) -> Vec<i64> {
        let op = message
            .get("op")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let Some(data) = message.get("da").and_then(Value::as_object).cloned() else {
            debug!(
                panel_id = self.id(),
                partition_id = self.partition_id(),
                "ignoring partition message with no data payload"
            );
            return Vec::new();
        };

        let device_entries: Vec<Map<String, Value>> = data
            .get("d")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_object)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // No devices in the payload: the message is for the panel
        // itself. An empty `da` is a legal no-op merge.
        if device_entries.is_empty() {
            self.update_data(data, false);
            return Vec::new();
        }

        let mut created = Vec::new();
        let mut batch_refreshed = false;

        for entry in device_entries {
            let Some(device_id) = entry.get("_id").and_then(Value::as_i64) else {
                debug!("dropping device push without an id");
                continue;
            };

            if op == "c" {
                // One refresh covers the whole batch; each new id still
                // gets its own arrival settle.
                if !batch_refreshed {
                    self.refresh(&data, true);
                    batch_refreshed = true;
                }
                created.push(device_id);
                continue;
            }

            let Some(index) = self.devices.iter().position(|d| d.id() == device_id) else {
                debug!(device_id, "ignoring push for unknown device");
                continue;
            };

            if op == "d" {
                let device = self.devices.remove(index);
                self.entity.mutate_raw(|raw| {
                    if let Some(list) = raw.get_mut("d").and_then(Value::as_array_mut) {
                        list.retain(|e| e.get("_id").and_then(Value::as_i64) != Some(device_id));
                    }
                });
                self.unregistered_devices
                    .insert(device_id, (device.name(), device.device_type()));
                self.entity.emit(
                    DEVICE_DELETED,
                    json!({
                        "device_id": device_id,
                        "name": device.name(),
                        "type": device.type_tag(),
                    }),
                );
            } else {
                self.devices[index].handle_message(entry.clone());
                // Keep the panel's raw device snapshot consistent with
                // the device's own raw map.
                self.entity.mutate_raw(|raw| {
                    if let Some(list) = raw.get_mut("d").and_then(Value::as_array_mut) {
                        if let Some(target) = list.iter_mut().find(|e| {
                            e.get("_id").and_then(Value::as_i64) == Some(device_id)
                        }) {
                            if let Some(target) = target.as_object_mut() {
                                for (key, value) in &entry {
                                    target.insert(key.clone(), value.clone());
                                }
                            }
                        }
                    }
                });
            }
        }

        created
    }

    fn parse_data(&mut self, data: &Map<String, Value>, init: bool) {
        for device_data in data
            .get("d")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
        {
            let device_id = device_data.get("_id").and_then(Value::as_i64);
            let existing = if init {
                None
            } else {
                device_id.and_then(|id| self.devices.iter_mut().find(|d| d.id() == id))
            };

            match existing {
                Some(device) => device.update_data(device_data.clone(), true),
                None => self.devices.push(Device::new(device_data.clone())),
            }
        }

        if let Some(unregistered) = data.get("ureg").and_then(Value::as_array) {
            if !unregistered.is_empty() {
                self.unregistered_devices = unregistered
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|entry| {
                        let id = entry.get("_id").and_then(Value::as_i64)?;
                        let name = entry
                            .get("n")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned();
                        let device_type = DeviceType::from_tag(
                            entry.get("t").and_then(Value::as_str).unwrap_or_default(),
                        );
                        Some((id, (name, device_type)))
                    })
                    .collect();
            }
        }
    }
}

/// Some payloads spell the panel keys out; normalize to the compact
/// aliases the rest of the graph keys on.
fn normalize_keys(data: &mut Map<String, Value>) {
    for (descriptive, compact) in [
        ("devices", "d"),
        ("unregistered", "ureg"),
        ("panel_id", "panid"),
        ("partition_id", "parid"),
    ] {
        if !data.contains_key(compact) {
            if let Some(value) = data.remove(descriptive) {
                data.insert(compact.to_owned(), value);
            }
        }
    }
}
