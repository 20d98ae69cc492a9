// Response DTOs for the local HTTP surface.

use serde::Serialize;

use vivint_core::{AlarmPanel, Device, System};

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SystemResponse {
    pub id: i64,
    pub name: String,
    pub is_admin: bool,
}

impl SystemResponse {
    pub fn from_system(system: &System) -> Self {
        Self {
            id: system.id(),
            name: system.name().to_owned(),
            is_admin: system.is_admin(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PanelResponse {
    pub id: i64,
    pub partition_id: i64,
    pub name: String,
    /// Numeric armed state plus its label.
    pub state: i64,
    pub state_name: String,
    pub mac_address: Option<String>,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub software_version: Option<String>,
}

impl PanelResponse {
    pub fn from_panel(system: &System, panel: &AlarmPanel) -> Self {
        let state = panel.state();
        Self {
            id: panel.id(),
            partition_id: panel.partition_id(),
            name: system.name().to_owned(),
            state: state.value(),
            state_name: format!("{state:?}"),
            mac_address: panel.mac_address(),
            manufacturer: panel.manufacturer(),
            model: panel.model_name(),
            software_version: panel.software_version(),
        }
    }
}

/// One response shape covers every variant; fields that don't apply are
/// omitted.
#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: i64,
    pub panel_id: i64,
    pub name: String,
    pub device_type: String,
    pub online: bool,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_battery: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,

    // Locks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,

    // Garage doors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,

    // Switches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,

    // Thermostats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cool_set_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_set_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_state: Option<String>,

    // Cameras
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deter_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    // Sensors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_bypassed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
}

impl DeviceResponse {
    pub fn from_device(device: &Device) -> Self {
        let mut response = Self {
            id: device.id(),
            panel_id: device.panel_id(),
            name: device.name(),
            device_type: device.type_tag().to_owned(),
            online: device.is_online(),
            is_valid: device.is_valid(),
            battery_level: device.battery_level(),
            low_battery: device.low_battery(),
            serial_number: device.serial_number(),
            software_version: device.software_version(),
            is_locked: None,
            is_closed: None,
            is_on: None,
            level: None,
            temperature: None,
            cool_set_point: None,
            heat_set_point: None,
            humidity: None,
            operating_mode: None,
            operating_state: None,
            manufacturer: None,
            model: None,
            privacy_mode: None,
            deter_mode: None,
            mac_address: None,
            is_bypassed: None,
            equipment_type: None,
            sensor_type: None,
        };

        if let Some(lock) = device.as_door_lock() {
            response.is_locked = Some(lock.is_locked());
            response.is_bypassed = Some(lock.is_bypassed());
        }
        if let Some(door) = device.as_garage_door() {
            response.is_closed = door.is_closed();
        }
        if let Some(switch) = device.as_switch() {
            response.is_on = Some(switch.is_on());
            response.level = Some(switch.level());
        }
        if let Some(thermostat) = device.as_thermostat() {
            response.temperature = thermostat.temperature();
            response.cool_set_point = thermostat.cool_set_point();
            response.heat_set_point = thermostat.heat_set_point();
            response.humidity = thermostat.humidity();
            response.operating_mode = Some(format!("{:?}", thermostat.operating_mode()));
            response.operating_state = Some(format!("{:?}", thermostat.operating_state()));
        }
        if let Some(camera) = device.as_camera() {
            response.manufacturer = camera.manufacturer().map(str::to_owned);
            response.model = camera.model().map(str::to_owned);
            response.privacy_mode = Some(camera.is_in_privacy_mode());
            response.deter_mode = Some(camera.is_in_deter_mode());
            response.mac_address = camera.mac_address();
            response.online = camera.is_online();
        }
        if let Some(sensor) = device.as_wireless_sensor() {
            response.is_bypassed = Some(sensor.is_bypassed());
            response.equipment_type = Some(format!("{:?}", sensor.equipment_type()));
            response.sensor_type = Some(format!("{:?}", sensor.sensor_type()));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variant_fields_only_appear_when_relevant() {
        let lock = Device::new(
            json!({
                "_id": 7, "panid": 123, "t": "door_lock_device",
                "n": "Front", "s": true, "ol": true
            })
            .as_object()
            .unwrap()
            .clone(),
        );
        let body = serde_json::to_value(DeviceResponse::from_device(&lock)).unwrap();

        assert_eq!(body["is_locked"], json!(true));
        assert_eq!(body["device_type"], "door_lock_device");
        assert!(body.get("temperature").is_none());
        assert!(body.get("level").is_none());
    }

    #[test]
    fn camera_response_includes_hardware_info() {
        let camera = Device::new(
            json!({
                "_id": 42, "panid": 123, "t": "camera_device",
                "act": "vivint_dbc350_camera_device", "ol": true, "cmac": "aa:bb"
            })
            .as_object()
            .unwrap()
            .clone(),
        );
        let body = serde_json::to_value(DeviceResponse::from_device(&camera)).unwrap();

        assert_eq!(body["manufacturer"], "Vivint");
        assert_eq!(body["mac_address"], "aa:bb");
        assert_eq!(body["online"], json!(true));
    }
}
