// ── Wire models for Sky API payloads ──
//
// The Sky API speaks compact alias keys (`panid`, `parid`, `mbc`, ...).
// Decoding is permissive: unknown keys are ignored, a single object is
// accepted where a list is expected, and optional fields default. The
// alarm-panel model additionally accepts descriptive field names because
// panel payloads appear in both spellings.
//
// These models are *projections*: the authoritative representation of an
// entity is always its raw map (see `vivint-core`). Encoding emits the
// compact names so declared fields round-trip byte-for-byte.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Accept `null`, a single value, or a list; always produce a list.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(values)) => values,
        Some(OneOrMany::One(value)) => vec![value],
    })
}

// ── Auth user ───────────────────────────────────────────────────────

/// A site reference embedded in the auth-user payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserSystem {
    pub panid: i64,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<String>,
    /// Admin flag for this user on this system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserUser {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Per-user broadcast channel suffix for the realtime service.
    #[serde(rename = "mbc", default, skip_serializing_if = "Option::is_none")]
    pub message_broadcast_channel: Option<String>,
    #[serde(
        rename = "system",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub systems: Vec<AuthUserSystem>,
}

/// Payload of the `authuser` endpoint: the users (usually one) visible to
/// the authenticated session and their systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserData {
    #[serde(
        rename = "u",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub users: Vec<AuthUserUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_signed_in: Option<bool>,
}

impl AuthUserData {
    /// The primary user, if the payload carries any.
    pub fn primary_user(&self) -> Option<&AuthUserUser> {
        self.users.first()
    }
}

// ── System ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemBody {
    pub panid: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fea: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sinfo: Option<Value>,
    /// Partition payloads, one per alarm panel.
    #[serde(default, deserialize_with = "one_or_many")]
    pub par: Vec<Value>,
    #[serde(
        rename = "u",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub users: Vec<Value>,
    /// Unknown wire keys, preserved so re-encoding loses nothing.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemData {
    pub system: SystemBody,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SystemData {
    /// The payload as a raw map (the authoritative entity form).
    pub fn to_raw(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// A user within a system payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemUserData {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "ad", default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,
    #[serde(rename = "hlp", default, skip_serializing_if = "Option::is_none")]
    pub has_lock_pin: Option<bool>,
    #[serde(rename = "hpp", default, skip_serializing_if = "Option::is_none")]
    pub has_panel_pin: Option<bool>,
    #[serde(rename = "hp", default, skip_serializing_if = "Option::is_none")]
    pub has_pins: Option<bool>,
    #[serde(rename = "ra", default, skip_serializing_if = "Option::is_none")]
    pub remote_access: Option<bool>,
    #[serde(rename = "reg", default, skip_serializing_if = "Option::is_none")]
    pub registered: Option<bool>,
    #[serde(
        rename = "lids",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub lock_ids: Vec<i64>,
}

/// Credentials for talking to the physical panel directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelCredentialsData {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "pswd")]
    pub password: String,
}

// ── Devices ─────────────────────────────────────────────────────────

/// Fields common to every device payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceData {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(rename = "panid")]
    pub panel_id: i64,
    #[serde(rename = "t")]
    pub device_type: String,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// State arrives as int, string, or bool depending on the device.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(rename = "ol", default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(rename = "ser32", default, skip_serializing_if = "Option::is_none")]
    pub serial_number_32_bit: Option<Value>,
    #[serde(rename = "ser", default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<Value>,
    #[serde(rename = "bl", default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<i64>,
    #[serde(rename = "lb", default, skip_serializing_if = "Option::is_none")]
    pub low_battery: Option<bool>,
    #[serde(rename = "b", default, skip_serializing_if = "Option::is_none")]
    pub bypassed: Option<i64>,
    #[serde(rename = "ta", default, skip_serializing_if = "Option::is_none")]
    pub tamper: Option<bool>,
    #[serde(rename = "fwv", default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<Value>,
    #[serde(rename = "csv", default, skip_serializing_if = "Option::is_none")]
    pub current_software_version: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraData {
    #[serde(flatten)]
    pub device: DeviceData,
    #[serde(rename = "act", default, skip_serializing_if = "Option::is_none")]
    pub actual_type: Option<String>,
    #[serde(rename = "cda", default, skip_serializing_if = "Option::is_none")]
    pub camera_direct_available: Option<bool>,
    #[serde(rename = "caip", default, skip_serializing_if = "Option::is_none")]
    pub camera_ip_address: Option<String>,
    #[serde(rename = "cap", default, skip_serializing_if = "Option::is_none")]
    pub camera_ip_port: Option<i64>,
    #[serde(rename = "un", default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "pswd", default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "cpm", default, skip_serializing_if = "Option::is_none")]
    pub camera_privacy: Option<bool>,
    #[serde(rename = "cdp", default, skip_serializing_if = "Option::is_none")]
    pub camera_direct_stream_path: Option<String>,
    #[serde(rename = "cdps", default, skip_serializing_if = "Option::is_none")]
    pub camera_direct_stream_path_std: Option<String>,
    #[serde(rename = "ccom", default, skip_serializing_if = "Option::is_none")]
    pub capture_clip_on_motion: Option<bool>,
    #[serde(rename = "cmac", default, skip_serializing_if = "Option::is_none")]
    pub camera_mac: Option<String>,
    #[serde(rename = "wiss", default, skip_serializing_if = "Option::is_none")]
    pub wireless_signal_strength: Option<i64>,
    #[serde(rename = "ctd", default, skip_serializing_if = "Option::is_none")]
    pub camera_thumbnail_date: Option<String>,
    #[serde(rename = "dod", default, skip_serializing_if = "Option::is_none")]
    pub deter_on_duty: Option<bool>,
    #[serde(rename = "vdt", default, skip_serializing_if = "Option::is_none")]
    pub visitor_detected: Option<bool>,
    #[serde(rename = "dng", default, skip_serializing_if = "Option::is_none")]
    pub ding_dong: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorLockData {
    #[serde(flatten)]
    pub device: DeviceData,
    #[serde(
        rename = "ucl",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub user_code_list: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchData {
    #[serde(flatten)]
    pub device: DeviceData,
    /// Dimmer level or binary state, depending on the switch.
    #[serde(rename = "val", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermostatData {
    #[serde(flatten)]
    pub device: DeviceData,
    #[serde(rename = "act", default, skip_serializing_if = "Option::is_none")]
    pub actual_type: Option<String>,
    #[serde(rename = "ct", default, skip_serializing_if = "Option::is_none")]
    pub current_temperature: Option<f64>,
    #[serde(rename = "csp", default, skip_serializing_if = "Option::is_none")]
    pub cool_set_point: Option<f64>,
    #[serde(rename = "hsp", default, skip_serializing_if = "Option::is_none")]
    pub heat_set_point: Option<f64>,
    #[serde(rename = "om", default, skip_serializing_if = "Option::is_none")]
    pub operating_mode: Option<i64>,
    #[serde(rename = "fm", default, skip_serializing_if = "Option::is_none")]
    pub fan_mode: Option<i64>,
    #[serde(rename = "fs", default, skip_serializing_if = "Option::is_none")]
    pub fan_state: Option<i64>,
    #[serde(rename = "hm", default, skip_serializing_if = "Option::is_none")]
    pub hold_mode: Option<i64>,
    #[serde(rename = "hmdt", default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<i64>,
    #[serde(rename = "maxt", default, skip_serializing_if = "Option::is_none")]
    pub maximum_temperature: Option<f64>,
    #[serde(rename = "mint", default, skip_serializing_if = "Option::is_none")]
    pub minimum_temperature: Option<f64>,
    #[serde(rename = "os", default, skip_serializing_if = "Option::is_none")]
    pub operating_state: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarageDoorData {
    #[serde(flatten)]
    pub device: DeviceData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirelessSensorData {
    #[serde(flatten)]
    pub device: DeviceData,
    #[serde(rename = "set", default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<i64>,
    #[serde(rename = "ec", default, skip_serializing_if = "Option::is_none")]
    pub equipment_code: Option<i64>,
    #[serde(rename = "eqt", default, skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<i64>,
    #[serde(rename = "sv", default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

/// Alarm panel payload. Accepts both the compact alias keys (`panid`,
/// `parid`, `d`, `ureg`, `pmac`) and the descriptive names that some
/// payloads carry (`panel_id`, `partition_id`, `devices`, `unregistered`,
/// `mac_address`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmPanelData {
    /// May come as an int or as a `"<panid>|<partition>"` string.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(rename = "panid", alias = "panel_id")]
    pub panel_id: i64,
    #[serde(rename = "parid", alias = "partition_id")]
    pub partition_id: i64,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(
        rename = "pmac",
        alias = "mac_address",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mac_address: Option<String>,
    #[serde(
        rename = "d",
        alias = "devices",
        default,
        deserialize_with = "one_or_many"
    )]
    pub devices: Vec<Value>,
    #[serde(
        rename = "ureg",
        alias = "unregistered",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub unregistered: Vec<Value>,
}
