// Cameras carry the richest push behavior: beyond the default merge,
// each push is classified into at most one domain event by inspecting
// which keys the delta carries.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::devices::truthy;
use crate::entity::Entity;
use vivint_api::models::CameraData;

pub const DOORBELL_DING: &str = "doorbell_ding";
pub const MOTION_DETECTED: &str = "motion_detected";
pub const THUMBNAIL_READY: &str = "thumbnail_ready";
pub const VIDEO_READY: &str = "video_ready";

/// Known camera hardware, keyed by the `act` (actual type) tag.
const CAMERA_INFO: &[(&str, Option<&str>, &str)] = &[
    ("alpha_cs6022_camera_device", Some("Vivint"), "Indoor Camera (CS6022)"),
    ("camera_device", None, "Generic Camera Device"),
    ("hd100_camera_device", Some("LG"), "HD 100 Camera"),
    ("lgit_hd110_camera_device", Some("LG"), "HD 110 Camera"),
    ("panel_camera_device", None, "Panel Camera"),
    ("touch_link_camera_device", None, "Panel Camera"),
    ("vivint_dbc300_camera_device", Some("Vivint"), "Doorbell Camera Pro Gen 1 (DBC300)"),
    ("vivint_dbc301_camera_device", Some("Vivint"), "Doorbell Camera Pro Gen 1 (DBC301)"),
    ("vivint_dbc350_camera_device", Some("Vivint"), "Doorbell Camera Pro Gen 2 (DBC350)"),
    ("vivint_idc350_camera_device", Some("Vivint"), "Indoor Camera Pro (IDC350)"),
    ("vivint_odc300_camera_device", Some("Vivint"), "Outdoor Camera Pro Gen 1 (ODC300)"),
    ("vivint_odc350_camera_device", Some("Vivint"), "Outdoor Camera Pro Gen 2 (ODC350)"),
    ("vivotek_520ir_camera_device", Some("Vivotek"), "Fixed Camera (V520IR)"),
    ("vivotek_620pt_camera_device", Some("Vivotek"), "Pan and Tilt Camera (V620PT)"),
    ("vivotek_720_camera_device", Some("Vivotek"), "Outdoor Camera (V720)"),
    ("vivotek_720w_camera_device", Some("Vivotek"), "Wireless Outdoor Camera (V720W)"),
    ("vivotek_db8331w_camera_device", Some("Vivotek"), "Doorbell Camera (DB8331W)"),
    ("vivotek_db8332_camera_device", Some("Vivotek"), "Doorbell Camera v2 (DB8332)"),
    ("vivotek_fd8134v_camera_device", Some("Vivotek"), "Dome Camera (FD8134V)"),
    ("vivotek_hd400w_camera_device", Some("Vivotek"), "Outdoor Camera v2 (HD400W)"),
    ("vivotek_hdp450_camera_device", Some("Vivotek"), "Outdoor Camera (HDP450)"),
];

/// Camera models with a panel-side VPN that blocks direct LAN access.
const SKIP_DIRECT: &[&str] = &["alpha_cs6022_camera_device"];

pub struct Camera {
    pub(crate) entity: Entity<CameraData>,
    manufacturer: Option<String>,
    model: Option<String>,
}

impl Camera {
    pub fn new(data: Map<String, Value>) -> Self {
        let actual_type = data
            .get("act")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let (manufacturer, model) = match CAMERA_INFO
            .iter()
            .find(|(tag, _, _)| *tag == actual_type)
        {
            Some((_, manufacturer, model)) => {
                (manufacturer.map(str::to_owned), Some((*model).to_owned()))
            }
            None => {
                // Guess from the tag shape: "<maker>_<model>_camera_device".
                let mut parts = actual_type.split('_');
                let manufacturer = parts.next().filter(|p| !p.is_empty()).map(title_case);
                let model = parts.next().map(str::to_uppercase);
                (manufacturer, model)
            }
        };

        Self {
            entity: Entity::new(data),
            manufacturer,
            model,
        }
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn is_online(&self) -> bool {
        truthy(self.entity.get("ol").unwrap_or(&Value::Null))
    }

    pub fn is_in_privacy_mode(&self) -> bool {
        truthy(self.entity.get("cpm").unwrap_or(&Value::Null))
    }

    pub fn is_in_deter_mode(&self) -> bool {
        truthy(self.entity.get("dod").unwrap_or(&Value::Null))
    }

    pub fn ip_address(&self) -> Option<String> {
        self.entity
            .get("caip")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// MAC address doubles as the camera's serial number.
    pub fn mac_address(&self) -> Option<String> {
        self.entity
            .get("cmac")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    pub fn wireless_signal_strength(&self) -> i64 {
        self.entity
            .get("wiss")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Timestamp of the newest thumbnail, as reported by the camera.
    pub fn thumbnail_date(&self) -> Option<&str> {
        self.entity.get("ctd").and_then(Value::as_str)
    }

    /// The direct RTSP URL, when the camera is LAN-reachable and its
    /// model allows direct access.
    pub fn direct_rtsp_url(&self, hd: bool) -> Option<String> {
        if !truthy(self.entity.get("cda").unwrap_or(&Value::Null)) {
            return None;
        }
        let actual_type = self.entity.get("act").and_then(Value::as_str).unwrap_or("");
        if SKIP_DIRECT.contains(&actual_type) {
            return None;
        }
        let username = self.entity.get("un").and_then(Value::as_str)?;
        let password = self.entity.get("pswd").and_then(Value::as_str)?;
        let ip = self.ip_address()?;
        let port = self.entity.get("cap").and_then(Value::as_i64)?;
        let path_key = if hd { "cdp" } else { "cdps" };
        let path = self.entity.get(path_key).and_then(Value::as_str)?;
        Some(format!("rtsp://{username}:{password}@{ip}:{port}/{path}"))
    }

    /// Apply a push delta, then emit at most one domain event describing
    /// what the delta meant.
    pub fn handle_message(&mut self, message: Map<String, Value>) {
        let event = classify(&message);
        self.entity.update_data(message.clone(), false);
        if let Some(event) = event {
            self.entity
                .emit(event, json!({ "message": Value::Object(message) }));
        }
    }
}

/// Map a push delta to its domain event. The four events are disjoint:
/// the first matching rule wins.
fn classify(message: &Map<String, Value>) -> Option<&'static str> {
    let keys: BTreeSet<&str> = message.keys().map(String::as_str).collect();
    let key_set = |wanted: &[&str]| keys == wanted.iter().copied().collect::<BTreeSet<_>>();

    if truthy(message.get("ctd").unwrap_or(&Value::Null)) {
        Some(THUMBNAIL_READY)
    } else if truthy(message.get("dng").unwrap_or(&Value::Null)) {
        Some(DOORBELL_DING)
    } else if key_set(&["_id", "t"]) {
        Some(VIDEO_READY)
    } else if truthy(message.get("vdt").unwrap_or(&Value::Null))
        || key_set(&["_id", "act", "s"])
        || key_set(&["_id", "dod", "t"])
    {
        Some(MOTION_DETECTED)
    } else {
        None
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
