// ── /systems/{id}/devices routes ──
//
// Device listing, details, per-variant actions, and the camera snapshot
// proxy. Action endpoints reject the wrong variant with a 400 before
// touching the upstream.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::responses::DeviceResponse;
use crate::state::AppState;
use crate::upstream::{upstream_account, AuthContext};
use vivint_core::{Account, Device, GarageDoorState};

/// Thumbnail readiness polling: up to 6 seconds in half-second steps
/// (13 fetches, 12 sleeps between them).
const SNAPSHOT_ATTEMPTS: u32 = 13;
const SNAPSHOT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
pub struct LockPayload {
    pub locked: bool,
}

#[derive(Debug, Deserialize)]
pub struct GarageDoorPayload {
    pub state: i64,
}

#[derive(Debug, Deserialize)]
pub struct SwitchStatePayload {
    pub state: bool,
}

#[derive(Debug, Deserialize)]
pub struct SwitchLevelPayload {
    pub level: i64,
}

#[derive(Debug, Deserialize)]
pub struct ThermostatSetpointPayload {
    pub cool_setpoint: Option<f64>,
    pub heat_setpoint: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ThermostatModePayload {
    pub mode: i64,
}

#[derive(Debug, Deserialize)]
pub struct ThermostatFanModePayload {
    pub fan_mode: i64,
}

#[derive(Debug, Deserialize)]
pub struct SensorBypassPayload {
    pub bypass: bool,
}

#[derive(Debug, Deserialize)]
pub struct TogglePayload {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// Coordinates of a device within the graph, captured under the lock so
/// upstream calls can happen without holding it.
struct DeviceRef {
    panel_id: i64,
    partition_id: i64,
    device_id: i64,
    type_tag: String,
    is_admin: bool,
}

async fn locate_device(
    account: &Account,
    system_id: i64,
    device_id: i64,
) -> Result<DeviceRef, GatewayError> {
    let graph = account.state().await;
    let system = graph
        .systems
        .iter()
        .find(|s| s.id() == system_id)
        .ok_or_else(|| GatewayError::NotFound(format!("system {system_id} not found")))?;
    for panel in &system.panels {
        if let Some(device) = panel.device(device_id) {
            return Ok(DeviceRef {
                panel_id: panel.id(),
                partition_id: panel.partition_id(),
                device_id,
                type_tag: device.type_tag().to_owned(),
                is_admin: system.is_admin(),
            });
        }
    }
    Err(GatewayError::NotFound(format!(
        "device {device_id} not found in system {system_id}"
    )))
}

async fn device_response(
    account: &Account,
    system_id: i64,
    device_id: i64,
) -> Result<DeviceResponse, GatewayError> {
    let graph = account.state().await;
    let system = graph
        .systems
        .iter()
        .find(|s| s.id() == system_id)
        .ok_or_else(|| GatewayError::NotFound(format!("system {system_id} not found")))?;
    system
        .panels
        .iter()
        .find_map(|panel| panel.device(device_id))
        .map(DeviceResponse::from_device)
        .ok_or_else(|| {
            GatewayError::NotFound(format!("device {device_id} not found in system {system_id}"))
        })
}

/// Run one device action: locate, type-check, call upstream, respond
/// with the device, disconnecting on every path.
async fn device_action<F, Fut>(
    state: &AppState,
    auth: &AuthContext,
    system_id: i64,
    device_id: i64,
    expected: &'static str,
    type_check: fn(&Device) -> bool,
    action: F,
) -> Result<Json<DeviceResponse>, GatewayError>
where
    F: FnOnce(Account, DeviceRef) -> Fut,
    Fut: std::future::Future<Output = Result<(), vivint_api::Error>>,
{
    let (account, _) = upstream_account(state, &auth.username).await?;

    let target = match locate_device(&account, system_id, device_id).await {
        Ok(target) => {
            let matches = {
                let graph = account.state().await;
                graph
                    .systems
                    .iter()
                    .find(|s| s.id() == system_id)
                    .and_then(|s| s.panels.iter().find_map(|p| p.device(device_id)))
                    .is_some_and(type_check)
            };
            if matches {
                Ok(target)
            } else {
                Err(GatewayError::BadRequest(format!(
                    "device {device_id} is not a {expected}"
                )))
            }
        }
        Err(err) => Err(err),
    };

    let result = match target {
        Ok(target) => action(account.clone(), target)
            .await
            .map_err(GatewayError::from_action),
        Err(err) => Err(err),
    };

    let response = match result {
        Ok(()) => device_response(&account, system_id, device_id).await,
        Err(err) => Err(err),
    };
    account.disconnect().await;
    response.map(Json)
}

// ── Listing & details ───────────────────────────────────────────────

/// GET /systems/{system_id}/devices
pub async fn list_devices(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
) -> Result<Json<Vec<DeviceResponse>>, GatewayError> {
    let (account, _) = upstream_account(&state, &auth.username).await?;
    let devices = {
        let graph = account.state().await;
        graph
            .systems
            .iter()
            .find(|s| s.id() == system_id)
            .map(|system| {
                system
                    .panels
                    .iter()
                    .flat_map(|panel| panel.devices.iter())
                    .map(DeviceResponse::from_device)
                    .collect::<Vec<_>>()
            })
    };
    account.disconnect().await;
    devices
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("system {system_id} not found")))
}

/// GET /systems/{system_id}/devices/{device_id}
pub async fn get_device(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    let (account, _) = upstream_account(&state, &auth.username).await?;
    let response = device_response(&account, system_id, device_id).await;
    account.disconnect().await;
    response.map(Json)
}

// ── Actions ─────────────────────────────────────────────────────────

/// POST .../devices/{device_id}/lock
pub async fn set_lock_state(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<LockPayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "door lock",
        |d| d.as_door_lock().is_some(),
        |account, target| async move {
            account
                .api()
                .set_lock_state(
                    target.panel_id,
                    target.partition_id,
                    target.device_id,
                    payload.locked,
                )
                .await
        },
    )
    .await
}

/// POST .../devices/{device_id}/garage-door
pub async fn set_garage_door_state(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<GarageDoorPayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    if GarageDoorState::from_i64(payload.state) == GarageDoorState::Unknown {
        return Err(GatewayError::BadRequest("unknown garage door state".into()));
    }
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "garage door",
        |d| d.as_garage_door().is_some(),
        |account, target| async move {
            account
                .api()
                .set_garage_door_state(
                    target.panel_id,
                    target.partition_id,
                    target.device_id,
                    payload.state,
                )
                .await
        },
    )
    .await
}

/// POST .../devices/{device_id}/switch/state
pub async fn set_switch_state(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<SwitchStatePayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "switch",
        |d| d.as_switch().is_some(),
        |account, target| async move {
            account
                .api()
                .set_switch_state(
                    target.panel_id,
                    target.partition_id,
                    target.device_id,
                    Some(payload.state),
                    None,
                )
                .await
        },
    )
    .await
}

/// POST .../devices/{device_id}/switch/level
pub async fn set_switch_level(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<SwitchLevelPayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "multilevel switch",
        |d| matches!(d, Device::MultilevelSwitch(_)),
        |account, target| async move {
            account
                .api()
                .set_switch_state(
                    target.panel_id,
                    target.partition_id,
                    target.device_id,
                    None,
                    Some(payload.level),
                )
                .await
        },
    )
    .await
}

/// POST .../devices/{device_id}/thermostat/setpoints
pub async fn set_thermostat_setpoints(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<ThermostatSetpointPayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    if payload.cool_setpoint.is_none() && payload.heat_setpoint.is_none() {
        return Err(GatewayError::BadRequest(
            "at least one of cool_setpoint and heat_setpoint is required".into(),
        ));
    }
    let mut fields = Map::new();
    if let Some(cool) = payload.cool_setpoint {
        fields.insert("csp".into(), cool.into());
    }
    if let Some(heat) = payload.heat_setpoint {
        fields.insert("hsp".into(), heat.into());
    }

    thermostat_action(&state, &auth, system_id, device_id, fields).await
}

/// POST .../devices/{device_id}/thermostat/mode
pub async fn set_thermostat_mode(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<ThermostatModePayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    let mut fields = Map::new();
    fields.insert("om".into(), payload.mode.into());
    thermostat_action(&state, &auth, system_id, device_id, fields).await
}

/// POST .../devices/{device_id}/thermostat/fan-mode
pub async fn set_thermostat_fan_mode(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<ThermostatFanModePayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    let mut fields = Map::new();
    fields.insert("fm".into(), payload.fan_mode.into());
    thermostat_action(&state, &auth, system_id, device_id, fields).await
}

async fn thermostat_action(
    state: &AppState,
    auth: &AuthContext,
    system_id: i64,
    device_id: i64,
    fields: Map<String, Value>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        state,
        auth,
        system_id,
        device_id,
        "thermostat",
        |d| d.as_thermostat().is_some(),
        |account, target| async move {
            account
                .api()
                .set_thermostat_state(
                    target.panel_id,
                    target.partition_id,
                    target.device_id,
                    fields,
                )
                .await
        },
    )
    .await
}

/// POST .../devices/{device_id}/sensor/bypass
pub async fn set_sensor_bypass(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<SensorBypassPayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "wireless sensor",
        |d| d.as_wireless_sensor().is_some(),
        |account, target| async move {
            account
                .api()
                .set_sensor_state(
                    target.panel_id,
                    target.partition_id,
                    target.device_id,
                    payload.bypass,
                )
                .await
        },
    )
    .await
}

// ── Camera actions ──────────────────────────────────────────────────

/// POST .../devices/{device_id}/camera/request-snapshot
pub async fn request_camera_snapshot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "camera",
        |d| d.as_camera().is_some(),
        |account, target| async move {
            account
                .api()
                .request_camera_thumbnail(
                    target.panel_id,
                    target.partition_id,
                    target.device_id,
                )
                .await
        },
    )
    .await
}

/// POST .../devices/{device_id}/camera/privacy
pub async fn set_camera_privacy(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<TogglePayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    camera_admin_action(&state, &auth, system_id, device_id, move |account, target| {
        Box::pin(async move {
            account
                .api()
                .set_camera_privacy_mode(target.panel_id, target.device_id, payload.enabled)
                .await
        })
    })
    .await
}

/// POST .../devices/{device_id}/camera/deter
pub async fn set_camera_deter(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<TogglePayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    camera_admin_action(&state, &auth, system_id, device_id, move |account, target| {
        Box::pin(async move {
            account
                .api()
                .set_camera_deter_mode(target.panel_id, target.device_id, payload.enabled)
                .await
        })
    })
    .await
}

/// POST .../devices/{device_id}/camera/chime-extender
pub async fn set_camera_chime_extender(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Json(payload): Json<TogglePayload>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "camera",
        |d| d.as_camera().is_some(),
        |account, target| async move {
            account
                .api()
                .set_camera_as_doorbell_chime_extender(
                    target.panel_id,
                    target.device_id,
                    payload.enabled,
                )
                .await
        },
    )
    .await
}

/// POST .../devices/{device_id}/camera/reboot
pub async fn reboot_camera(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
) -> Result<Json<DeviceResponse>, GatewayError> {
    device_action(
        &state,
        &auth,
        system_id,
        device_id,
        "camera",
        |d| d.as_camera().is_some(),
        |account, target| async move {
            account
                .api()
                .reboot_camera(target.panel_id, target.device_id, &target.type_tag)
                .await
        },
    )
    .await
}

type BoxedActionFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), vivint_api::Error>> + Send>>;

/// Privacy and deter modes are admin-gated upstream; refuse early for
/// non-admin users.
async fn camera_admin_action(
    state: &AppState,
    auth: &AuthContext,
    system_id: i64,
    device_id: i64,
    action: impl FnOnce(Account, DeviceRef) -> BoxedActionFuture,
) -> Result<Json<DeviceResponse>, GatewayError> {
    let (account, _) = upstream_account(state, &auth.username).await?;

    let result = match locate_device(&account, system_id, device_id).await {
        Ok(target) if !target.is_admin => Err(GatewayError::BadRequest(
            "camera modes require an admin user".into(),
        )),
        Ok(target) => {
            let is_camera = {
                let graph = account.state().await;
                graph
                    .systems
                    .iter()
                    .find(|s| s.id() == system_id)
                    .and_then(|s| s.panels.iter().find_map(|p| p.device(device_id)))
                    .is_some_and(|d| d.as_camera().is_some())
            };
            if is_camera {
                action(account.clone(), target)
                    .await
                    .map_err(GatewayError::from_action)
            } else {
                Err(GatewayError::BadRequest(format!(
                    "device {device_id} is not a camera"
                )))
            }
        }
        Err(err) => Err(err),
    };

    let response = match result {
        Ok(()) => device_response(&account, system_id, device_id).await,
        Err(err) => Err(err),
    };
    account.disconnect().await;
    response.map(Json)
}

// ── Snapshot proxy ──────────────────────────────────────────────────

/// GET .../devices/{device_id}/snapshot
///
/// Optionally requests a fresh thumbnail first, polls the signed URL
/// until the upstream answers with a redirect (≤ 6 s), then proxies the
/// JPEG bytes.
pub async fn get_camera_snapshot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((system_id, device_id)): Path<(i64, i64)>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Response, GatewayError> {
    let (account, _) = upstream_account(&state, &auth.username).await?;
    let result = snapshot_inner(&state, &account, system_id, device_id, query.refresh).await;
    account.disconnect().await;
    result
}

async fn snapshot_inner(
    state: &AppState,
    account: &Account,
    system_id: i64,
    device_id: i64,
    refresh: bool,
) -> Result<Response, GatewayError> {
    let target = locate_device(account, system_id, device_id).await?;
    let thumbnail_date = {
        let graph = account.state().await;
        let device = graph
            .systems
            .iter()
            .find(|s| s.id() == system_id)
            .and_then(|s| s.panels.iter().find_map(|p| p.device(device_id)))
            .ok_or_else(|| GatewayError::NotFound("device not found".into()))?;
        let camera = device
            .as_camera()
            .ok_or_else(|| GatewayError::BadRequest("device is not a camera".into()))?;
        camera.thumbnail_date().map(str::to_owned)
    };

    if refresh {
        account
            .api()
            .request_camera_thumbnail(target.panel_id, target.partition_id, target.device_id)
            .await
            .map_err(GatewayError::from_action)?;
    }

    let timestamp = thumbnail_date
        .as_deref()
        .and_then(thumbnail_timestamp_millis)
        .ok_or_else(|| GatewayError::NotFound("no thumbnail available yet".into()))?;

    let mut url = None;
    for attempt in 0..SNAPSHOT_ATTEMPTS {
        url = account
            .api()
            .get_camera_thumbnail_url(
                target.panel_id,
                target.partition_id,
                target.device_id,
                timestamp,
            )
            .await
            .map_err(GatewayError::from_action)?;
        if url.is_some() {
            break;
        }
        if attempt + 1 < SNAPSHOT_ATTEMPTS {
            tokio::time::sleep(SNAPSHOT_POLL_INTERVAL).await;
        }
    }
    let url = url.ok_or_else(|| GatewayError::NotFound("snapshot URL unavailable".into()))?;

    let image = state
        .http
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|err| GatewayError::Upstream(format!("failed to fetch snapshot: {err}")))?;
    let bytes = image
        .bytes()
        .await
        .map_err(|err| GatewayError::Upstream(format!("failed to read snapshot: {err}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            // Browsers must refetch; the signed URL rotates.
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    )
        .into_response())
}

/// The thumbnail date sometimes arrives with a trailing `Z` and
/// sometimes without; either way it is UTC millis.
fn thumbnail_timestamp_millis(date: &str) -> Option<i64> {
    let trimmed = date.trim_end_matches('Z');
    let parsed = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(parsed.and_utc().timestamp_millis())
}
