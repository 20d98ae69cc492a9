// ── /systems routes ──
//
// Listing, details, and panel actions. Each handler builds a
// single-use upstream account, reads or acts, and disconnects on every
// path.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::responses::{PanelResponse, SystemResponse};
use crate::state::AppState;
use crate::upstream::{upstream_account, AuthContext};
use vivint_core::{Account, ArmedState, EmergencyType};

#[derive(Debug, Deserialize)]
pub struct DisarmPayload {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct TriggerEmergencyPayload {
    pub emergency_type: i64,
}

/// GET /systems
pub async fn list_systems(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<SystemResponse>>, GatewayError> {
    let (account, _) = upstream_account(&state, &auth.username).await?;
    let systems = {
        let graph = account.state().await;
        graph.systems.iter().map(SystemResponse::from_system).collect()
    };
    account.disconnect().await;
    Ok(Json(systems))
}

/// GET /systems/{system_id}
pub async fn get_system(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
) -> Result<Json<SystemResponse>, GatewayError> {
    let (account, _) = upstream_account(&state, &auth.username).await?;
    let response = {
        let graph = account.state().await;
        graph
            .systems
            .iter()
            .find(|s| s.id() == system_id)
            .map(SystemResponse::from_system)
    };
    account.disconnect().await;
    response.map(Json).ok_or_else(|| system_not_found(system_id))
}

/// GET /systems/{system_id}/panel
pub async fn get_panel(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
) -> Result<Json<PanelResponse>, GatewayError> {
    let (account, _) = upstream_account(&state, &auth.username).await?;
    let response = panel_response(&account, system_id).await;
    account.disconnect().await;
    response.map(Json)
}

/// POST /systems/{system_id}/panel/arm-stay
pub async fn arm_stay(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
) -> Result<Json<PanelResponse>, GatewayError> {
    set_armed_state(&state, &auth, system_id, ArmedState::ArmedStay).await
}

/// POST /systems/{system_id}/panel/arm-away
pub async fn arm_away(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
) -> Result<Json<PanelResponse>, GatewayError> {
    set_armed_state(&state, &auth, system_id, ArmedState::ArmedAway).await
}

/// POST /systems/{system_id}/panel/disarm
pub async fn disarm(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
    Json(payload): Json<DisarmPayload>,
) -> Result<Json<PanelResponse>, GatewayError> {
    if payload.pin.trim().is_empty() {
        return Err(GatewayError::BadRequest("a PIN is required to disarm".into()));
    }
    set_armed_state(&state, &auth, system_id, ArmedState::Disarmed).await
}

/// POST /systems/{system_id}/panel/trigger-emergency
pub async fn trigger_emergency(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
    Json(payload): Json<TriggerEmergencyPayload>,
) -> Result<Json<Value>, GatewayError> {
    let emergency = EmergencyType::from_i64(payload.emergency_type);
    if emergency == EmergencyType::Unknown {
        return Err(GatewayError::BadRequest("unknown emergency type".into()));
    }

    let (account, _) = upstream_account(&state, &auth.username).await?;
    let result = match locate_panel(&account, system_id).await {
        Ok((panel_id, partition_id)) => account
            .api()
            .trigger_alarm(panel_id, partition_id)
            .await
            .map_err(GatewayError::from_action),
        Err(err) => Err(err),
    };
    account.disconnect().await;
    result?;

    Ok(Json(json!({
        "message": format!("emergency alarm ({emergency:?}) triggered")
    })))
}

/// POST /systems/{system_id}/panel/reboot
pub async fn reboot_panel(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(system_id): Path<i64>,
) -> Result<Json<Value>, GatewayError> {
    let (account, _) = upstream_account(&state, &auth.username).await?;

    let result = {
        let graph = account.state().await;
        match graph.systems.iter().find(|s| s.id() == system_id) {
            Some(system) if !system.is_admin() => Err(GatewayError::BadRequest(
                "cannot reboot panel: user is not an admin".into(),
            )),
            Some(_) => Ok(()),
            None => Err(system_not_found(system_id)),
        }
    };
    let result = match result {
        Ok(()) => account
            .api()
            .reboot_panel(system_id)
            .await
            .map_err(GatewayError::from_action),
        Err(err) => Err(err),
    };
    account.disconnect().await;
    result?;

    Ok(Json(json!({ "message": "panel reboot command sent" })))
}

// ── Helpers ─────────────────────────────────────────────────────────

fn system_not_found(system_id: i64) -> GatewayError {
    GatewayError::NotFound(format!("system {system_id} not found"))
}

async fn locate_panel(account: &Account, system_id: i64) -> Result<(i64, i64), GatewayError> {
    let graph = account.state().await;
    let system = graph
        .systems
        .iter()
        .find(|s| s.id() == system_id)
        .ok_or_else(|| system_not_found(system_id))?;
    let panel = system
        .primary_panel()
        .ok_or_else(|| GatewayError::NotFound(format!("no panel for system {system_id}")))?;
    Ok((panel.id(), panel.partition_id()))
}

async fn panel_response(account: &Account, system_id: i64) -> Result<PanelResponse, GatewayError> {
    let graph = account.state().await;
    let system = graph
        .systems
        .iter()
        .find(|s| s.id() == system_id)
        .ok_or_else(|| system_not_found(system_id))?;
    let panel = system
        .primary_panel()
        .ok_or_else(|| GatewayError::NotFound(format!("no panel for system {system_id}")))?;
    Ok(PanelResponse::from_panel(system, panel))
}

async fn set_armed_state(
    state: &AppState,
    auth: &AuthContext,
    system_id: i64,
    armed_state: ArmedState,
) -> Result<Json<PanelResponse>, GatewayError> {
    let (account, _) = upstream_account(state, &auth.username).await?;

    let result = match locate_panel(&account, system_id).await {
        Ok((panel_id, partition_id)) => account
            .api()
            .set_alarm_state(panel_id, partition_id, armed_state.value())
            .await
            .map_err(GatewayError::from_action),
        Err(err) => Err(err),
    };
    let response = match result {
        Ok(()) => panel_response(&account, system_id).await,
        Err(err) => Err(err),
    };
    account.disconnect().await;
    response.map(Json)
}
