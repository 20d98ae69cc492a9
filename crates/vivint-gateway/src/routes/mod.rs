pub mod auth;
pub mod devices;
pub mod events;
pub mod systems;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::AppState;

/// Assemble the full local surface.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        .route("/", get(root))
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/verify-mfa", post(auth::verify_mfa))
        .route("/auth/refresh-token", post(auth::refresh_token))
        // Systems & panels
        .route("/systems", get(systems::list_systems))
        .route("/systems/{system_id}", get(systems::get_system))
        .route("/systems/{system_id}/panel", get(systems::get_panel))
        .route("/systems/{system_id}/panel/arm-stay", post(systems::arm_stay))
        .route("/systems/{system_id}/panel/arm-away", post(systems::arm_away))
        .route("/systems/{system_id}/panel/disarm", post(systems::disarm))
        .route(
            "/systems/{system_id}/panel/trigger-emergency",
            post(systems::trigger_emergency),
        )
        .route("/systems/{system_id}/panel/reboot", post(systems::reboot_panel))
        // Devices
        .route("/systems/{system_id}/devices", get(devices::list_devices))
        .route(
            "/systems/{system_id}/devices/{device_id}",
            get(devices::get_device),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/lock",
            post(devices::set_lock_state),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/garage-door",
            post(devices::set_garage_door_state),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/switch/state",
            post(devices::set_switch_state),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/switch/level",
            post(devices::set_switch_level),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/thermostat/setpoints",
            post(devices::set_thermostat_setpoints),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/thermostat/mode",
            post(devices::set_thermostat_mode),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/thermostat/fan-mode",
            post(devices::set_thermostat_fan_mode),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/sensor/bypass",
            post(devices::set_sensor_bypass),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/camera/request-snapshot",
            post(devices::request_camera_snapshot),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/camera/privacy",
            post(devices::set_camera_privacy),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/camera/deter",
            post(devices::set_camera_deter),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/camera/chime-extender",
            post(devices::set_camera_chime_extender),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/camera/reboot",
            post(devices::reboot_camera),
        )
        .route(
            "/systems/{system_id}/devices/{device_id}/snapshot",
            get(devices::get_camera_snapshot),
        )
        // Realtime relay
        .route("/ws/events", get(events::ws_events))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = state.settings.origins();
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Vivint gateway. See /systems and /ws/events."
    }))
}
