// REST endpoint methods for the Sky API.
//
// Device mutations all go through the same generic PUT protocol: a
// partition-scoped path plus a small JSON body naming the device id and
// the field being changed.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::{Body, SkyClient};
use crate::error::Error;
use crate::models::{AuthUserData, PanelCredentialsData, SystemData};

/// Zone bypass values for `set_sensor_state`.
const ZONE_UNBYPASSED: i64 = 0;
const ZONE_MANUALLY_BYPASSED: i64 = 2;

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json;charset=utf-8"),
    );
    headers
}

fn accept_json() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("application/json"));
    headers
}

impl SkyClient {
    /// Fetch the auth-user payload: the session's users and the systems
    /// they can reach.
    pub async fn get_authuser_data(&self) -> Result<AuthUserData, Error> {
        let response = self.get("authuser").await?;
        decode("authuser", response)
    }

    /// Fetch the full raw payload for one system.
    pub async fn get_system_data(&self, panel_id: i64) -> Result<SystemData, Error> {
        let response = self
            .get_with(
                &format!("systems/{panel_id}"),
                Some(accept_json()),
                &[("includerules", "false".to_owned())],
            )
            .await?;
        decode("system", response)
    }

    /// Fetch the raw payload for a single device, wrapped in the same
    /// system envelope the systems endpoint uses.
    pub async fn get_device_data(&self, panel_id: i64, device_id: i64) -> Result<SystemData, Error> {
        let response = self
            .get_with(
                &format!("system/{panel_id}/device/{device_id}"),
                Some(accept_json()),
                &[],
            )
            .await?;
        decode("device", response)
    }

    /// Fetch (panel-local) credentials for the physical panel.
    pub async fn get_panel_credentials(
        &self,
        panel_id: i64,
    ) -> Result<PanelCredentialsData, Error> {
        let response = self.get(&format!("panel-login/{panel_id}")).await?;
        decode("panel credentials", response)
    }

    // ── Panel actions ────────────────────────────────────────────────

    /// Set the armed state for a partition.
    pub async fn set_alarm_state(
        &self,
        panel_id: i64,
        partition_id: i64,
        state: i64,
    ) -> Result<(), Error> {
        debug!(panel_id, partition_id, state, "setting armed state");
        self.put(
            &format!("{panel_id}/{partition_id}/armedstates"),
            Some(json_headers()),
            Some(Body::Json(json!({
                "system": panel_id,
                "partitionId": partition_id,
                "armState": state,
                "forceArm": false,
            }))),
        )
        .await?;
        Ok(())
    }

    /// Trigger an alarm on a partition.
    pub async fn trigger_alarm(&self, panel_id: i64, partition_id: i64) -> Result<(), Error> {
        self.post(&format!("{panel_id}/{partition_id}/alarm"), &[], None)
            .await?;
        Ok(())
    }

    /// Reboot a panel.
    pub async fn reboot_panel(&self, panel_id: i64) -> Result<(), Error> {
        self.post(&format!("systems/{panel_id}/reboot-panel"), &[], None)
            .await?;
        Ok(())
    }

    // ── Device actions ───────────────────────────────────────────────

    /// Lock or unlock a door lock.
    pub async fn set_lock_state(
        &self,
        panel_id: i64,
        partition_id: i64,
        device_id: i64,
        locked: bool,
    ) -> Result<(), Error> {
        self.put(
            &format!("{panel_id}/{partition_id}/locks/{device_id}"),
            Some(json_headers()),
            Some(Body::Json(json!({ "s": locked, "_id": device_id }))),
        )
        .await?;
        Ok(())
    }

    /// Open or close a garage door (`state` is a GarageDoorState value).
    pub async fn set_garage_door_state(
        &self,
        panel_id: i64,
        partition_id: i64,
        device_id: i64,
        state: i64,
    ) -> Result<(), Error> {
        self.put(
            &format!("{panel_id}/{partition_id}/door/{device_id}"),
            Some(json_headers()),
            Some(Body::Json(json!({ "s": state, "_id": device_id }))),
        )
        .await?;
        Ok(())
    }

    /// Bypass or unbypass a sensor.
    pub async fn set_sensor_state(
        &self,
        panel_id: i64,
        partition_id: i64,
        device_id: i64,
        bypass: bool,
    ) -> Result<(), Error> {
        let value = if bypass {
            ZONE_MANUALLY_BYPASSED
        } else {
            ZONE_UNBYPASSED
        };
        self.put(
            &format!("{panel_id}/{partition_id}/sensors/{device_id}"),
            Some(json_headers()),
            Some(Body::Json(json!({ "b": value, "_id": device_id }))),
        )
        .await?;
        Ok(())
    }

    /// Set a switch's on/off state or dimmer level. Exactly one of `on`
    /// and `level` must be given; levels are clamped to 0..=100 by the
    /// upstream contract, so out-of-range values are rejected here.
    pub async fn set_switch_state(
        &self,
        panel_id: i64,
        partition_id: i64,
        device_id: i64,
        on: Option<bool>,
        level: Option<i64>,
    ) -> Result<(), Error> {
        let body = match (on, level) {
            (None, None) => {
                return Err(Error::Api {
                    message: r#"either "on" or "level" must be provided"#.into(),
                })
            }
            (_, Some(level)) if !(0..=100).contains(&level) => {
                return Err(Error::Api {
                    message: r#"the value for "level" must be between 0 and 100"#.into(),
                })
            }
            (_, Some(level)) => json!({ "_id": device_id, "val": level }),
            (Some(on), None) => json!({ "_id": device_id, "s": on }),
        };

        self.put(
            &format!("{panel_id}/{partition_id}/switches/{device_id}"),
            Some(json_headers()),
            Some(Body::Json(body)),
        )
        .await?;
        Ok(())
    }

    /// Set arbitrary thermostat fields (set points, modes, fan).
    pub async fn set_thermostat_state(
        &self,
        panel_id: i64,
        partition_id: i64,
        device_id: i64,
        fields: Map<String, Value>,
    ) -> Result<(), Error> {
        self.put(
            &format!("{panel_id}/{partition_id}/thermostats/{device_id}"),
            Some(json_headers()),
            Some(Body::Json(Value::Object(fields))),
        )
        .await?;
        Ok(())
    }

    // ── Camera thumbnails ────────────────────────────────────────────

    /// Ask the camera to capture a fresh thumbnail. Completion is
    /// signalled out-of-band via the realtime channel.
    pub async fn request_camera_thumbnail(
        &self,
        panel_id: i64,
        partition_id: i64,
        device_id: i64,
    ) -> Result<(), Error> {
        self.get(&format!(
            "{panel_id}/{partition_id}/{device_id}/request-camera-thumbnail"
        ))
        .await?;
        Ok(())
    }

    /// Resolve the signed URL of the thumbnail captured at
    /// `thumbnail_timestamp` (millis). The endpoint answers 302; the
    /// transport layer hands back its Location instead of following it.
    pub async fn get_camera_thumbnail_url(
        &self,
        panel_id: i64,
        partition_id: i64,
        device_id: i64,
        thumbnail_timestamp: i64,
    ) -> Result<Option<String>, Error> {
        let response = self
            .get_with(
                &format!("{panel_id}/{partition_id}/{device_id}/camera-thumbnail"),
                None,
                &[("time", thumbnail_timestamp.to_string())],
            )
            .await;

        match response {
            Ok(value) => Ok(value
                .get("location")
                .and_then(Value::as_str)
                .map(str::to_owned)),
            // A missing thumbnail surfaces as a business error, not a
            // transport failure.
            Err(Error::Api { message }) => {
                debug!(device_id, %message, "no thumbnail available");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(what: &str, value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: format!("invalid {what} payload: {e}"),
        body: value.to_string(),
    })
}
