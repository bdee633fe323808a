//! Device registration and listing (§6)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::middleware::AuthenticatedAccount;
use super::ApiState;
use crate::db::DeviceKind;
use crate::{Error, Result};

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/devices", post(create_device).get(list_devices))
}

#[derive(Deserialize)]
struct CreateDeviceRequest {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct DeviceResponse {
    id: i64,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    online: bool,
    created_at: DateTime<Utc>,
}

async fn create_device(
    State(state): State<Arc<ApiState>>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceResponse>)> {
    let kind = parse_kind(&body.kind)?;
    let device = state.devices.create(account_id, &body.name, kind)?;

    Ok((
        StatusCode::CREATED,
        Json(DeviceResponse {
            id: device.id,
            name: device.name,
            kind: device.kind.as_str().to_string(),
            online: false,
            created_at: device.created_at,
        }),
    ))
}

async fn list_devices(
    State(state): State<Arc<ApiState>>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
) -> Result<Json<Vec<DeviceResponse>>> {
    let devices = state.devices.list_by_account(account_id)?;
    let response = devices
        .into_iter()
        .map(|device| DeviceResponse {
            online: state.registry.lookup(device.id).is_some(),
            id: device.id,
            name: device.name,
            kind: device.kind.as_str().to_string(),
            created_at: device.created_at,
        })
        .collect();
    Ok(Json(response))
}

fn parse_kind(raw: &str) -> Result<DeviceKind> {
    match raw {
        "host" => Ok(DeviceKind::Host),
        "client" => Ok(DeviceKind::Client),
        other => Err(Error::BadRequest(format!("unknown device type: {other}"))),
    }
}
