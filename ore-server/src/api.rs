//! REST API and SSE routes

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use ore_core::model::{ClassCombinationKey, CombinationKey, DriverKey};
use ore_core::persist::PersistError;
use ore_core::projection;
use ore_core::ranked::{profile_or_default, RankedProfile};
use ore_core::sampler::LapPointsCombination;
use ore_core::units::{Liters, Seconds};
use ore_core::RaceLength;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::convert::Infallible;
use thiserror::Error;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/adapters", get(list_adapters))
        .route("/api/events/stream", get(event_stream))
        .route("/api/drivers", get(list_drivers))
        .route("/api/combinations/:layout/:vehicle", get(get_combination))
        .route("/api/profiles/:layout/:class", get(get_profile))
        .route("/api/race/estimate", get(race_estimate))
        .route("/api/store/flush", post(flush_store))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("no telemetry received yet")]
    NoTelemetry,

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoTelemetry => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Persist(e) => {
                tracing::error!("Store error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// === Adapter Endpoints ===

#[derive(Serialize)]
struct AdapterInfo {
    key: String,
    name: String,
    detected: bool,
    active: bool,
}

async fn list_adapters(State(state): State<AppState>) -> Json<Vec<AdapterInfo>> {
    let adapters = state.adapters.read().await;
    let active_key = state.active_adapter.read().await;

    let info: Vec<AdapterInfo> = adapters
        .iter()
        .map(|adapter| AdapterInfo {
            key: adapter.key().to_string(),
            name: adapter.name().to_string(),
            detected: adapter.detect(),
            active: adapter.is_active() || active_key.as_deref() == Some(adapter.key()),
        })
        .collect();

    Json(info)
}

// === Event Stream Endpoint ===

#[derive(Deserialize)]
struct StreamQuery {
    /// Comma-separated event names, e.g. `new_lap,position_jump`
    events: Option<String>,
}

fn parse_event_filter(events: Option<String>) -> Option<HashSet<String>> {
    let names: HashSet<String> = events?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!names.is_empty()).then_some(names)
}

async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    let filter = parse_event_filter(query.events);

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let filter = filter.clone();
        async move {
            match result {
                Ok(log) => {
                    if filter.as_ref().is_some_and(|f| !f.contains(log.name())) {
                        return None;
                    }
                    match serde_json::to_string(&log) {
                        Ok(json) => Some(Ok(Event::default().event(log.name()).data(json))),
                        Err(e) => {
                            tracing::error!("Failed to serialize event: {}", e);
                            None
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Broadcast stream error: {}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// === Driver Endpoints ===

#[derive(Serialize)]
struct DriverInfo {
    key: DriverKey,
    is_main: bool,
    completed_laps: Option<u32>,
    in_pitlane: Option<bool>,
    samples: usize,
    ranked: RankedProfile,
}

async fn list_drivers(State(state): State<AppState>) -> Json<Vec<DriverInfo>> {
    let provider = state.rankings.as_deref();
    let engine = state.engine.lock().await;

    let mut drivers: Vec<DriverInfo> = engine
        .registry()
        .iter()
        .map(|driver| DriverInfo {
            key: driver.key().clone(),
            is_main: driver.is_main(),
            completed_laps: driver.completed_laps(),
            in_pitlane: driver.in_pitlane(),
            samples: driver.samples().len(),
            ranked: profile_or_default(provider, driver.key().user_id),
        })
        .collect();
    drivers.sort_by(|a, b| a.key.name.cmp(&b.key.name));

    Json(drivers)
}

// === Statistics Endpoints ===

#[derive(Serialize)]
struct CombinationInfo {
    #[serde(flatten)]
    key: CombinationKey,
    average_fuel: Option<Liters>,
    average_lap_time: Option<Seconds>,
    best_lap_time: Option<Seconds>,
    average_tire_wear: Option<[f32; 4]>,
    fuel_samples: usize,
    lap_times: usize,
}

async fn get_combination(
    State(state): State<AppState>,
    Path((layout_id, vehicle_id)): Path<(i32, i32)>,
) -> Result<Json<CombinationInfo>, ApiError> {
    let key = CombinationKey {
        layout_id,
        vehicle_id,
    };
    let engine = state.engine.lock().await;
    let combination = engine
        .stats()
        .combination(&key)
        .ok_or_else(|| ApiError::NotFound(format!("combination {layout_id}/{vehicle_id}")))?;

    Ok(Json(CombinationInfo {
        key,
        average_fuel: combination.average_fuel(),
        average_lap_time: combination.average_lap_time(),
        best_lap_time: combination.best_lap_time(),
        average_tire_wear: combination.average_tire_wear(),
        fuel_samples: combination.fuel_samples().count(),
        lap_times: combination.lap_times().count(),
    }))
}

#[derive(Serialize)]
struct ProfileInfo {
    #[serde(flatten)]
    key: ClassCombinationKey,
    #[serde(flatten)]
    profile: LapPointsCombination,
}

async fn get_profile(
    State(state): State<AppState>,
    Path((layout_id, class_id)): Path<(i32, i32)>,
) -> Result<Json<ProfileInfo>, ApiError> {
    let key = ClassCombinationKey {
        layout_id,
        class_id,
    };
    let engine = state.engine.lock().await;
    let profile = engine
        .sampler()
        .profile(&key)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("profile {layout_id}/{class_id}")))?;

    Ok(Json(ProfileInfo { key, profile }))
}

#[derive(Serialize)]
struct RaceEstimate {
    #[serde(flatten)]
    length: RaceLength,
    fuel_to_finish: Option<Liters>,
}

async fn race_estimate(State(state): State<AppState>) -> Result<Json<RaceEstimate>, ApiError> {
    let frame = state
        .latest_frame
        .read()
        .await
        .clone()
        .ok_or(ApiError::NoTelemetry)?;

    let engine = state.engine.lock().await;
    let combination = frame
        .combination_key()
        .and_then(|key| engine.stats().combination(&key));
    let length = projection::estimate_laps(&frame, combination)
        .ok_or_else(|| ApiError::NotFound("race length estimate".to_string()))?;

    Ok(Json(RaceEstimate {
        length,
        fuel_to_finish: projection::fuel_to_finish(&frame, combination),
    }))
}

// === Store Endpoint ===

async fn flush_store(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.flush_tables().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_filter_parsing() {
        assert!(parse_event_filter(None).is_none());
        assert!(parse_event_filter(Some(" , ".to_string())).is_none());

        let filter = parse_event_filter(Some("new_lap, position_jump,".to_string())).unwrap();
        assert_eq!(filter.len(), 2);
        assert!(filter.contains("new_lap"));
        assert!(filter.contains("position_jump"));
    }

    #[test]
    fn test_error_status_codes() {
        let not_found = ApiError::NotFound("profile 1/2".to_string()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::NoTelemetry.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
