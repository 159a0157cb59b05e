//! services/wakeup/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::driver::ControlError;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{Duration, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};
use wakeup_core::{
    domain::{
        parse_time_of_day, Alarm, AlarmUpdate, FeedKind, FeedOptions, FeedSpec, NewAlarm,
        RepeatDays,
    },
    error::AlarmError,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_alarms_handler,
        create_alarm_handler,
        get_alarm_handler,
        update_alarm_handler,
        delete_alarm_handler,
        enable_alarm_handler,
        disable_alarm_handler,
        toggle_alarm_handler,
        snooze_alarm_handler,
        test_alarm_handler,
        playback_status_handler,
        stop_playback_handler,
        snooze_playback_handler,
    ),
    components(
        schemas(
            AlarmView,
            CreateAlarmRequest,
            UpdateAlarmRequest,
            PlaybackStatus,
            StopResponse,
            SnoozeResponse,
            ErrorBody
        )
    ),
    tags(
        (name = "WakeUp API", description = "Manage alarms and control the alarm that is sounding.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// An alarm as shown to API clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlarmView {
    pub id: String,
    /// `HH:MM:SS`
    pub time: String,
    pub label: String,
    /// Monday = 0 .. Sunday = 6; empty for a one-time alarm.
    pub repeat_days: Vec<u8>,
    /// `One-time` or e.g. `Mon, Wed, Fri`.
    pub repeat_summary: String,
    pub enabled: bool,
    pub is_snoozing: bool,
    /// RFC 3339 snooze deadline.
    pub snooze_until: Option<String>,
    pub feed_type: String,
    #[schema(value_type = Object)]
    pub feed_options: FeedOptions,
    pub summary: String,
}

impl From<&Alarm> for AlarmView {
    fn from(alarm: &Alarm) -> Self {
        Self {
            id: alarm.id.clone(),
            time: alarm.time_of_day.format("%H:%M:%S").to_string(),
            label: alarm.label.clone(),
            repeat_days: alarm.repeat_days.to_vec(),
            repeat_summary: alarm.repeat_days.to_string(),
            enabled: alarm.is_enabled(),
            is_snoozing: alarm.is_snoozing(),
            snooze_until: alarm.snooze_until().map(|until| until.to_rfc3339()),
            feed_type: alarm.feed.kind.to_string(),
            feed_options: alarm.feed.options.clone(),
            summary: alarm.to_string(),
        }
    }
}

/// The payload for creating an alarm.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAlarmRequest {
    /// Generated when omitted.
    pub id: Option<String>,
    /// `HH:MM` or `HH:MM:SS`
    pub time: String,
    pub label: Option<String>,
    pub repeat_days: Option<Vec<i64>>,
    pub enabled: Option<bool>,
    /// `daily_news` (default), `topic_facts` or `custom_prompt`.
    pub feed_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub feed_options: Option<FeedOptions>,
}

impl CreateAlarmRequest {
    fn into_new_alarm(self) -> Result<NewAlarm, AlarmError> {
        let time_of_day = parse_time_of_day(&self.time)?;
        let repeat_days = RepeatDays::new(self.repeat_days.unwrap_or_default())?;
        let label = self
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "Alarm".to_string());
        let feed = FeedSpec::new(
            self.feed_type
                .map(FeedKind::from)
                .unwrap_or_default(),
            self.feed_options.unwrap_or_default(),
        );

        let mut new = NewAlarm::new(time_of_day, label)
            .repeating(repeat_days)
            .enabled(self.enabled.unwrap_or(true))
            .with_feed(feed);
        if let Some(id) = self.id.filter(|id| !id.trim().is_empty()) {
            new = new.with_id(id.trim());
        }
        Ok(new)
    }
}

/// A partial update; omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAlarmRequest {
    pub time: Option<String>,
    pub label: Option<String>,
    pub repeat_days: Option<Vec<i64>>,
    pub enabled: Option<bool>,
    pub feed_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub feed_options: Option<FeedOptions>,
}

impl UpdateAlarmRequest {
    fn into_update(self) -> Result<AlarmUpdate, AlarmError> {
        Ok(AlarmUpdate {
            time_of_day: self.time.as_deref().map(parse_time_of_day).transpose()?,
            label: self.label,
            repeat_days: self.repeat_days.map(RepeatDays::new).transpose()?,
            enabled: self.enabled,
            feed_kind: self.feed_type.map(FeedKind::from),
            feed_options: self.feed_options,
        })
    }
}

/// Snooze length; the configured default applies when omitted.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SnoozeQuery {
    pub minutes: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlaybackStatus {
    pub playing: bool,
    /// Ids of alarms that fired and have not finished sounding.
    pub sounding: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StopResponse {
    pub was_playing: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnoozeResponse {
    /// Labels of the alarms snoozed; empty when nothing was sounding.
    pub snoozed: Vec<String>,
    pub minutes: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// The error half of every handler result.
pub type ApiFailure = (StatusCode, Json<ErrorBody>);

fn failure(status: StatusCode, message: impl Into<String>) -> ApiFailure {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn alarm_failure(e: AlarmError) -> ApiFailure {
    let status = match &e {
        AlarmError::NotFound(_) => StatusCode::NOT_FOUND,
        AlarmError::Conflict(_) | AlarmError::InvalidState(_) => StatusCode::CONFLICT,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    failure(status, e.to_string())
}

fn snooze_minutes(app_state: &AppState, query: &SnoozeQuery) -> Result<u32, ApiFailure> {
    match query.minutes {
        Some(0) => Err(failure(
            StatusCode::BAD_REQUEST,
            "Snooze length must be at least one minute",
        )),
        Some(minutes) => Ok(minutes),
        None => Ok(app_state.config.default_snooze_minutes),
    }
}

//=========================================================================================
// Alarm Handlers
//=========================================================================================

/// List all alarms, ordered by time of day.
#[utoipa::path(
    get,
    path = "/alarms",
    responses((status = 200, description = "All alarms", body = [AlarmView]))
)]
pub async fn list_alarms_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let alarms = app_state.manager.list_sorted().await;
    Json(alarms.iter().map(AlarmView::from).collect::<Vec<_>>())
}

/// Create an alarm.
#[utoipa::path(
    post,
    path = "/alarms",
    request_body = CreateAlarmRequest,
    responses(
        (status = 201, description = "Alarm created", body = AlarmView),
        (status = 400, description = "Invalid time, repeat day or feed", body = ErrorBody),
        (status = 409, description = "An alarm with this id already exists", body = ErrorBody)
    )
)]
pub async fn create_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateAlarmRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    let new = payload.into_new_alarm().map_err(alarm_failure)?;
    let alarm = app_state.manager.create(new).await.map_err(alarm_failure)?;
    Ok((StatusCode::CREATED, Json(AlarmView::from(&alarm))))
}

/// Get one alarm.
#[utoipa::path(
    get,
    path = "/alarms/{id}",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 200, description = "The alarm", body = AlarmView),
        (status = 404, description = "No such alarm", body = ErrorBody)
    )
)]
pub async fn get_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlarmView>, ApiFailure> {
    let alarm = app_state.manager.get(&id).await.map_err(alarm_failure)?;
    Ok(Json(AlarmView::from(&alarm)))
}

/// Update some fields of an alarm.
#[utoipa::path(
    patch,
    path = "/alarms/{id}",
    params(("id" = String, Path, description = "Alarm id")),
    request_body = UpdateAlarmRequest,
    responses(
        (status = 200, description = "The updated alarm", body = AlarmView),
        (status = 400, description = "Invalid field value", body = ErrorBody),
        (status = 404, description = "No such alarm", body = ErrorBody)
    )
)]
pub async fn update_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAlarmRequest>,
) -> Result<Json<AlarmView>, ApiFailure> {
    let changes = payload.into_update().map_err(alarm_failure)?;
    let alarm = app_state
        .manager
        .update(&id, changes)
        .await
        .map_err(alarm_failure)?;
    Ok(Json(AlarmView::from(&alarm)))
}

/// Delete an alarm.
#[utoipa::path(
    delete,
    path = "/alarms/{id}",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 204, description = "Alarm deleted"),
        (status = 404, description = "No such alarm", body = ErrorBody)
    )
)]
pub async fn delete_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    app_state.manager.remove(&id).await.map_err(alarm_failure)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enable an alarm. Any snooze is dropped.
#[utoipa::path(
    post,
    path = "/alarms/{id}/enable",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 200, description = "The enabled alarm", body = AlarmView),
        (status = 404, description = "No such alarm", body = ErrorBody)
    )
)]
pub async fn enable_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlarmView>, ApiFailure> {
    let alarm = app_state.manager.enable(&id).await.map_err(alarm_failure)?;
    Ok(Json(AlarmView::from(&alarm)))
}

/// Disable an alarm. Any snooze is cancelled.
#[utoipa::path(
    post,
    path = "/alarms/{id}/disable",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 200, description = "The disabled alarm", body = AlarmView),
        (status = 404, description = "No such alarm", body = ErrorBody)
    )
)]
pub async fn disable_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlarmView>, ApiFailure> {
    let alarm = app_state.manager.disable(&id).await.map_err(alarm_failure)?;
    Ok(Json(AlarmView::from(&alarm)))
}

/// Flip an alarm between enabled and disabled.
#[utoipa::path(
    post,
    path = "/alarms/{id}/toggle",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 200, description = "The toggled alarm", body = AlarmView),
        (status = 404, description = "No such alarm", body = ErrorBody)
    )
)]
pub async fn toggle_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlarmView>, ApiFailure> {
    let alarm = app_state.manager.toggle(&id).await.map_err(alarm_failure)?;
    Ok(Json(AlarmView::from(&alarm)))
}

/// Snooze one alarm.
#[utoipa::path(
    post,
    path = "/alarms/{id}/snooze",
    params(("id" = String, Path, description = "Alarm id"), SnoozeQuery),
    responses(
        (status = 200, description = "The snoozed alarm", body = AlarmView),
        (status = 404, description = "No such alarm", body = ErrorBody),
        (status = 409, description = "The alarm is disabled", body = ErrorBody)
    )
)]
pub async fn snooze_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SnoozeQuery>,
) -> Result<Json<AlarmView>, ApiFailure> {
    let minutes = snooze_minutes(&app_state, &query)?;
    app_state
        .manager
        .snooze(&id, Duration::minutes(i64::from(minutes)), Local::now())
        .await
        .map_err(alarm_failure)?;
    let alarm = app_state.manager.get(&id).await.map_err(alarm_failure)?;
    Ok(Json(AlarmView::from(&alarm)))
}

/// Play an alarm's feed once, right away, without changing its state.
#[utoipa::path(
    post,
    path = "/alarms/{id}/test",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 202, description = "Test queued", body = AlarmView),
        (status = 404, description = "No such alarm", body = ErrorBody),
        (status = 503, description = "The alarm driver cannot take the request", body = ErrorBody)
    )
)]
pub async fn test_alarm_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiFailure> {
    match app_state.control.test_alarm(&id).await {
        Ok(alarm) => Ok((StatusCode::ACCEPTED, Json(AlarmView::from(&alarm)))),
        Err(ControlError::Alarm(e)) => Err(alarm_failure(e)),
        Err(e) => {
            error!("Could not queue alarm test: {}", e);
            Err(failure(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

//=========================================================================================
// Playback Handlers
//=========================================================================================

/// Report whether an alarm is playing.
#[utoipa::path(
    get,
    path = "/playback",
    responses((status = 200, description = "Playback status", body = PlaybackStatus))
)]
pub async fn playback_status_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut sounding = app_state.manager.sounding_ids().await;
    sounding.sort();
    Json(PlaybackStatus {
        playing: app_state.control.is_playing().await,
        sounding,
    })
}

/// Stop whatever is playing.
#[utoipa::path(
    post,
    path = "/playback/stop",
    responses((status = 200, description = "Playback stopped", body = StopResponse))
)]
pub async fn stop_playback_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let was_playing = app_state.control.stop().await;
    Json(StopResponse { was_playing })
}

/// Snooze every sounding alarm and stop the audio.
#[utoipa::path(
    post,
    path = "/playback/snooze",
    params(SnoozeQuery),
    responses(
        (status = 200, description = "Labels of the snoozed alarms", body = SnoozeResponse),
        (status = 400, description = "Invalid snooze length", body = ErrorBody)
    )
)]
pub async fn snooze_playback_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SnoozeQuery>,
) -> Result<Json<SnoozeResponse>, ApiFailure> {
    let minutes = snooze_minutes(&app_state, &query)?;
    let snoozed = app_state.control.snooze_active(minutes).await;
    Ok(Json(SnoozeResponse { snoozed, minutes }))
}
