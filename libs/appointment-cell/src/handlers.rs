// libs/appointment-cell/src/handlers.rs
use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::actor_from_user;

use crate::models::{
    AppointmentError, AppointmentListQuery, AvailableSlotsQuery, BookAppointmentRequest,
    CancelAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::state::AppointmentState;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            AppointmentError::SlotNotAvailable => {
                AppError::BadRequest("Appointment slot no longer available".to_string())
            }
            AppointmentError::StatusChanged { expected } => AppError::Conflict(format!(
                "Appointment is no longer {}; reload and retry",
                expected
            )),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::Storage(detail) => AppError::Internal(detail),
        }
    }
}

/// Malformed bodies are validation failures, not extractor rejections.
fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::ValidationError(format!("Invalid request body: {}", e)))
}

// ==============================================================================
// PUBLIC SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<AppointmentState>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let slots = booking_service
        .available_slots(query.clinic_name.as_deref(), query.date.as_deref())
        .await?;

    Ok(Json(json!({ "slots": slots })))
}

#[axum::debug_handler]
pub async fn list_clinics(
    State(state): State<AppointmentState>,
) -> Result<Json<Value>, AppError> {
    let clinics: Vec<Value> = state
        .registry
        .schedules()
        .iter()
        .map(|(name, schedule)| json!({
            "name": name,
            "operatingWeekdays": schedule.operating_weekdays,
            "startHour": schedule.start_hour,
            "endHour": schedule.end_hour,
            "utcOffsetMinutes": schedule.utc_offset_minutes,
        }))
        .collect();

    Ok(Json(json!({ "clinics": clinics })))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let request: BookAppointmentRequest = parse_body(body)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service.create_appointment(&actor, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;

    let lifecycle_service = AppointmentLifecycleService::new(&state);
    let appointments = lifecycle_service.list_appointments(&actor, query).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;

    let lifecycle_service = AppointmentLifecycleService::new(&state);
    let appointment = lifecycle_service.get_appointment(&actor, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let request: UpdateAppointmentRequest = parse_body(body)?;

    let lifecycle_service = AppointmentLifecycleService::new(&state);
    let appointment = lifecycle_service
        .update_appointment(&actor, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

/// Body is optional; an empty one cancels without a reason.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let request: CancelAppointmentRequest = if body.is_empty() {
        CancelAppointmentRequest::default()
    } else {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| AppError::ValidationError(format!("Invalid request body: {}", e)))?;
        parse_body(value)?
    };
    debug!("Cancel requested for appointment {}", appointment_id);

    let lifecycle_service = AppointmentLifecycleService::new(&state);
    let appointment = lifecycle_service
        .cancel_appointment(&actor, appointment_id, request.reason)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}
