// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::{Actor, Role};

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, BookAppointmentRequest, Parties,
    SlotAvailability,
};
use crate::services::authorization::{authorize, AppointmentAction};
use crate::services::pricing::PricingPolicy;
use crate::services::schedule::ClinicScheduleRegistry;
use crate::services::slots::{parse_slot_date, SlotAvailabilityCalculator};
use crate::services::store::AppointmentStore;
use crate::state::AppointmentState;

/// Validated booking input.
struct BookingDraft {
    patient_id: Uuid,
    doctor_id: Uuid,
    date: DateTime<Utc>,
    appointment_type: String,
    clinic_location: String,
}

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    registry: Arc<ClinicScheduleRegistry>,
    calculator: SlotAvailabilityCalculator,
    pricing: Arc<PricingPolicy>,
}

impl AppointmentBookingService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            registry: Arc::clone(&state.registry),
            calculator: SlotAvailabilityCalculator::new(Arc::clone(&state.registry)),
            pricing: Arc::clone(&state.pricing),
        }
    }

    /// Slots of a clinic day with their availability. Cancelled appointments do
    /// not hold a slot.
    pub async fn available_slots(
        &self,
        clinic_name: Option<&str>,
        date: Option<&str>,
    ) -> Result<Vec<SlotAvailability>, AppointmentError> {
        let clinic_name = required_text(clinic_name, "clinic_name")?;
        let date = parse_slot_date(&required_text(date, "date")?)?;
        debug!("Computing available slots for {} on {}", clinic_name, date);

        let slots = self.calculator.compute_candidate_slots(&clinic_name, date);
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let Some((from, to)) = self.calculator.local_day_bounds(&clinic_name, date) else {
            return Ok(Vec::new());
        };
        let filter = AppointmentFilter {
            clinic_location: Some(clinic_name.clone()),
            from: Some(from),
            to: Some(to),
            ..AppointmentFilter::default()
        };
        let mut booked = self.store.list(&filter).await?;
        booked.retain(|appointment| appointment.status.blocks_slot());

        Ok(self.calculator.annotate_availability(&clinic_name, date, &slots, &booked))
    }

    pub async fn create_appointment(
        &self,
        actor: &Actor,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.create_appointment_at(actor, request, Utc::now()).await
    }

    /// Books as of `now`. The insert is the conflict check: the store refuses a
    /// second slot holder atomically.
    pub async fn create_appointment_at(
        &self,
        actor: &Actor,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let draft = self.validate_booking_request(actor, request, now)?;

        info!("Booking appointment for patient {} with doctor {} at {} in {}",
              draft.patient_id, draft.doctor_id, draft.date, draft.clinic_location);

        let price = self.pricing.price_for(&draft.clinic_location, &draft.appointment_type);
        let appointment = Appointment::new(
            draft.patient_id,
            draft.doctor_id,
            draft.date,
            draft.clinic_location,
            draft.appointment_type,
            price,
        );

        let stored = self.store.insert_if_slot_free(appointment).await.map_err(|e| {
            let err = AppointmentError::from(e);
            if err == AppointmentError::SlotNotAvailable {
                warn!("Booking rejected, slot already taken for doctor {}", draft.doctor_id);
            }
            err
        })?;

        info!("Appointment {} booked successfully", stored.id);
        Ok(stored)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_booking_request(
        &self,
        actor: &Actor,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<BookingDraft, AppointmentError> {
        let patient_id = match (actor.role, request.patient_id) {
            (Role::Patient, None) => actor.id,
            (_, Some(patient_id)) => patient_id,
            (_, None) => {
                return Err(AppointmentError::Validation("patient_id is required".to_string()));
            }
        };
        let doctor_id = request.doctor_id
            .ok_or_else(|| AppointmentError::Validation("doctor_id is required".to_string()))?;

        authorize(actor, AppointmentAction::Book, &Parties {
            patient_id: Some(patient_id),
            doctor_id: Some(doctor_id),
        })?;

        let raw_date = required_text(request.date.as_deref(), "date")?;
        let appointment_type = required_text(request.appointment_type.as_deref(), "type")?;
        let clinic_location = required_text(request.clinic_location.as_deref(), "clinic_location")?;

        let date = DateTime::parse_from_rfc3339(&raw_date)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| AppointmentError::Validation(format!("Invalid appointment date: '{}'", raw_date)))?;

        if date <= now {
            return Err(AppointmentError::Validation(
                "Appointment must be scheduled for a future time".to_string(),
            ));
        }

        if self.registry.lookup(&clinic_location).is_none() {
            return Err(AppointmentError::NotFound(format!("Clinic '{}'", clinic_location)));
        }

        if !self.calculator.is_candidate_slot(&clinic_location, date) {
            return Err(AppointmentError::Validation(format!(
                "{} is not a bookable slot at {}",
                date.to_rfc3339(),
                clinic_location
            )));
        }

        Ok(BookingDraft {
            patient_id,
            doctor_id,
            date,
            appointment_type,
            clinic_location,
        })
    }
}

fn required_text(value: Option<&str>, field: &str) -> Result<String, AppointmentError> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppointmentError::Validation(format!("{} is required", field)))
}
