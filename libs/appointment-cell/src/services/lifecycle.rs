// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::{Actor, Role};

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentListQuery, AppointmentPatch,
    AppointmentScope, AppointmentStatus, EnrichedAppointment, Parties, UpdateAppointmentRequest,
};
use crate::services::authorization::{authorize, AppointmentAction};
use crate::services::directory::PeopleDirectory;
use crate::services::schedule::ClinicScheduleRegistry;
use crate::services::store::AppointmentStore;
use crate::state::AppointmentState;

/// Statuses reachable from `current`.
pub fn allowed_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Upcoming => &[
            AppointmentStatus::Done,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::Done => &[AppointmentStatus::Completed],
        // Terminal states - no transitions allowed
        AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => &[],
    }
}

/// Validates a status change and names the capability it needs. Every write
/// path goes through here.
pub fn validate_status_transition(
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<AppointmentAction, AppointmentError> {
    debug!("Validating status transition from {} to {}", current, next);

    match (current, next) {
        (AppointmentStatus::Upcoming, AppointmentStatus::Cancelled) => Ok(AppointmentAction::Cancel),
        (AppointmentStatus::Upcoming, AppointmentStatus::Done) => Ok(AppointmentAction::MarkDone),
        (AppointmentStatus::Upcoming, AppointmentStatus::NoShow) => Ok(AppointmentAction::MarkNoShow),
        (AppointmentStatus::Done, AppointmentStatus::Completed) => Ok(AppointmentAction::Finalize),
        _ => {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            Err(AppointmentError::Forbidden(format!(
                "Cannot move an appointment from {} to {}",
                current, next
            )))
        }
    }
}

/// Whose appointments a per-person scope reads. Doctors and patients default to
/// themselves; management has no appointments of its own and must name one.
fn scoped_party(
    actor: &Actor,
    requested: Option<Uuid>,
    param: &str,
    scope: &str,
) -> Result<Uuid, AppointmentError> {
    match (requested, actor.role) {
        (Some(id), _) => Ok(id),
        (None, Role::Management) => Err(AppointmentError::Validation(format!(
            "{} is required for scope {}",
            param, scope
        ))),
        (None, _) => Ok(actor.id),
    }
}

pub struct AppointmentLifecycleService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn PeopleDirectory>,
    registry: Arc<ClinicScheduleRegistry>,
}

impl AppointmentLifecycleService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            directory: Arc::clone(&state.directory),
            registry: Arc::clone(&state.registry),
        }
    }

    /// Single appointment joined with patient and doctor display fields.
    pub async fn get_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
    ) -> Result<EnrichedAppointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let appointment = self.load(appointment_id).await?;
        authorize(actor, AppointmentAction::View, &appointment.parties())?;

        let (patient, doctor) = tokio::join!(
            self.directory.summary(appointment.patient_id),
            self.directory.summary(appointment.doctor_id),
        );

        let valid_transitions = allowed_transitions(appointment.status).to_vec();
        Ok(EnrichedAppointment { appointment, patient, doctor, valid_transitions })
    }

    /// PATCH entry point for doctors and management.
    pub async fn update_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", appointment_id);

        if request.is_empty() {
            return Err(AppointmentError::Validation("No fields to update".to_string()));
        }

        let current = self.load(appointment_id).await?;
        authorize(actor, AppointmentAction::Update, &current.parties())?;

        self.apply_changes(actor, current, request).await
    }

    /// upcoming -> cancelled, for the patient of record or management.
    pub async fn cancel_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.load(appointment_id).await?;
        let request = UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Cancelled),
            admin_note: reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            ..UpdateAppointmentRequest::default()
        };

        self.apply_changes(actor, current, request).await
    }

    pub async fn list_appointments(
        &self,
        actor: &Actor,
        query: AppointmentListQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let scope = query.scope.unwrap_or(match actor.role {
            Role::Management => AppointmentScope::All,
            Role::Doctor => AppointmentScope::DoctorDay,
            Role::Patient => AppointmentScope::PatientHistory,
        });
        debug!("Listing appointments for {} {} with scope {:?}", actor.role, actor.id, scope);

        match scope {
            AppointmentScope::All => {
                authorize(actor, AppointmentAction::ListAll, &Parties::default())?;
                Ok(self.store.list(&AppointmentFilter::default()).await?)
            }
            AppointmentScope::DoctorDay => {
                let doctor_id = scoped_party(actor, query.doctor_id, "doctorId", "doctor-day")?;
                authorize(actor, AppointmentAction::View, &Parties::doctor(doctor_id))?;
                let day = query.date.unwrap_or_else(|| Utc::now().date_naive());
                self.doctor_day(doctor_id, day).await
            }
            AppointmentScope::PatientHistory => {
                let patient_id = scoped_party(actor, query.patient_id, "patientId", "patient-history")?;
                authorize(actor, AppointmentAction::View, &Parties::patient(patient_id))?;
                let mut history = self.store.list(&AppointmentFilter {
                    patient_id: Some(patient_id),
                    ..AppointmentFilter::default()
                }).await?;
                history.reverse();
                Ok(history)
            }
        }
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Appointment".to_string()))
    }

    /// Authorizes every requested field before writing anything, then writes
    /// conditionally on the status that was read.
    async fn apply_changes(
        &self,
        actor: &Actor,
        current: Appointment,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let parties = current.parties();

        let transition = match request.status {
            Some(next) => {
                let action = validate_status_transition(current.status, next)?;
                authorize(actor, action, &parties)?;
                Some((next, action))
            }
            None => None,
        };
        let resulting_status = transition.map_or(current.status, |(next, _)| next);

        if let Some(price) = request.price {
            if !price.is_finite() || price < 0.0 {
                return Err(AppointmentError::Validation("Price must be a non-negative number".to_string()));
            }
            authorize(actor, AppointmentAction::SetPrice, &parties)?;
        }

        if request.medical_record.is_some() {
            authorize(actor, AppointmentAction::WriteMedicalRecord, &parties)?;
            if matches!(resulting_status, AppointmentStatus::Cancelled | AppointmentStatus::NoShow) {
                return Err(AppointmentError::Forbidden(format!(
                    "A medical record cannot be attached to a {} appointment",
                    resulting_status
                )));
            }
        }

        if request.admin_note.is_some() {
            // Cancellation and no-show carry their own reason.
            let note_rides_on_transition = matches!(
                transition,
                Some((_, AppointmentAction::Cancel | AppointmentAction::MarkNoShow))
            );
            if !note_rides_on_transition {
                authorize(actor, AppointmentAction::WriteAdminNote, &parties)?;
            }
        }

        let patch = AppointmentPatch {
            status: transition.map(|(next, _)| next),
            price: request.price,
            medical_record: request.medical_record,
            admin_note: request.admin_note,
            updated_at: Utc::now(),
        };

        let updated = self.store
            .update_if_status(current.id, current.status, patch)
            .await
            .map_err(|e| {
                let err = AppointmentError::from(e);
                if matches!(err, AppointmentError::StatusChanged { .. }) {
                    warn!("Appointment {} changed concurrently, update rejected", current.id);
                }
                err
            })?;

        info!("Appointment {} updated by {} {} (status {} -> {})",
              updated.id, actor.role, actor.id, current.status, updated.status);
        Ok(updated)
    }

    /// A doctor's appointments on one clinic-local calendar day.
    async fn doctor_day(&self, doctor_id: Uuid, day: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        // Clinic offsets stay within a day, so a three-day UTC window covers any local day.
        let window_start = day
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc() - Duration::days(1));
        let filter = AppointmentFilter {
            doctor_id: Some(doctor_id),
            from: window_start,
            to: window_start.map(|start| start + Duration::days(3)),
            ..AppointmentFilter::default()
        };

        let appointments = self.store.list(&filter).await?;
        Ok(appointments
            .into_iter()
            .filter(|appointment| {
                let local = match self.registry.lookup(&appointment.clinic_location) {
                    Some(schedule) => schedule.local_datetime(appointment.date),
                    None => appointment.date.naive_utc(),
                };
                local.date() == day
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_lifecycle() {
        use AppointmentStatus::*;

        assert_eq!(validate_status_transition(Upcoming, Cancelled), Ok(AppointmentAction::Cancel));
        assert_eq!(validate_status_transition(Upcoming, Done), Ok(AppointmentAction::MarkDone));
        assert_eq!(validate_status_transition(Upcoming, NoShow), Ok(AppointmentAction::MarkNoShow));
        assert_eq!(validate_status_transition(Done, Completed), Ok(AppointmentAction::Finalize));

        for (from, to) in [(Upcoming, Completed), (Done, Cancelled), (Completed, Done), (Cancelled, Upcoming), (Upcoming, Upcoming)] {
            assert!(matches!(validate_status_transition(from, to), Err(AppointmentError::Forbidden(_))));
        }
    }

    #[test]
    fn allowed_transitions_agree_with_validation() {
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                assert_eq!(
                    allowed_transitions(from).contains(&to),
                    validate_status_transition(from, to).is_ok(),
                    "{} -> {}",
                    from,
                    to
                );
            }
            assert_eq!(allowed_transitions(from).is_empty(), from.is_terminal());
        }
    }

    // ==============================================================================
    // SERVICE TESTS
    // ==============================================================================

    use crate::models::MedicalRecord;
    use shared_utils::test_utils::TestConfig;

    struct Fixture {
        state: AppointmentState,
        service: AppointmentLifecycleService,
        patient: Actor,
        doctor: Actor,
        management: Actor,
    }

    async fn fixture_with(status: AppointmentStatus) -> (Fixture, Appointment) {
        let state = AppointmentState::in_memory(TestConfig::default().to_arc());
        let service = AppointmentLifecycleService::new(&state);
        let patient = Actor::patient(Uuid::new_v4());
        let doctor = Actor::doctor(Uuid::new_v4());

        let seeded = state.store
            .insert_if_slot_free(Appointment::new(
                patient.id,
                doctor.id,
                "2030-01-05T16:00:00Z".parse().unwrap(),
                "Janaklees".to_string(),
                "checkup".to_string(),
                200.0,
            ))
            .await
            .unwrap();

        let path = match status {
            AppointmentStatus::Upcoming => vec![],
            AppointmentStatus::Completed => vec![AppointmentStatus::Done, AppointmentStatus::Completed],
            other => vec![other],
        };
        let mut expected = AppointmentStatus::Upcoming;
        for next in path {
            state.store.update_if_status(seeded.id, expected, AppointmentPatch {
                status: Some(next),
                price: None,
                medical_record: None,
                admin_note: None,
                updated_at: Utc::now(),
            }).await.unwrap();
            expected = next;
        }

        let appointment = state.store.get(seeded.id).await.unwrap().unwrap();
        let fixture = Fixture {
            state,
            service,
            patient,
            doctor,
            management: Actor::management(Uuid::new_v4()),
        };
        (fixture, appointment)
    }

    fn status_change(status: AppointmentStatus) -> UpdateAppointmentRequest {
        UpdateAppointmentRequest { status: Some(status), ..UpdateAppointmentRequest::default() }
    }

    #[tokio::test]
    async fn doctor_marks_done_then_finalizes_with_record() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;

        let done = f.service
            .update_appointment(&f.doctor, appointment.id, status_change(AppointmentStatus::Done))
            .await
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Done);

        let record = MedicalRecord {
            prescription: Some("Paracetamol".to_string()),
            medical_advice: Some("Rest".to_string()),
        };
        let completed = f.service
            .update_appointment(&f.doctor, appointment.id, UpdateAppointmentRequest {
                status: Some(AppointmentStatus::Completed),
                price: Some(350.0),
                medical_record: Some(record.clone()),
                admin_note: None,
            })
            .await
            .unwrap();

        assert_eq!(completed.status, AppointmentStatus::Completed);
        assert_eq!(completed.price, 350.0);
        assert_eq!(completed.medical_record, Some(record));
    }

    #[tokio::test]
    async fn upcoming_cannot_skip_to_completed() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;

        let result = f.service
            .update_appointment(&f.doctor, appointment.id, status_change(AppointmentStatus::Completed))
            .await;

        assert!(matches!(result, Err(AppointmentError::Forbidden(_))));
        let stored = f.state.store.get(appointment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Upcoming);
    }

    #[tokio::test]
    async fn terminal_statuses_reject_every_change() {
        for status in [AppointmentStatus::Completed, AppointmentStatus::Cancelled, AppointmentStatus::NoShow] {
            let (f, appointment) = fixture_with(status).await;
            for next in AppointmentStatus::ALL {
                let result = f.service
                    .update_appointment(&f.management, appointment.id, status_change(next))
                    .await;
                assert!(matches!(result, Err(AppointmentError::Forbidden(_))), "{} -> {}", status, next);
            }
        }
    }

    #[tokio::test]
    async fn other_doctor_cannot_touch_appointment() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;
        let stranger = Actor::doctor(Uuid::new_v4());

        let update = f.service
            .update_appointment(&stranger, appointment.id, status_change(AppointmentStatus::Done))
            .await;
        let view = f.service.get_appointment(&stranger, appointment.id).await;

        assert!(matches!(update, Err(AppointmentError::Forbidden(_))));
        assert!(matches!(view, Err(AppointmentError::Forbidden(_))));
    }

    #[tokio::test]
    async fn management_cannot_mark_done_or_write_records() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;

        let done = f.service
            .update_appointment(&f.management, appointment.id, status_change(AppointmentStatus::Done))
            .await;
        let record = f.service
            .update_appointment(&f.management, appointment.id, UpdateAppointmentRequest {
                medical_record: Some(MedicalRecord::default()),
                ..UpdateAppointmentRequest::default()
            })
            .await;

        assert!(matches!(done, Err(AppointmentError::Forbidden(_))));
        assert!(matches!(record, Err(AppointmentError::Forbidden(_))));
    }

    #[tokio::test]
    async fn management_records_no_show_with_note() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;

        let updated = f.service
            .update_appointment(&f.management, appointment.id, UpdateAppointmentRequest {
                status: Some(AppointmentStatus::NoShow),
                admin_note: Some("Patient did not arrive".to_string()),
                ..UpdateAppointmentRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.status, AppointmentStatus::NoShow);
        assert_eq!(updated.admin_note.as_deref(), Some("Patient did not arrive"));
    }

    #[tokio::test]
    async fn patient_cancels_own_appointment_but_not_others() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;
        let stranger = Actor::patient(Uuid::new_v4());

        let denied = f.service.cancel_appointment(&stranger, appointment.id, None).await;
        assert!(matches!(denied, Err(AppointmentError::Forbidden(_))));

        let cancelled = f.service
            .cancel_appointment(&f.patient, appointment.id, Some("Travelling".to_string()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.admin_note.as_deref(), Some("Travelling"));
    }

    #[tokio::test]
    async fn patient_cannot_patch() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;

        let result = f.service
            .update_appointment(&f.patient, appointment.id, UpdateAppointmentRequest {
                price: Some(1.0),
                ..UpdateAppointmentRequest::default()
            })
            .await;

        assert!(matches!(result, Err(AppointmentError::Forbidden(_))));
    }

    #[tokio::test]
    async fn rejects_empty_and_negative_updates() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;

        let empty = f.service
            .update_appointment(&f.doctor, appointment.id, UpdateAppointmentRequest::default())
            .await;
        let negative = f.service
            .update_appointment(&f.doctor, appointment.id, UpdateAppointmentRequest {
                price: Some(-5.0),
                ..UpdateAppointmentRequest::default()
            })
            .await;

        assert!(matches!(empty, Err(AppointmentError::Validation(_))));
        assert!(matches!(negative, Err(AppointmentError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_appointment_is_not_found() {
        let (f, _) = fixture_with(AppointmentStatus::Upcoming).await;

        let result = f.service.get_appointment(&f.management, Uuid::new_v4()).await;

        assert_eq!(result.unwrap_err(), AppointmentError::NotFound("Appointment".to_string()));
    }

    #[tokio::test]
    async fn concurrent_finalize_applies_once() {
        let (f, appointment) = fixture_with(AppointmentStatus::Done).await;

        let first = f.service.update_appointment(&f.doctor, appointment.id, status_change(AppointmentStatus::Completed));
        let second = f.service.update_appointment(&f.management, appointment.id, status_change(AppointmentStatus::Completed));
        let (first, second) = tokio::join!(first, second);

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(AppointmentError::StatusChanged { .. }) | Err(AppointmentError::Forbidden(_))
        )));
    }

    #[tokio::test]
    async fn get_appointment_enriches_parties() {
        let state = AppointmentState::in_memory(TestConfig::default().to_arc());
        let directory = Arc::new(crate::services::directory::InMemoryPeopleDirectory::new());
        let patient_id = Uuid::new_v4();
        directory.insert(crate::models::PersonSummary {
            id: patient_id,
            full_name: Some("Mona Adel".to_string()),
            email: Some("mona@example.com".to_string()),
            phone: None,
        }).await;
        let state = AppointmentState::new(
            state.config.clone(),
            state.registry.clone(),
            state.store.clone(),
            directory,
            state.pricing.clone(),
        );
        let service = AppointmentLifecycleService::new(&state);
        let doctor = Actor::doctor(Uuid::new_v4());
        let seeded = state.store.insert_if_slot_free(Appointment::new(
            patient_id,
            doctor.id,
            "2030-01-05T16:00:00Z".parse().unwrap(),
            "Janaklees".to_string(),
            "checkup".to_string(),
            200.0,
        )).await.unwrap();

        let enriched = service.get_appointment(&doctor, seeded.id).await.unwrap();

        assert_eq!(enriched.patient.and_then(|p| p.full_name).as_deref(), Some("Mona Adel"));
        assert!(enriched.doctor.is_none());
        assert_eq!(enriched.valid_transitions, allowed_transitions(AppointmentStatus::Upcoming).to_vec());
    }

    #[tokio::test]
    async fn doctor_day_uses_clinic_local_date() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;
        // 23:30 UTC on the 4th is 01:30 on the 5th in Smouha's +02:00.
        let late = f.state.store.insert_if_slot_free(Appointment::new(
            f.patient.id,
            f.doctor.id,
            "2030-01-04T23:30:00Z".parse().unwrap(),
            "Smouha".to_string(),
            "checkup".to_string(),
            200.0,
        )).await.unwrap();

        let day = f.service.list_appointments(&f.doctor, AppointmentListQuery {
            scope: Some(AppointmentScope::DoctorDay),
            date: NaiveDate::from_ymd_opt(2030, 1, 5),
            ..AppointmentListQuery::default()
        }).await.unwrap();

        let ids: Vec<Uuid> = day.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![late.id, appointment.id]);
    }

    #[tokio::test]
    async fn management_personal_scopes_need_an_explicit_id() {
        let (f, appointment) = fixture_with(AppointmentStatus::Upcoming).await;

        let doctor_day = f.service.list_appointments(&f.management, AppointmentListQuery {
            scope: Some(AppointmentScope::DoctorDay),
            date: NaiveDate::from_ymd_opt(2030, 1, 5),
            ..AppointmentListQuery::default()
        }).await;
        let history = f.service.list_appointments(&f.management, AppointmentListQuery {
            scope: Some(AppointmentScope::PatientHistory),
            ..AppointmentListQuery::default()
        }).await;
        assert!(matches!(doctor_day, Err(AppointmentError::Validation(msg)) if msg.contains("doctorId")));
        assert!(matches!(history, Err(AppointmentError::Validation(msg)) if msg.contains("patientId")));

        let named = f.service.list_appointments(&f.management, AppointmentListQuery {
            scope: Some(AppointmentScope::PatientHistory),
            patient_id: Some(f.patient.id),
            ..AppointmentListQuery::default()
        }).await.unwrap();
        assert_eq!(named.iter().map(|a| a.id).collect::<Vec<_>>(), vec![appointment.id]);
    }

    #[tokio::test]
    async fn patient_history_is_newest_first_and_private() {
        let (f, first) = fixture_with(AppointmentStatus::Upcoming).await;
        let second = f.state.store.insert_if_slot_free(Appointment::new(
            f.patient.id,
            f.doctor.id,
            "2030-01-12T16:00:00Z".parse().unwrap(),
            "Janaklees".to_string(),
            "checkup".to_string(),
            200.0,
        )).await.unwrap();

        let history = f.service.list_appointments(&f.patient, AppointmentListQuery::default()).await.unwrap();
        assert_eq!(history.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let snooping = f.service.list_appointments(&f.patient, AppointmentListQuery {
            scope: Some(AppointmentScope::PatientHistory),
            patient_id: Some(Uuid::new_v4()),
            ..AppointmentListQuery::default()
        }).await;
        assert!(matches!(snooping, Err(AppointmentError::Forbidden(_))));

        let all = f.service.list_appointments(&f.patient, AppointmentListQuery {
            scope: Some(AppointmentScope::All),
            ..AppointmentListQuery::default()
        }).await;
        assert!(matches!(all, Err(AppointmentError::Forbidden(_))));
    }
}
