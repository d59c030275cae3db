// libs/appointment-cell/src/services/authorization.rs
use std::fmt;

use tracing::warn;

use shared_models::auth::{Actor, Role};

use crate::models::{AppointmentError, Parties};

/// Everything an actor can ask the scheduling core to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppointmentAction {
    Book,
    View,
    ListAll,
    Update,
    Cancel,
    MarkDone,
    MarkNoShow,
    Finalize,
    SetPrice,
    WriteMedicalRecord,
    WriteAdminNote,
    ViewFinance,
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppointmentAction::Book => "book appointments",
            AppointmentAction::View => "view this appointment",
            AppointmentAction::ListAll => "list all appointments",
            AppointmentAction::Update => "modify this appointment",
            AppointmentAction::Cancel => "cancel this appointment",
            AppointmentAction::MarkDone => "mark this appointment done",
            AppointmentAction::MarkNoShow => "mark this appointment as a no-show",
            AppointmentAction::Finalize => "finalize this appointment",
            AppointmentAction::SetPrice => "set the price",
            AppointmentAction::WriteMedicalRecord => "write the medical record",
            AppointmentAction::WriteAdminNote => "write the admin note",
            AppointmentAction::ViewFinance => "view these finance statistics",
        };
        f.write_str(label)
    }
}

/// How far a role's permission for an action reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Denied,
    /// Only when the actor is the patient or doctor of record.
    Own,
    Any,
}

/// The capability table. Every doctor grant is `Own`, so a doctor can never
/// act on another doctor's appointment.
pub fn grant(role: Role, action: AppointmentAction) -> Grant {
    use AppointmentAction::*;

    match (role, action) {
        (Role::Management, _) => match action {
            MarkDone | WriteMedicalRecord => Grant::Denied,
            _ => Grant::Any,
        },

        (Role::Doctor, View | Update | MarkDone | Finalize | SetPrice | WriteMedicalRecord | ViewFinance) => Grant::Own,
        (Role::Doctor, _) => Grant::Denied,

        (Role::Patient, Book | View | Cancel) => Grant::Own,
        (Role::Patient, _) => Grant::Denied,
    }
}

fn is_party(actor: &Actor, parties: &Parties) -> bool {
    match actor.role {
        Role::Patient => parties.patient_id == Some(actor.id),
        Role::Doctor => parties.doctor_id == Some(actor.id),
        Role::Management => false,
    }
}

/// Single authorization path for the scheduling core.
pub fn authorize(actor: &Actor, action: AppointmentAction, parties: &Parties) -> Result<(), AppointmentError> {
    let allowed = match grant(actor.role, action) {
        Grant::Any => true,
        Grant::Own => is_party(actor, parties),
        Grant::Denied => false,
    };

    if allowed {
        Ok(())
    } else {
        warn!("{} {} may not {}", actor.role, actor.id, action);
        Err(AppointmentError::Forbidden(format!("A {} may not {}", actor.role, action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn parties(patient: Uuid, doctor: Uuid) -> Parties {
        Parties { patient_id: Some(patient), doctor_id: Some(doctor) }
    }

    #[test]
    fn doctor_only_acts_on_own_appointments() {
        let doctor = Actor::doctor(Uuid::new_v4());
        let own = parties(Uuid::new_v4(), doctor.id);
        let foreign = parties(Uuid::new_v4(), Uuid::new_v4());

        for action in [
            AppointmentAction::View,
            AppointmentAction::MarkDone,
            AppointmentAction::Finalize,
            AppointmentAction::SetPrice,
            AppointmentAction::WriteMedicalRecord,
        ] {
            assert!(authorize(&doctor, action, &own).is_ok(), "{:?}", action);
            assert!(matches!(
                authorize(&doctor, action, &foreign),
                Err(AppointmentError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn patient_may_cancel_only_their_own() {
        let patient = Actor::patient(Uuid::new_v4());
        assert!(authorize(&patient, AppointmentAction::Cancel, &parties(patient.id, Uuid::new_v4())).is_ok());
        assert!(authorize(&patient, AppointmentAction::Cancel, &parties(Uuid::new_v4(), Uuid::new_v4())).is_err());
        assert!(authorize(&patient, AppointmentAction::SetPrice, &parties(patient.id, Uuid::new_v4())).is_err());
    }

    #[test]
    fn management_cannot_write_clinical_data() {
        let manager = Actor::management(Uuid::new_v4());
        let any = parties(Uuid::new_v4(), Uuid::new_v4());

        assert!(authorize(&manager, AppointmentAction::Cancel, &any).is_ok());
        assert!(authorize(&manager, AppointmentAction::MarkNoShow, &any).is_ok());
        assert!(authorize(&manager, AppointmentAction::Finalize, &any).is_ok());
        assert!(authorize(&manager, AppointmentAction::WriteMedicalRecord, &any).is_err());
        assert!(authorize(&manager, AppointmentAction::MarkDone, &any).is_err());
    }

    #[test]
    fn doctors_cannot_book_or_list_everything() {
        assert_eq!(grant(Role::Doctor, AppointmentAction::Book), Grant::Denied);
        assert_eq!(grant(Role::Doctor, AppointmentAction::ListAll), Grant::Denied);
        assert_eq!(grant(Role::Patient, AppointmentAction::ViewFinance), Grant::Denied);
    }
}
