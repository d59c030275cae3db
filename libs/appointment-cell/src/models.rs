// libs/appointment-cell/src/models.rs
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// Scheduled start, stored as a UTC instant.
    pub date: DateTime<Utc>,
    pub clinic_location: String,
    #[serde(alias = "type")]
    pub appointment_type: String,
    pub status: AppointmentStatus,
    pub price: f64,
    pub medical_record: Option<MedicalRecord>,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(
        patient_id: Uuid,
        doctor_id: Uuid,
        date: DateTime<Utc>,
        clinic_location: String,
        appointment_type: String,
        price: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            date,
            clinic_location,
            appointment_type,
            status: AppointmentStatus::Upcoming,
            price,
            medical_record: None,
            admin_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn parties(&self) -> Parties {
        Parties {
            patient_id: Some(self.patient_id),
            doctor_id: Some(self.doctor_id),
        }
    }

    /// True when both appointments claim the same doctor, instant and clinic.
    pub fn occupies_same_slot(&self, other: &Appointment) -> bool {
        self.doctor_id == other.doctor_id
            && self.date == other.date
            && self.clinic_location == other.clinic_location
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Upcoming,
    Done,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Upcoming,
        AppointmentStatus::Done,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Upcoming => "upcoming",
            AppointmentStatus::Done => "done",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    /// Upcoming and done still accept transitions.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Upcoming | AppointmentStatus::Done)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether an appointment in this status keeps its (doctor, date, clinic) slot.
    /// Cancelling releases the slot for rebooking.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| AppointmentError::Validation(format!("Unknown appointment status: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub prescription: Option<String>,
    #[serde(alias = "medicalAdvice")]
    pub medical_advice: Option<String>,
}

/// The people an appointment (or a request about one) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Parties {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

impl Parties {
    pub fn patient(patient_id: Uuid) -> Self {
        Self { patient_id: Some(patient_id), doctor_id: None }
    }

    pub fn doctor(doctor_id: Uuid) -> Self {
        Self { patient_id: None, doctor_id: Some(doctor_id) }
    }
}

// ==============================================================================
// CLINIC SCHEDULE AND SLOT MODELS
// ==============================================================================

/// Weekly operating window of a clinic. Weekdays count from Sunday = 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicSchedule {
    pub operating_weekdays: BTreeSet<u8>,
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
    pub available: bool,
}

/// Slot times travel as "HH:MM".
pub mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Booking payload. Fields are optional so missing ones surface as validation
/// errors instead of extractor rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    #[serde(alias = "patientId")]
    pub patient_id: Option<Uuid>,
    #[serde(alias = "doctorId")]
    pub doctor_id: Option<Uuid>,
    pub date: Option<String>,
    #[serde(alias = "type")]
    pub appointment_type: Option<String>,
    #[serde(alias = "clinicLocation")]
    pub clinic_location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub price: Option<f64>,
    #[serde(alias = "medicalRecord")]
    pub medical_record: Option<MedicalRecord>,
    #[serde(alias = "adminNote")]
    pub admin_note: Option<String>,
}

impl UpdateAppointmentRequest {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.price.is_none()
            && self.medical_record.is_none()
            && self.admin_note.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: Option<String>,
    #[serde(alias = "clinicName")]
    pub clinic_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentScope {
    All,
    DoctorDay,
    PatientHistory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub scope: Option<AppointmentScope>,
    pub date: Option<NaiveDate>,
    #[serde(alias = "patientId")]
    pub patient_id: Option<Uuid>,
    #[serde(alias = "doctorId")]
    pub doctor_id: Option<Uuid>,
}

/// Display fields joined onto an appointment on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedAppointment {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: Option<PersonSummary>,
    pub doctor: Option<PersonSummary>,
    /// Statuses the appointment may still move to.
    pub valid_transitions: Vec<AppointmentStatus>,
}

// ==============================================================================
// STORAGE MODELS
// ==============================================================================

/// Field changes applied by a conditional update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_record: Option<MedicalRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentPatch {
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(price) = self.price {
            appointment.price = price;
        }
        if let Some(record) = &self.medical_record {
            appointment.medical_record = Some(record.clone());
        }
        if let Some(note) = &self.admin_note {
            appointment.admin_note = Some(note.clone());
        }
        appointment.updated_at = self.updated_at;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub clinic_location: Option<String>,
    pub status: Option<AppointmentStatus>,
    /// Inclusive lower bound on `date`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `date`.
    pub to: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.clinic_location.as_deref().map_or(true, |clinic| appointment.clinic_location == clinic)
            && self.status.map_or(true, |status| appointment.status == status)
            && self.from.map_or(true, |from| appointment.date >= from)
            && self.to.map_or(true, |to| appointment.date < to)
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Appointment slot not available")]
    SlotNotAvailable,

    #[error("Appointment status changed from {expected} before the update was applied")]
    StatusChanged { expected: AppointmentStatus },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
