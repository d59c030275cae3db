// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentFilter, AppointmentPatch, AppointmentStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("An appointment already holds this doctor, date and clinic")]
    SlotTaken,

    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Appointment status is {actual}, expected {expected}")]
    StatusChanged {
        expected: AppointmentStatus,
        actual: AppointmentStatus,
    },

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlotTaken => AppointmentError::SlotNotAvailable,
            StoreError::NotFound(_) => AppointmentError::NotFound("Appointment".to_string()),
            StoreError::StatusChanged { expected, .. } => AppointmentError::StatusChanged { expected },
            StoreError::Backend(detail) => {
                error!("Appointment store failure: {}", detail);
                AppointmentError::Storage(detail)
            }
        }
    }
}

/// Persistence for the appointment collection. Writes are conditional so the
/// check and the write happen as one step at the storage layer.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Inserts unless another slot-blocking appointment has the same doctor,
    /// date and clinic.
    async fn insert_if_slot_free(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Applies the patch only while the stored status still equals `expected`.
    async fn update_if_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError>;

    /// Matching appointments ordered by date ascending.
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.appointments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.appointments.read().await.is_empty()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert_if_slot_free(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        // The write lock spans both the check and the insert.
        let mut appointments = self.appointments.write().await;

        let taken = appointments
            .values()
            .any(|existing| existing.status.blocks_slot() && existing.occupies_same_slot(&appointment));
        if taken {
            warn!(
                "Slot already held for doctor {} at {} in {}",
                appointment.doctor_id, appointment.date, appointment.clinic_location
            );
            return Err(StoreError::SlotTaken);
        }

        appointments.insert(appointment.id, appointment.clone());
        debug!("Stored appointment {}", appointment.id);
        Ok(appointment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn update_if_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if appointment.status != expected {
            return Err(StoreError::StatusChanged {
                expected,
                actual: appointment.status,
            });
        }

        patch.apply_to(appointment);
        Ok(appointment.clone())
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut matching: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(matching)
    }
}
