// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentFilter, AppointmentPatch, AppointmentStatus};
use crate::services::store::{AppointmentStore, StoreError};

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";

/// PostgREST-backed store. Double booking is refused by the partial unique
/// index in `migrations/`; status changes are PATCHes filtered on the
/// expected status.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, StoreError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| StoreError::Backend(format!("Failed to parse appointment: {}", e)))
            })
            .collect()
    }

    fn filter_query(filter: &AppointmentFilter) -> String {
        let mut query_parts = Vec::new();

        if let Some(doctor_id) = filter.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = filter.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(clinic) = &filter.clinic_location {
            query_parts.push(format!("clinic_location=eq.{}", urlencoding::encode(clinic)));
        }
        if let Some(status) = filter.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from) = filter.from {
            query_parts.push(format!("date=gte.{}", urlencoding::encode(&from.to_rfc3339())));
        }
        if let Some(to) = filter.to {
            query_parts.push(format!("date=lt.{}", urlencoding::encode(&to.to_rfc3339())));
        }
        query_parts.push("order=date.asc".to_string());

        query_parts.join("&")
    }
}

fn backend_error(err: anyhow::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert_if_slot_free(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        debug!("Inserting appointment {} into Supabase", appointment.id);

        let body = serde_json::to_value(&appointment)
            .map_err(|e| StoreError::Backend(format!("Failed to serialize appointment: {}", e)))?;

        let result: Result<Vec<Value>, anyhow::Error> = self.supabase.request_with_headers(
            Method::POST,
            APPOINTMENTS_PATH,
            None,
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await;

        let rows = match result {
            Ok(rows) => rows,
            Err(err) if matches!(err.downcast_ref::<SupabaseError>(), Some(SupabaseError::Conflict(_))) => {
                warn!("Unique slot index rejected appointment for doctor {} at {}", appointment.doctor_id, appointment.date);
                return Err(StoreError::SlotTaken);
            }
            Err(err) => return Err(backend_error(err)),
        };

        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("Insert returned no representation".to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_PATH, id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(backend_error)?;

        Ok(Self::parse_rows(rows)?.into_iter().next())
    }

    async fn update_if_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", APPOINTMENTS_PATH, id, expected);
        let body = serde_json::to_value(&patch)
            .map_err(|e| StoreError::Backend(format!("Failed to serialize patch: {}", e)))?;

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await.map_err(|err| match err.downcast_ref::<SupabaseError>() {
            Some(SupabaseError::Conflict(_)) => StoreError::SlotTaken,
            _ => backend_error(err),
        })?;

        if let Some(updated) = Self::parse_rows(rows)?.into_iter().next() {
            return Ok(updated);
        }

        // Nothing matched: either the row is gone or its status moved on.
        match self.get(id).await? {
            None => Err(StoreError::NotFound(id)),
            Some(current) => Err(StoreError::StatusChanged {
                expected,
                actual: current.status,
            }),
        }
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("{}?{}", APPOINTMENTS_PATH, Self::filter_query(filter));
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(backend_error)?;

        Self::parse_rows(rows)
    }
}
