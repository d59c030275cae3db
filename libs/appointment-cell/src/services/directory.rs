// libs/appointment-cell/src/services/directory.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::PersonSummary;

/// Read-only source of patient and doctor display fields.
#[async_trait]
pub trait PeopleDirectory: Send + Sync {
    /// `None` when the person has no profile or the lookup failed; enrichment
    /// never fails a read.
    async fn summary(&self, person_id: Uuid) -> Option<PersonSummary>;
}

pub struct SupabasePeopleDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabasePeopleDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl PeopleDirectory for SupabasePeopleDirectory {
    async fn summary(&self, person_id: Uuid) -> Option<PersonSummary> {
        let path = format!("/rest/v1/profiles?id=eq.{}&select=id,full_name,email,phone", person_id);

        let rows: Vec<Value> = match self.supabase.request(Method::GET, &path, None, None).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Profile lookup for {} failed: {}", person_id, e);
                return None;
            }
        };

        let row = rows.into_iter().next()?;
        match serde_json::from_value::<PersonSummary>(row) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Profile for {} has an unexpected shape: {}", person_id, e);
                None
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryPeopleDirectory {
    people: RwLock<HashMap<Uuid, PersonSummary>>,
}

impl InMemoryPeopleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, summary: PersonSummary) {
        debug!("Registering profile {}", summary.id);
        self.people.write().await.insert(summary.id, summary);
    }
}

#[async_trait]
impl PeopleDirectory for InMemoryPeopleDirectory {
    async fn summary(&self, person_id: Uuid) -> Option<PersonSummary> {
        self.people.read().await.get(&person_id).cloned()
    }
}
