// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use tracing::info;

use shared_config::{AppConfig, StoreBackend};
use shared_database::supabase::SupabaseClient;

use crate::services::directory::{InMemoryPeopleDirectory, PeopleDirectory, SupabasePeopleDirectory};
use crate::services::pricing::PricingPolicy;
use crate::services::schedule::{ClinicScheduleRegistry, ScheduleConfigError};
use crate::services::store::{AppointmentStore, InMemoryAppointmentStore};
use crate::services::supabase_store::SupabaseAppointmentStore;

/// Shared handles for the scheduling routes. Built once at startup.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ClinicScheduleRegistry>,
    pub store: Arc<dyn AppointmentStore>,
    pub directory: Arc<dyn PeopleDirectory>,
    pub pricing: Arc<PricingPolicy>,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<ClinicScheduleRegistry>,
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn PeopleDirectory>,
        pricing: Arc<PricingPolicy>,
    ) -> Self {
        Self { config, registry, store, directory, pricing }
    }

    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, ScheduleConfigError> {
        let registry = Arc::new(ClinicScheduleRegistry::from_config(&config)?);
        let pricing = Arc::new(PricingPolicy::from_config(&config));

        let (store, directory): (Arc<dyn AppointmentStore>, Arc<dyn PeopleDirectory>) = match config.store_backend {
            StoreBackend::Supabase => {
                info!("Using Supabase appointment store at {}", config.supabase_url);
                let supabase = Arc::new(SupabaseClient::new(&config));
                (
                    Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
                    Arc::new(SupabasePeopleDirectory::new(supabase)),
                )
            }
            StoreBackend::Memory => {
                info!("Using in-memory appointment store");
                (Arc::new(InMemoryAppointmentStore::new()), Arc::new(InMemoryPeopleDirectory::new()))
            }
        };

        Ok(Self::new(config, registry, store, directory, pricing))
    }

    /// In-memory state with the built-in clinic table.
    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        let pricing = Arc::new(PricingPolicy::from_config(&config));
        Self::new(
            config,
            Arc::new(ClinicScheduleRegistry::with_defaults()),
            Arc::new(InMemoryAppointmentStore::new()),
            Arc::new(InMemoryPeopleDirectory::new()),
            pricing,
        )
    }
}
