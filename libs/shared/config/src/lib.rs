use std::env;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_APPOINTMENT_PRICE: f64 = 200.0;
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Which appointment store the API runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Supabase,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: Option<String>,
    pub store_backend: StoreBackend,
    pub clinic_schedules_path: Option<String>,
    pub default_appointment_price: f64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });
        let supabase_service_role_key = env::var("SUPABASE_SERVICE_ROLE_KEY").ok()
            .filter(|key| !key.is_empty());

        let default_appointment_price = match env::var("DEFAULT_APPOINTMENT_PRICE") {
            Ok(raw) => raw.parse::<f64>().ok()
                .filter(|price| price.is_finite() && *price >= 0.0)
                .unwrap_or_else(|| {
                    warn!("DEFAULT_APPOINTMENT_PRICE '{}' is not a valid price, using {}", raw, DEFAULT_APPOINTMENT_PRICE);
                    DEFAULT_APPOINTMENT_PRICE
                }),
            Err(_) => DEFAULT_APPOINTMENT_PRICE,
        };

        let server_port = env::var("SERVER_PORT").ok()
            .and_then(|raw| raw.parse::<u16>().ok())
            .unwrap_or(DEFAULT_SERVER_PORT);

        let mut config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret,
            supabase_service_role_key,
            store_backend: StoreBackend::Memory,
            clinic_schedules_path: env::var("CLINIC_SCHEDULES_PATH").ok(),
            default_appointment_price,
            server_port,
        };

        config.store_backend = match env::var("APPOINTMENT_STORE").ok().as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("supabase") => StoreBackend::Supabase,
            Some(other) => {
                warn!("Unknown APPOINTMENT_STORE '{}', picking backend from Supabase configuration", other);
                config.default_backend()
            }
            None => config.default_backend(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    fn default_backend(&self) -> StoreBackend {
        if self.is_configured() {
            StoreBackend::Supabase
        } else {
            warn!("Supabase not configured, appointments will be kept in memory");
            StoreBackend::Memory
        }
    }
}
