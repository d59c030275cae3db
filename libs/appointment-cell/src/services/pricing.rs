use std::collections::HashMap;

use tracing::debug;

use shared_config::AppConfig;

/// Creation-time fee for an appointment. Starts as a flat default; clinic and
/// visit-type overrides can be layered on without touching the booking flow.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    default_price: f64,
    clinic_prices: HashMap<String, f64>,
    type_prices: HashMap<String, f64>,
}

impl PricingPolicy {
    pub fn flat(default_price: f64) -> Self {
        Self {
            default_price,
            clinic_prices: HashMap::new(),
            type_prices: HashMap::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::flat(config.default_appointment_price)
    }

    pub fn with_clinic_price(mut self, clinic: &str, price: f64) -> Self {
        self.clinic_prices.insert(clinic.to_string(), price);
        self
    }

    /// Type keys are matched case-insensitively.
    pub fn with_type_price(mut self, appointment_type: &str, price: f64) -> Self {
        self.type_prices.insert(appointment_type.trim().to_lowercase(), price);
        self
    }

    pub fn default_price(&self) -> f64 {
        self.default_price
    }

    /// Type override, then clinic override, then the flat default.
    pub fn price_for(&self, clinic: &str, appointment_type: &str) -> f64 {
        let price = self.type_prices
            .get(&appointment_type.trim().to_lowercase())
            .or_else(|| self.clinic_prices.get(clinic))
            .copied()
            .unwrap_or(self.default_price);

        debug!("Priced {} appointment at {} as {:.2}", appointment_type, clinic, price);
        price
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self::flat(shared_config::DEFAULT_APPOINTMENT_PRICE)
    }
}
