use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::AppointmentStatus;

/// Which appointments a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinanceScope {
    All,
    Doctor(Uuid),
}

impl FinanceScope {
    pub fn doctor_id(&self) -> Option<Uuid> {
        match self {
            FinanceScope::All => None,
            FinanceScope::Doctor(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinanceStatsQuery {
    #[serde(alias = "doctorId")]
    pub doctor_id: Option<Uuid>,
}

/// Completed-appointment revenue for one clinic-local calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub revenue: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceStats {
    pub total_revenue: f64,
    /// Every status is present, zero when unused.
    pub counts_by_status: BTreeMap<AppointmentStatus, u64>,
    /// Ascending by (year, month).
    pub monthly_breakdown: Vec<MonthlyRevenue>,
}

impl FinanceStats {
    pub fn empty() -> Self {
        Self {
            total_revenue: 0.0,
            counts_by_status: AppointmentStatus::ALL.iter().map(|status| (*status, 0)).collect(),
            monthly_breakdown: Vec::new(),
        }
    }
}
