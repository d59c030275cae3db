use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use appointment_cell::models::{Appointment, AppointmentError, AppointmentFilter, AppointmentStatus};
use appointment_cell::services::schedule::ClinicScheduleRegistry;
use appointment_cell::services::store::AppointmentStore;
use appointment_cell::state::AppointmentState;

use crate::models::{FinanceScope, FinanceStats, MonthlyRevenue};

/// Read-only revenue reporting. Every call reads the store afresh.
pub struct FinanceAggregator {
    store: Arc<dyn AppointmentStore>,
    registry: Arc<ClinicScheduleRegistry>,
}

impl FinanceAggregator {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            registry: Arc::clone(&state.registry),
        }
    }

    pub async fn compute_stats(&self, scope: FinanceScope) -> Result<FinanceStats, AppointmentError> {
        debug!("Computing finance stats for {:?}", scope);

        let filter = AppointmentFilter {
            doctor_id: scope.doctor_id(),
            ..AppointmentFilter::default()
        };
        let appointments = self.store.list(&filter).await?;

        Ok(self.summarize(&appointments))
    }

    fn summarize(&self, appointments: &[Appointment]) -> FinanceStats {
        let mut stats = FinanceStats::empty();
        let mut months: BTreeMap<(i32, u32), MonthlyRevenue> = BTreeMap::new();

        for appointment in appointments {
            *stats.counts_by_status.entry(appointment.status).or_insert(0) += 1;

            if appointment.status != AppointmentStatus::Completed {
                continue;
            }

            stats.total_revenue += appointment.price;

            let (year, month) = self.registry.local_year_month(&appointment.clinic_location, appointment.date);
            let bucket = months.entry((year, month)).or_insert(MonthlyRevenue {
                year,
                month,
                revenue: 0.0,
                count: 0,
            });
            bucket.revenue += appointment.price;
            bucket.count += 1;
        }

        stats.monthly_breakdown = months.into_values().collect();
        stats
    }
}
