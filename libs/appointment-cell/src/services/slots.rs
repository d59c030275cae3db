// libs/appointment-cell/src/services/slots.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use tracing::debug;

use crate::models::{Appointment, AppointmentError, Slot, SlotAvailability};
use crate::services::schedule::ClinicScheduleRegistry;

pub const SLOT_MINUTES: i64 = 30;

/// Accepts `YYYY-MM-DD`, or a full RFC 3339 timestamp whose calendar date is used as written.
pub fn parse_slot_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| AppointmentError::Validation(format!("Invalid date: '{}'", raw)))
}

pub struct SlotAvailabilityCalculator {
    registry: Arc<ClinicScheduleRegistry>,
}

impl SlotAvailabilityCalculator {
    pub fn new(registry: Arc<ClinicScheduleRegistry>) -> Self {
        Self { registry }
    }

    /// Every 30-minute start inside the clinic's window on that date, in order.
    /// Empty for unknown clinics and closed weekdays.
    pub fn compute_candidate_slots(&self, clinic_name: &str, date: NaiveDate) -> Vec<Slot> {
        let Some(schedule) = self.registry.lookup(clinic_name) else {
            debug!("No schedule for clinic '{}'", clinic_name);
            return Vec::new();
        };
        if !schedule.operates_on(date) {
            debug!("Clinic '{}' is closed on {}", clinic_name, date);
            return Vec::new();
        }

        let opening = i64::from(schedule.start_hour) * 60;
        let closing = i64::from(schedule.end_hour) * 60;

        (0..)
            .map(|index| opening + index * SLOT_MINUTES)
            .take_while(|minute| minute + SLOT_MINUTES <= closing)
            .filter_map(|minute| NaiveTime::from_hms_opt((minute / 60) as u32, (minute % 60) as u32, 0))
            .map(|time| Slot { time })
            .collect()
    }

    /// Flags each slot unavailable when an appointment at this clinic falls on
    /// the same local date and hour:minute. Status is not inspected here; callers
    /// pass only the appointments that should block.
    pub fn annotate_availability(
        &self,
        clinic_name: &str,
        date: NaiveDate,
        slots: &[Slot],
        booked: &[Appointment],
    ) -> Vec<SlotAvailability> {
        let taken: HashSet<(u32, u32)> = match self.registry.lookup(clinic_name) {
            Some(schedule) => booked
                .iter()
                .filter(|appointment| appointment.clinic_location == clinic_name)
                .map(|appointment| schedule.local_datetime(appointment.date))
                .filter(|local| local.date() == date)
                .map(|local| (local.hour(), local.minute()))
                .collect(),
            None => HashSet::new(),
        };

        slots
            .iter()
            .map(|slot| SlotAvailability {
                time: slot.time,
                available: !taken.contains(&(slot.time.hour(), slot.time.minute())),
            })
            .collect()
    }

    /// UTC range `[start, end)` covering the clinic's local calendar day.
    pub fn local_day_bounds(&self, clinic_name: &str, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let schedule = self.registry.lookup(clinic_name)?;
        let start = schedule.instant_at(date, NaiveTime::from_hms_opt(0, 0, 0)?)?;
        Some((start, start + Duration::days(1)))
    }

    /// Whether an instant lands exactly on one of the clinic's candidate slots.
    pub fn is_candidate_slot(&self, clinic_name: &str, instant: DateTime<Utc>) -> bool {
        let Some(schedule) = self.registry.lookup(clinic_name) else {
            return false;
        };
        let local = schedule.local_datetime(instant);
        self.compute_candidate_slots(clinic_name, local.date())
            .iter()
            .any(|slot| slot.time == local.time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn calculator() -> SlotAvailabilityCalculator {
        SlotAvailabilityCalculator::new(Arc::new(ClinicScheduleRegistry::with_defaults()))
    }

    fn saturday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 5).unwrap()
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn booked_at(clinic: &str, date: DateTime<Utc>) -> Appointment {
        Appointment::new(Uuid::new_v4(), Uuid::new_v4(), date, clinic.to_string(), "checkup".to_string(), 200.0)
    }

    #[test]
    fn eight_half_hour_slots_on_an_operating_day() {
        let slots = calculator().compute_candidate_slots("Janaklees", saturday());
        let times: Vec<String> = slots.iter().map(|s| s.time.format("%H:%M").to_string()).collect();

        assert_eq!(
            times,
            vec!["18:00", "18:30", "19:00", "19:30", "20:00", "20:30", "21:00", "21:30"]
        );
    }

    #[test]
    fn closed_day_and_unknown_clinic_are_empty() {
        let tuesday = NaiveDate::from_ymd_opt(2030, 1, 8).unwrap();
        assert!(calculator().compute_candidate_slots("Janaklees", tuesday).is_empty());
        assert!(calculator().compute_candidate_slots("Nowhere", saturday()).is_empty());
    }

    #[test]
    fn candidate_slots_are_deterministic() {
        let calc = calculator();
        assert_eq!(
            calc.compute_candidate_slots("Janaklees", saturday()),
            calc.compute_candidate_slots("Janaklees", saturday())
        );
    }

    #[test]
    fn booked_slot_matches_on_clinic_local_time() {
        let calc = calculator();
        let slots = calc.compute_candidate_slots("Janaklees", saturday());
        // 16:00 UTC is 18:00 at a UTC+2 clinic.
        let booked = vec![booked_at("Janaklees", "2030-01-05T16:00:00Z".parse().unwrap())];

        let annotated = calc.annotate_availability("Janaklees", saturday(), &slots, &booked);

        assert_eq!(annotated[0], SlotAvailability { time: hm(18, 0), available: false });
        assert!(annotated[1..].iter().all(|slot| slot.available));
        assert_eq!(annotated.len(), 8);
    }

    #[test]
    fn other_clinics_and_days_do_not_block() {
        let calc = calculator();
        let slots = calc.compute_candidate_slots("Janaklees", saturday());
        let booked = vec![
            booked_at("Smouha", "2030-01-05T16:00:00Z".parse().unwrap()),
            booked_at("Janaklees", "2030-01-07T16:00:00Z".parse().unwrap()),
        ];

        let annotated = calc.annotate_availability("Janaklees", saturday(), &slots, &booked);
        assert!(annotated.iter().all(|slot| slot.available));
    }

    #[test]
    fn only_exact_slot_starts_are_candidates() {
        let calc = calculator();
        assert!(calc.is_candidate_slot("Janaklees", "2030-01-05T19:30:00Z".parse().unwrap()));
        assert!(!calc.is_candidate_slot("Janaklees", "2030-01-05T16:10:00Z".parse().unwrap()));
        // 20:00 UTC is 22:00 local, the closing time.
        assert!(!calc.is_candidate_slot("Janaklees", "2030-01-05T20:00:00Z".parse().unwrap()));
        assert!(!calc.is_candidate_slot("Nowhere", "2030-01-05T16:00:00Z".parse().unwrap()));
    }

    #[test]
    fn local_day_bounds_follow_clinic_offset() {
        let (start, end) = calculator().local_day_bounds("Janaklees", saturday()).unwrap();
        assert_eq!(start.to_rfc3339(), "2030-01-04T22:00:00+00:00");
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn parses_plain_and_timestamp_dates() {
        assert_eq!(parse_slot_date("2030-01-05").unwrap(), saturday());
        assert_eq!(parse_slot_date("2030-01-05T10:00:00+02:00").unwrap(), saturday());
        assert!(matches!(parse_slot_date("05/01/2030"), Err(AppointmentError::Validation(_))));
    }
}
