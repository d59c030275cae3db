// libs/appointment-cell/src/services/schedule.rs
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::models::ClinicSchedule;

#[derive(Error, Debug)]
pub enum ScheduleConfigError {
    #[error("Failed to read clinic schedules from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Clinic schedules are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Clinic schedule table is empty")]
    Empty,

    #[error("Invalid schedule for clinic '{clinic}': {reason}")]
    Invalid { clinic: String, reason: String },
}

impl ClinicSchedule {
    pub fn offset(&self) -> FixedOffset {
        // Offsets are range-checked when the registry is built.
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn operates_on(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self.operating_weekdays.contains(&weekday)
    }

    pub fn local_datetime(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset()).naive_local()
    }

    /// The UTC instant of a wall-clock time at this clinic.
    pub fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.offset()
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|local| local.with_timezone(&Utc))
    }

    fn validate(&self, clinic: &str) -> Result<(), ScheduleConfigError> {
        let invalid = |reason: String| ScheduleConfigError::Invalid {
            clinic: clinic.to_string(),
            reason,
        };

        if clinic.trim().is_empty() {
            return Err(invalid("clinic name is empty".to_string()));
        }
        if self.operating_weekdays.is_empty() {
            return Err(invalid("no operating weekdays".to_string()));
        }
        if let Some(day) = self.operating_weekdays.iter().find(|day| **day > 6) {
            return Err(invalid(format!("weekday {} is outside 0 (Sunday) to 6 (Saturday)", day)));
        }
        if self.start_hour >= self.end_hour || self.end_hour > 24 {
            return Err(invalid(format!(
                "operating window {}:00-{}:00 is not a forward range within one day",
                self.start_hour, self.end_hour
            )));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid(format!("UTC offset {} minutes is out of range", self.utc_offset_minutes)));
        }
        Ok(())
    }
}

/// Static lookup of clinic name to weekly operating window. Built once at
/// startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ClinicScheduleRegistry {
    schedules: BTreeMap<String, ClinicSchedule>,
}

impl ClinicScheduleRegistry {
    pub fn new(schedules: BTreeMap<String, ClinicSchedule>) -> Result<Self, ScheduleConfigError> {
        if schedules.is_empty() {
            return Err(ScheduleConfigError::Empty);
        }
        for (clinic, schedule) in &schedules {
            schedule.validate(clinic)?;
        }
        Ok(Self { schedules })
    }

    /// Built-in clinic table used when no schedule file is configured.
    pub fn with_defaults() -> Self {
        let mut schedules = BTreeMap::new();
        schedules.insert(
            "Janaklees".to_string(),
            ClinicSchedule {
                // Saturday, Monday, Wednesday
                operating_weekdays: BTreeSet::from([6, 1, 3]),
                start_hour: 18,
                end_hour: 22,
                utc_offset_minutes: 120,
            },
        );
        schedules.insert(
            "Smouha".to_string(),
            ClinicSchedule {
                // Sunday, Tuesday, Thursday
                operating_weekdays: BTreeSet::from([0, 2, 4]),
                start_hour: 17,
                end_hour: 21,
                utc_offset_minutes: 120,
            },
        );
        Self { schedules }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ScheduleConfigError> {
        let schedules: BTreeMap<String, ClinicSchedule> = serde_json::from_str(raw)?;
        Self::new(schedules)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScheduleConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ScheduleConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ScheduleConfigError> {
        match &config.clinic_schedules_path {
            Some(path) => {
                let registry = Self::from_json_file(path)?;
                info!("Loaded {} clinic schedules from {}", registry.schedules.len(), path);
                Ok(registry)
            }
            None => {
                debug!("CLINIC_SCHEDULES_PATH not set, using built-in clinic schedules");
                Ok(Self::with_defaults())
            }
        }
    }

    /// Unknown clinics are `None`, never an error.
    pub fn lookup(&self, clinic_name: &str) -> Option<&ClinicSchedule> {
        self.schedules.get(clinic_name)
    }

    pub fn clinic_names(&self) -> impl Iterator<Item = &str> {
        self.schedules.keys().map(String::as_str)
    }

    pub fn schedules(&self) -> &BTreeMap<String, ClinicSchedule> {
        &self.schedules
    }

    /// Calendar month of an instant as seen at the clinic; UTC for unknown clinics.
    pub fn local_year_month(&self, clinic_name: &str, instant: DateTime<Utc>) -> (i32, u32) {
        let local = match self.lookup(clinic_name) {
            Some(schedule) => schedule.local_datetime(instant),
            None => instant.naive_utc(),
        };
        (local.year(), local.month())
    }
}

impl Default for ClinicScheduleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn janaklees_runs_saturday_monday_wednesday_evenings() {
        let registry = ClinicScheduleRegistry::with_defaults();
        let schedule = registry.lookup("Janaklees").unwrap();

        assert_eq!(schedule.start_hour, 18);
        assert_eq!(schedule.end_hour, 22);
        // 2030-01-05 is a Saturday, 2030-01-08 a Tuesday.
        assert!(schedule.operates_on(NaiveDate::from_ymd_opt(2030, 1, 5).unwrap()));
        assert!(!schedule.operates_on(NaiveDate::from_ymd_opt(2030, 1, 8).unwrap()));
    }

    #[test]
    fn unknown_clinic_is_none() {
        assert!(ClinicScheduleRegistry::with_defaults().lookup("Atlantis").is_none());
    }

    #[test]
    fn local_wall_time_round_trips_through_offset() {
        let registry = ClinicScheduleRegistry::with_defaults();
        let schedule = registry.lookup("Janaklees").unwrap();
        let date = NaiveDate::from_ymd_opt(2030, 1, 5).unwrap();
        let six_pm = NaiveTime::from_hms_opt(18, 0, 0).unwrap();

        let instant = schedule.instant_at(date, six_pm).unwrap();
        assert_eq!(instant.to_rfc3339(), "2030-01-05T16:00:00+00:00");
        assert_eq!(schedule.local_datetime(instant), date.and_time(six_pm));
    }

    #[test]
    fn rejects_inverted_windows_and_bad_weekdays() {
        let inverted = r#"{"Night": {"operating_weekdays": [1], "start_hour": 22, "end_hour": 18}}"#;
        assert!(matches!(
            ClinicScheduleRegistry::from_json_str(inverted),
            Err(ScheduleConfigError::Invalid { .. })
        ));

        let bad_day = r#"{"Week": {"operating_weekdays": [7], "start_hour": 9, "end_hour": 17}}"#;
        assert!(matches!(
            ClinicScheduleRegistry::from_json_str(bad_day),
            Err(ScheduleConfigError::Invalid { .. })
        ));

        assert!(matches!(ClinicScheduleRegistry::from_json_str("{}"), Err(ScheduleConfigError::Empty)));
    }

    #[test]
    fn loads_schedule_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Downtown": {{"operating_weekdays": [1, 2], "start_hour": 9, "end_hour": 12, "utc_offset_minutes": -300}}}}"#
        )
        .unwrap();

        let registry = ClinicScheduleRegistry::from_json_file(file.path()).unwrap();
        let schedule = registry.lookup("Downtown").unwrap();
        assert_eq!(schedule.utc_offset_minutes, -300);
        assert_eq!(registry.clinic_names().collect::<Vec<_>>(), vec!["Downtown"]);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ClinicScheduleRegistry::from_json_file("/nonexistent/clinics.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/clinics.json"));
    }
}
