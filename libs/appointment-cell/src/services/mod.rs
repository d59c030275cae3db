pub mod authorization;
pub mod booking;
pub mod directory;
pub mod lifecycle;
pub mod pricing;
pub mod schedule;
pub mod slots;
pub mod store;
pub mod supabase_store;

pub use authorization::{authorize, grant, AppointmentAction, Grant};
pub use booking::AppointmentBookingService;
pub use directory::{InMemoryPeopleDirectory, PeopleDirectory, SupabasePeopleDirectory};
pub use lifecycle::{allowed_transitions, validate_status_transition, AppointmentLifecycleService};
pub use pricing::PricingPolicy;
pub use schedule::{ClinicScheduleRegistry, ScheduleConfigError};
pub use slots::SlotAvailabilityCalculator;
pub use store::{AppointmentStore, InMemoryAppointmentStore, StoreError};
pub use supabase_store::SupabaseAppointmentStore;
