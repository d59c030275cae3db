use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, schedule_routes};
use appointment_cell::state::AppointmentState;
use finance_cell::router::finance_routes;

pub fn create_router(state: AppointmentState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .merge(schedule_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/finance-stats", finance_routes(state))
}
