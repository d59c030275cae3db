use axum::{
    Router,
    routing::get,
    middleware,
};

use appointment_cell::state::AppointmentState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn finance_routes(state: AppointmentState) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::get_finance_stats))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
