use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde_json::{json, Value};

use appointment_cell::models::{AppointmentError, Parties};
use appointment_cell::services::authorization::{authorize, AppointmentAction};
use appointment_cell::state::AppointmentState;
use shared_models::auth::{Actor, Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::actor_from_user;

use crate::models::{FinanceScope, FinanceStatsQuery};
use crate::services::FinanceAggregator;

/// Management sees everything unless it narrows to a doctor; a doctor only
/// ever sees their own figures.
pub fn resolve_scope(actor: &Actor, query: &FinanceStatsQuery) -> Result<FinanceScope, AppointmentError> {
    let scope = match (query.doctor_id, actor.role) {
        (Some(doctor_id), _) => FinanceScope::Doctor(doctor_id),
        (None, Role::Doctor) => FinanceScope::Doctor(actor.id),
        (None, _) => FinanceScope::All,
    };

    let parties = match scope {
        FinanceScope::Doctor(doctor_id) => Parties::doctor(doctor_id),
        FinanceScope::All => Parties::default(),
    };
    authorize(actor, AppointmentAction::ViewFinance, &parties)?;

    Ok(scope)
}

#[axum::debug_handler]
pub async fn get_finance_stats(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(query): Query<FinanceStatsQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let scope = resolve_scope(&actor, &query)?;

    let aggregator = FinanceAggregator::new(&state);
    let stats = aggregator.compute_stats(scope).await?;

    Ok(Json(json!(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    #[test]
    fn doctor_defaults_to_own_scope_and_cannot_widen_it() {
        let doctor = Actor::doctor(Uuid::new_v4());

        assert_eq!(resolve_scope(&doctor, &FinanceStatsQuery::default()), Ok(FinanceScope::Doctor(doctor.id)));
        assert_matches!(
            resolve_scope(&doctor, &FinanceStatsQuery { doctor_id: Some(Uuid::new_v4()) }),
            Err(AppointmentError::Forbidden(_))
        );
    }

    #[test]
    fn management_may_narrow_to_any_doctor() {
        let management = Actor::management(Uuid::new_v4());
        let doctor_id = Uuid::new_v4();

        assert_eq!(resolve_scope(&management, &FinanceStatsQuery::default()), Ok(FinanceScope::All));
        assert_eq!(
            resolve_scope(&management, &FinanceStatsQuery { doctor_id: Some(doctor_id) }),
            Ok(FinanceScope::Doctor(doctor_id))
        );
    }

    #[test]
    fn patients_have_no_finance_view() {
        let patient = Actor::patient(Uuid::new_v4());

        assert_matches!(resolve_scope(&patient, &FinanceStatsQuery::default()), Err(AppointmentError::Forbidden(_)));
    }
}
