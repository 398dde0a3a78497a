use axum::routing::get;
use axum::Router;

use crate::handlers::power;
use crate::state::AppState;

/// Routes mounted at `/redfish/v1/Systems/1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/Processors/Power", get(power::cpu_power))
        .route("/Memory/Power", get(power::memory_power))
}
