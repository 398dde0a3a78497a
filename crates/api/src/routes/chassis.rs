use axum::routing::get;
use axum::Router;

use crate::handlers::stream;
use crate::state::AppState;

/// Routes mounted at `/redfish/v1/Chassis/1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/Thermal", get(stream::thermal_stream))
}
