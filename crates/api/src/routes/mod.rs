pub mod chassis;
pub mod health;
pub mod systems;

use axum::Router;

use crate::state::AppState;

/// Build the `/redfish/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /Systems/1/Processors/Power      CPU power snapshot
/// /Systems/1/Memory/Power          memory power snapshot
/// /Chassis/1/Thermal               live telemetry stream
/// ```
///
/// Only a single node is served, so system and chassis ids are fixed to `1`.
pub fn redfish_routes() -> Router<AppState> {
    Router::new()
        .nest("/Systems/1", systems::router())
        .nest("/Chassis/1", chassis::router())
}
