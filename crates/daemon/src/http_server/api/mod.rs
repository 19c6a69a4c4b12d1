use axum::Router;

pub mod fs;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/fs", fs::router(state.clone()))
        .with_state(state)
}
