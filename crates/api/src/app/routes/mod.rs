use axum::Router;

pub mod stock;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new().nest("/stock", stock::router())
}
