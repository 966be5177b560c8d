use crate::state::AppState;
use axum::Router;

pub mod cookies;
pub mod dto;
pub mod handlers;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
