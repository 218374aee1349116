pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route(
            "/orders/:id",
            get(handlers::orders::get_order).patch(handlers::orders::update_order_status),
        )
        .route("/wallet/me", get(handlers::wallet::me))
        .route("/wallet/transactions", get(handlers::wallet::transactions))
        .route("/wallet/add-funds", post(handlers::wallet::add_funds))
        .route("/audit/reconcile", get(handlers::audit::reconcile))
        .route("/audit/balance", get(handlers::audit::balance))
        .route("/audit/export", get(handlers::audit::export))
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
