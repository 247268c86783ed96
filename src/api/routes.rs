//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_object_handler, expire_handler, fields_handler, health_handler, preview_handler,
    put_object_handler, read_handler, recalculate_handler, record_handler, stale_handler,
    stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /objects/:model/:id` - Store a host object
/// - `DELETE /objects/:model/:id` - Delete a host object and its records
/// - `GET /objects/:model/:id/:field` - Read a cached field
/// - `GET /objects/:model/:id/:field/record` - Raw auxiliary record
/// - `GET /objects/:model/:id/:field/preview` - Compute without writing
/// - `POST /objects/:model/:id/:field/recalculate` - Recalculate in-line
/// - `POST /objects/:model/:id/:field/stale` - Flag as stale
/// - `POST /objects/:model/:id/:field/expire` - Set the expiration
/// - `GET /fields` - Registered cached fields
/// - `GET /stats` - Recalculation statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/objects/:model/:id",
            put(put_object_handler).delete(delete_object_handler),
        )
        .route("/objects/:model/:id/:field", get(read_handler))
        .route("/objects/:model/:id/:field/record", get(record_handler))
        .route("/objects/:model/:id/:field/preview", get(preview_handler))
        .route(
            "/objects/:model/:id/:field/recalculate",
            post(recalculate_handler),
        )
        .route("/objects/:model/:id/:field/stale", post(stale_handler))
        .route("/objects/:model/:id/:field/expire", post(expire_handler))
        .route("/fields", get(fields_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
