//! API Module
//!
//! HTTP handlers and routing for the cached field admin API.
//!
//! # Endpoints
//! - `PUT|DELETE /objects/:model/:id` - Host object upsert and delete
//! - `GET /objects/:model/:id/:field` - Read through the accessor
//! - `GET .../record`, `GET .../preview` - Inspect without side effects
//! - `POST .../recalculate`, `POST .../stale`, `POST .../expire` - Helpers
//! - `GET /fields` - Registered cached fields
//! - `GET /stats` - Recalculation statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
