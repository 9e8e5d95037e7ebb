use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Self-scoped routes. The auth layer above guarantees a verified token;
/// each handler then refuses any `{email}` that is not the caller's own,
/// whatever the caller's role.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /users/admin/{email}
        // Whether the caller holds the admin role.
        .route("/users/admin/{target}", get(handlers::admin_status))
        // GET /payments/{email}
        // The caller's payment history.
        .route("/payments/{email}", get(handlers::list_payments))
}
