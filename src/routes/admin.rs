use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Admin Router Module
///
/// Routes restricted to users whose stored role is `admin`. The whole router
/// is wrapped in the admin layer, which authenticates (401) and then re-reads
/// the caller's user record on every request (403 when not an admin).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- User Management ---
        // GET /users
        .route("/users", get(handlers::list_users))
        // GET/DELETE /users/{id}
        .route(
            "/users/{id}",
            get(handlers::get_user).delete(handlers::delete_user),
        )
        // PATCH /users/admin/{id}
        // Promotion to admin. Idempotent. Shares its path pattern with the
        // self-scoped `GET /users/admin/{email}`, so the segment name must match.
        .route("/users/admin/{target}", patch(handlers::promote_user))
        // --- Menu Management ---
        // POST /menu
        .route("/menu", post(handlers::create_menu_item))
        // PATCH/DELETE /menu/{id}
        .route(
            "/menu/{id}",
            patch(handlers::update_menu_item).delete(handlers::delete_menu_item),
        )
        // --- Analytics ---
        // GET /admin-stats
        .route("/admin-stats", get(handlers::admin_stats))
        // GET /order-stats
        // Quantity and revenue per menu category across all payments.
        .route("/order-stats", get(handlers::order_stats))
}
