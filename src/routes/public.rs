use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token: the storefront reads, the cart,
/// checkout, registration and token issuance itself.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Liveness banner kept for existing monitors.
        .route("/", get(|| async { "Bistro Boss Server is running" }))
        // GET /health
        .route("/health", get(|| async { "ok" }))
        // POST /jwt
        // Signs the submitted claim into a one-hour identity token.
        .route("/jwt", post(handlers::issue_token))
        // POST /users
        // Registration. Deduplicated by email before insert.
        .route("/users", post(handlers::register_user))
        // GET /menu, GET /menu/{id}
        .route("/menu", get(handlers::list_menu))
        .route("/menu/{id}", get(handlers::get_menu_item))
        // GET /reviews
        .route("/reviews", get(handlers::list_reviews))
        // GET /carts?email=..., POST /carts, DELETE /carts/{id}
        .route(
            "/carts",
            get(handlers::list_cart).post(handlers::add_cart_item),
        )
        .route("/carts/{id}", delete(handlers::remove_cart_item))
        // POST /create-payment-intent
        // Opens a card payment intent at the gateway and returns its client secret.
        .route(
            "/create-payment-intent",
            post(handlers::create_payment_intent),
        )
        // POST /payments
        // Records a completed payment and clears the paid cart lines.
        .route("/payments", post(handlers::record_payment))
}
