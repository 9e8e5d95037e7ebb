use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod payments;
pub mod repository;

// Routers grouped by access tier (public, authenticated, admin).
pub mod routes;
use auth::{AdminUser, AuthUser, TokenCodec, TokenState};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use mailer::{MailerState, MockMailer};
pub use payments::{MockPaymentGateway, PaymentState};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document assembled from the `#[utoipa::path]` annotations,
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::issue_token, handlers::register_user, handlers::list_users,
        handlers::get_user, handlers::promote_user, handlers::delete_user,
        handlers::admin_status, handlers::list_menu, handlers::get_menu_item,
        handlers::create_menu_item, handlers::update_menu_item, handlers::delete_menu_item,
        handlers::list_reviews, handlers::list_cart, handlers::add_cart_item,
        handlers::remove_cart_item, handlers::create_payment_intent, handlers::record_payment,
        handlers::list_payments, handlers::admin_stats, handlers::order_stats
    ),
    components(
        schemas(
            models::UserRecord, models::TokenResponse, models::AdminStatus,
            models::InsertOutcome, models::UpdateOutcome, models::DeleteOutcome,
            models::MenuItemUpdate, models::PaymentIntentRequest, models::PaymentIntentResponse,
            models::PaymentReceipt, models::AdminStats, models::CategoryStat,
        )
    ),
    tags(
        (name = "bistro", description = "Bistro Boss ordering API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may touch, built once in `main` and injected into
/// every handler and extractor. All members are immutable or internally
/// shared (`Arc`), so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Document store.
    pub repo: RepositoryState,
    /// Token signer/verifier built from the configured secret.
    pub tokens: TokenState,
    /// Card payment gateway.
    pub payments: PaymentState,
    /// Order confirmation mailer.
    pub mailer: MailerState,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repo: RepositoryState,
        payments: PaymentState,
        mailer: MailerState,
    ) -> Self {
        let tokens = Arc::new(TokenCodec::new(&config.access_token_secret));
        Self {
            repo,
            tokens,
            payments,
            mailer,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Let the gate extractors pull only what they need out of the shared state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TokenState {
    fn from_ref(app_state: &AppState) -> TokenState {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated tier. Extracting `AuthUser` verifies the
/// bearer token and rejects with 401 before the handler runs; on success the
/// claims are left in the request extensions for the handler.
async fn auth_middleware(_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Gate for the admin tier: 401 without a valid token, 403 unless the
/// stored user record says `admin`, 503 if that record cannot be read in time.
async fn admin_middleware(admin: AdminUser, request: Request, next: Next) -> Response {
    tracing::debug!(email = %admin.email, "admin access granted");
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies the gate per tier and the
/// observability layers globally.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Request span carrying method, URI and the `x-request-id`, so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
