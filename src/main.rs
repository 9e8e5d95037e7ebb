use bistro_server::{
    AppState, MockPaymentGateway, create_router,
    config::{AppConfig, Env},
    mailer::{LogMailer, MailerState, MailgunMailer},
    payments::{PaymentState, StripeGateway},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects the document store, picks
/// the external collaborators and serves the API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast in production)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging. RUST_LOG wins over the defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bistro_server=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Document store
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. External collaborators. Local runs without credentials use in-process fakes.
    let payments: PaymentState = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeGateway::new(key.clone())),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, using the mock payment gateway");
            Arc::new(MockPaymentGateway::new())
        }
    };

    let mailer: MailerState = match &config.mailgun {
        Some(mailgun) => Arc::new(MailgunMailer::new(mailgun.clone())),
        None => {
            tracing::warn!("Mailgun not configured, order confirmations will only be logged");
            Arc::new(LogMailer)
        }
    };

    // 5. Shared state and server
    let addr = format!("0.0.0.0:{}", config.port);
    let app = create_router(AppState::new(config, repo, payments, mailer));

    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {addr}");
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
