use miniblog::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    mailer::{LogMailer, MailerState, SmtpMailer},
    repository::{PostgresRepository, RepositoryState},
    session,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database, mailer, then the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging filter: RUST_LOG wins, otherwise development defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "miniblog=debug,tower_http=info,axum=trace".into());

    // 3. Log format per environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let (session_store, session_sweeper) = session::postgres_store(pool.clone())
        .await
        .expect("FATAL: Failed to prepare the session store.");

    let postgres = PostgresRepository::new(pool);
    postgres
        .migrate()
        .await
        .expect("FATAL: Failed to apply database migrations.");
    let repo = Arc::new(postgres) as RepositoryState;

    // 5. Mailer: SMTP when configured, otherwise messages go to the log.
    let mailer = match &config.smtp {
        Some(smtp) => {
            let smtp_mailer = SmtpMailer::new(smtp, &config.email_from)
                .expect("FATAL: Invalid SMTP configuration.");
            tracing::info!(host = %smtp.host, port = smtp.port, "SMTP mailer configured");
            Arc::new(smtp_mailer) as MailerState
        }
        None => {
            tracing::warn!("SMTP_HOST not set; notifications will only be logged");
            Arc::new(LogMailer::new(&config.email_from)) as MailerState
        }
    };

    // 6. Shared state and router
    let bind_addr = config.bind_addr.clone();
    let app = create_router(
        AppState {
            repo,
            mailer,
            config,
        },
        session_store,
    );

    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Listening on {}", listener.local_addr()?);
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app).await?;
    session_sweeper.abort();
    Ok(())
}
