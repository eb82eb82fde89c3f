//! Server-side sessions.
//!
//! The session only carries the home page visit counter. Production keeps records in
//! Postgres and purges expired ones in a background task; tests plug in the memory store.

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tower_sessions::{
    ExpiredDeletion, Expiry, SessionManagerLayer, SessionStore,
    cookie::{SameSite, time::Duration},
};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::Env;

/// Idle lifetime of a session, refreshed on every request that touches it.
pub const SESSION_EXPIRY_HOURS: i64 = 24;

/// How often the Postgres store sweeps expired records.
pub const EXPIRED_SWEEP_SECS: u64 = 60;

/// session_layer
///
/// Cookie settings shared by every store. The cookie is `Secure` in production only, so
/// plain-HTTP local runs still get a session.
pub fn session_layer<S>(store: S, env: Env) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_secure(env == Env::Production)
        .with_http_only(true)
        .with_same_site(SameSite::Strict)
        .with_expiry(Expiry::OnInactivity(Duration::hours(SESSION_EXPIRY_HOURS)))
}

/// postgres_store
///
/// Creates the session table if needed and starts the expired-record sweeper.
pub async fn postgres_store(
    pool: PgPool,
) -> Result<(PostgresStore, JoinHandle<tower_sessions::session_store::Result<()>>), sqlx::Error>
{
    let store = PostgresStore::new(pool);
    store.migrate().await?;

    let sweeper = tokio::task::spawn(
        store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(EXPIRED_SWEEP_SECS)),
    );
    Ok((store, sweeper))
}
