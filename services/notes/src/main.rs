use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::cache::{RedisConfig, RedisPool};
use common::database::{self, DatabaseConfig};

use notes::AppState;
use notes::account::{AccountService, LogMailer};
use notes::config::{AppConfig, SessionBackend, StoreBackend, UserBackend};
use notes::oauth::{FacebookOAuth, OAuthConfig};
use notes::repositories::{MemoryUserRepository, PgUserRepository, UserRepository};
use notes::routes;
use notes::session::{MemorySessionStore, RedisSessionStore, SessionStore};
use notes::store::{
    FsNoteStore, MemoryNoteStore, NoteEvents, NoteStore, PgNoteStore, RedisNoteStore,
    SqliteNoteStore, compose,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting notes service");

    let config = AppConfig::load()?;

    // Shared engine handles, created once per process
    let needs_pg = config.store.backend == StoreBackend::Postgres
        || config.auth.user_backend == UserBackend::Postgres;
    let pg_pool = if needs_pg {
        let db_config = DatabaseConfig {
            url: config.database.url.clone(),
            max_connections: config.database.max_connections,
        };
        let pool = database::init_pool(&db_config).await?;
        if database::health_check(&pool).await? {
            info!("Database connection successful");
        } else {
            anyhow::bail!("Failed to connect to database");
        }
        Some(pool)
    } else {
        None
    };

    let needs_redis = config.store.backend == StoreBackend::Redis
        || config.session.backend == SessionBackend::Redis;
    let redis_pool = if needs_redis {
        let redis_config = RedisConfig {
            url: config.redis.url.clone(),
        };
        Some(RedisPool::new(&redis_config)?)
    } else {
        None
    };

    // Note store: configured backend wrapped with the timeout and event
    // decorators
    let events = NoteEvents::new();
    let timeout = Duration::from_secs(config.store.op_timeout_secs);
    let note_store: Arc<dyn NoteStore> = match config.store.backend {
        StoreBackend::Memory => compose(MemoryNoteStore::new(), timeout, events.clone()),
        StoreBackend::Fs => compose(
            FsNoteStore::open(&config.store.fs_dir).await?,
            timeout,
            events.clone(),
        ),
        StoreBackend::Redis => compose(
            RedisNoteStore::new(redis_pool.clone().ok_or_else(|| anyhow::anyhow!("redis pool required"))?),
            timeout,
            events.clone(),
        ),
        StoreBackend::Sqlite => compose(
            SqliteNoteStore::open(&config.store.sqlite_path).await?,
            timeout,
            events.clone(),
        ),
        StoreBackend::Postgres => {
            let store = PgNoteStore::new(pg_pool.clone().ok_or_else(|| anyhow::anyhow!("postgres pool required"))?);
            store.migrate().await?;
            compose(store, timeout, events.clone())
        }
    };
    info!("note store backend: {:?}", config.store.backend);

    // Session store
    let sessions: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new(config.session.ttl_secs)),
        SessionBackend::Redis => Arc::new(RedisSessionStore::new(
            redis_pool.clone().ok_or_else(|| anyhow::anyhow!("redis pool required"))?,
            config.session.ttl_secs,
        )),
    };

    // User repository
    let users: Arc<dyn UserRepository> = match config.auth.user_backend {
        UserBackend::Memory => Arc::new(MemoryUserRepository::new()),
        UserBackend::Postgres => {
            let repo = PgUserRepository::new(pg_pool.clone().ok_or_else(|| anyhow::anyhow!("postgres pool required"))?);
            repo.migrate().await?;
            Arc::new(repo)
        }
    };

    let accounts = AccountService::new(
        users,
        sessions.clone(),
        Arc::new(LogMailer),
        config.auth.reset_token_ttl_secs,
        config.mail.base_url.clone(),
    );

    let oauth = match (&config.auth.facebook_client_id, &config.auth.facebook_client_secret) {
        (Some(client_id), Some(client_secret)) => Some(FacebookOAuth::new(&OAuthConfig {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_url: format!(
                "{}/auth/facebook/callback",
                config.mail.base_url.trim_end_matches('/')
            ),
        })?),
        _ => None,
    };

    let app_state = AppState {
        notes: note_store,
        sessions,
        accounts,
        events,
        oauth,
        cookie_name: config.session.cookie_name.clone(),
    };

    let app = routes::create_router(app_state);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Notes service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
