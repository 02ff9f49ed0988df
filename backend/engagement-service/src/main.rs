use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engagement_service::cache::{FastCache, RedisFastCache};
use engagement_service::config::{Config, DatabaseConfig, RedisConfig};
use engagement_service::handlers::{self, CronState, HealthState};
use engagement_service::repository::{CounterStore, PgCounterStore};
use engagement_service::services::CounterReconciler;
use engagement_service::workers::cache_heartbeat;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,engagement_service=debug".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Pool with statement caching off so it works behind PgBouncer, schema migrated
async fn connect_database(config: &DatabaseConfig) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(&config.url)
        .context("Failed to parse DATABASE_URL")?
        .statement_cache_capacity(0);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Failed to verify database connection")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

async fn connect_cache(config: &RedisConfig) -> Result<RedisFastCache> {
    let client =
        redis::Client::open(config.url.as_str()).context("Failed to create Redis client")?;
    let manager = redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    Ok(RedisFastCache::new(manager))
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        port = config.app.http_port,
        batch_size = config.reconcile.batch_size,
        "Starting engagement-service"
    );
    if config.reconcile.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET not set: counter sync endpoint will answer 500");
    }

    let pool = connect_database(&config.database).await?;
    info!("✅ Database ready");

    let cache: Arc<dyn FastCache> = Arc::new(connect_cache(&config.redis).await?);
    info!("✅ Redis ready");

    let store: Arc<dyn CounterStore> = Arc::new(PgCounterStore::new(pool));
    let reconciler = Arc::new(CounterReconciler::new(
        cache.clone(),
        store.clone(),
        config.reconcile.clone(),
    ));

    let mut tasks = JoinSet::new();

    if config.redis.health_check_enabled {
        let heartbeat_cache = cache.clone();
        tasks.spawn(async move {
            cache_heartbeat::run(heartbeat_cache, cache_heartbeat::HeartbeatConfig::default())
                .await;
            Ok(())
        });
    }

    let cron_state = web::Data::new(CronState {
        reconciler,
        secret: config.reconcile.cron_secret.clone(),
    });
    let health_state = web::Data::new(HealthState { cache, store });

    let bind_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(cron_state.clone())
            .app_data(health_state.clone())
            .wrap(actix_web::middleware::Logger::default())
            .configure(handlers::health::configure)
            .configure(handlers::cron::configure)
    })
    .bind(&bind_addr)
    .context("Failed to bind HTTP server")?
    .run();
    info!("🚀 Listening on http://{}", bind_addr);

    tasks.spawn(async move {
        server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });

    // The server returns on SIGINT/SIGTERM; the heartbeat loop never returns
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => break,
            Ok(Err(e)) => {
                tracing::error!("Task failed: {:#}", e);
                return Err(e);
            }
            Err(e) => return Err(anyhow::anyhow!("Task panicked: {}", e)),
        }
    }

    info!("🛑 engagement-service shutting down");
    Ok(())
}
