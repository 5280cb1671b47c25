//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, Backends, SharedCache, SharedGateway, SharedStore};
use cache::{InMemoryCache, RedisCache};
use domain::order::{PAYMENT_SYNC_GROUP, PaymentSync};
use events::{EventBus, Exchange, InMemoryEventBus};
#[cfg(feature = "kafka")]
use events::{KafkaConfig, KafkaEventBus};
use gateway::{InMemoryGateway, StripeConfig, StripeGateway, WebhookVerifier};
use ledger::{InMemoryLedgerStore, PostgresLedgerStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect_store(config: &Config) -> Result<(SharedStore, Option<PgPool>), BoxError> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, keeping ledger rows in memory");
        return Ok((Arc::new(InMemoryLedgerStore::new()), None));
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let store = PostgresLedgerStore::new(pool.clone());
    store.run_migrations().await?;
    tracing::info!("connected to PostgreSQL ledger");
    Ok((Arc::new(store), Some(pool)))
}

async fn connect_cache(config: &Config) -> Result<SharedCache, BoxError> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let cache = RedisCache::new(url).await?;
            tracing::info!("connected to Redis cache");
            Ok(Arc::new(cache))
        }
        None => {
            tracing::warn!("REDIS_URL not set, using the in-memory cache");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}

fn build_gateway(config: &Config) -> Result<SharedGateway, BoxError> {
    match config.stripe_secret_key.clone() {
        Some(secret_key) => {
            let gateway = StripeGateway::new(StripeConfig {
                secret_key,
                api_base: config.stripe_api_base.clone(),
                timeout: config.gateway_timeout,
            })?;
            Ok(Arc::new(gateway))
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, using the in-memory gateway");
            Ok(Arc::new(InMemoryGateway::new()))
        }
    }
}

fn build_bus(config: &Config) -> Result<Arc<dyn EventBus>, BoxError> {
    match config.kafka_brokers.as_deref() {
        #[cfg(feature = "kafka")]
        Some(brokers) => {
            let bus = KafkaEventBus::new(KafkaConfig {
                timeout: config.kafka_timeout,
                ..KafkaConfig::new(brokers)
            })?;
            tracing::info!(brokers, "publishing events to Kafka");
            Ok(Arc::new(bus))
        }
        #[cfg(not(feature = "kafka"))]
        Some(_) => Err("KAFKA_BROKERS is set but this build has no Kafka support".into()),
        None => {
            tracing::warn!("KAFKA_BROKERS not set, events stay in this process");
            Ok(Arc::new(InMemoryEventBus::new()))
        }
    }
}

/// Cancels stale pending orders on a fixed interval until aborted.
fn spawn_sweeper(state: Arc<AppState>, config: &Config) -> JoinHandle<()> {
    let period = config.sweep_interval;
    let max_age = config.pending_order_max_age;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let started = std::time::Instant::now();
            match state.orders.cancel_stale_pending(max_age).await {
                Ok(cancelled) => {
                    metrics::counter!("stale_orders_cancelled_total").increment(cancelled as u64);
                }
                Err(e) => tracing::warn!(error = %e, "stale order sweep failed"),
            }
            metrics::histogram!("stale_sweep_duration_seconds")
                .record(started.elapsed().as_secs_f64());
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);
    tracing::debug!(?config, "loaded configuration");

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Connect backends and build application state
    let (store, pool) = connect_store(&config).await?;
    let bus = build_bus(&config)?;
    let backends = Backends {
        store,
        cache: connect_cache(&config).await?,
        gateway: build_gateway(&config)?,
        bus: Some(Arc::clone(&bus)),
    };
    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
    }
    let verifier = WebhookVerifier::new(config.stripe_webhook_secret.clone(), config.webhook_tolerance);
    let state = Arc::new(AppState::new(backends, verifier, config.cache_ttl));

    // 4. Start background tasks
    let subscription = bus
        .subscribe(PAYMENT_SYNC_GROUP, &[Exchange::Payments])
        .await?;
    let sync = PaymentSync::new(Arc::clone(&state.orders)).spawn(subscription);
    let sweeper = spawn_sweeper(Arc::clone(&state), &config);

    // 5. Build the application and serve
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Teardown
    sweeper.abort();
    sync.abort();
    if let Some(pool) = pool {
        pool.close().await;
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
