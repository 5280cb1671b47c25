//! HTTP API server for the order and payment lifecycle.
//!
//! Provides REST endpoints over the order and payment services, a webhook
//! receiver for the payment gateway, health checks, structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use cache::{Cache, InMemoryCache};
use domain::order::OrderService;
use domain::payment::PaymentService;
use events::{EventBus, EventPublisher, InMemoryEventBus};
use gateway::{InMemoryGateway, PaymentGateway, WebhookVerifier};
use ledger::{InMemoryLedgerStore, LedgerStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub type SharedStore = Arc<dyn LedgerStore>;
pub type SharedCache = Arc<dyn Cache>;
pub type SharedGateway = Arc<dyn PaymentGateway>;

pub type Orders = OrderService<SharedStore, SharedCache>;
pub type Payments = PaymentService<SharedStore, SharedCache, SharedGateway>;

/// The storage, cache, gateway and bus a process runs against.
pub struct Backends {
    pub store: SharedStore,
    pub cache: SharedCache,
    pub gateway: SharedGateway,
    /// With no bus, events are dropped after being logged.
    pub bus: Option<Arc<dyn EventBus>>,
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orders: Arc<Orders>,
    pub payments: Arc<Payments>,
    pub store: SharedStore,
    pub cache: SharedCache,
}

impl AppState {
    pub fn new(backends: Backends, verifier: WebhookVerifier, cache_ttl: Duration) -> Self {
        let publisher = match backends.bus {
            Some(bus) => EventPublisher::new(bus),
            None => EventPublisher::disabled(),
        };

        let orders = OrderService::new(
            Arc::clone(&backends.store),
            Arc::clone(&backends.cache),
            publisher.clone(),
            cache_ttl,
        );
        let payments = PaymentService::new(
            Arc::clone(&backends.store),
            Arc::clone(&backends.cache),
            backends.gateway,
            publisher,
            verifier,
            cache_ttl,
        );

        Self {
            orders: Arc::new(orders),
            payments: Arc::new(payments),
            store: backends.store,
            cache: backends.cache,
        }
    }
}

/// Creates state backed entirely by in-process implementations.
///
/// Returns the bus so callers can subscribe to it.
pub fn create_in_memory_state(
    webhook_verifier: WebhookVerifier,
    cache_ttl: Duration,
) -> (Arc<AppState>, InMemoryEventBus) {
    let bus = InMemoryEventBus::new();
    let backends = Backends {
        store: Arc::new(InMemoryLedgerStore::new()),
        cache: Arc::new(InMemoryCache::new()),
        gateway: Arc::new(InMemoryGateway::new()),
        bus: Some(Arc::new(bus.clone())),
    };
    let state = Arc::new(AppState::new(backends, webhook_verifier, cache_ttl));
    (state, bus)
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let api = Router::new()
        .route("/orders", post(routes::orders::create))
        .route("/orders/calculate-total", post(routes::orders::calculate_total))
        .route(
            "/orders/{id}",
            get(routes::orders::get).put(routes::orders::update),
        )
        .route("/orders/{id}/status", axum::routing::put(routes::orders::transition))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/users/{user_id}/orders", get(routes::orders::list_by_user))
        .route("/payments", get(routes::payments::list))
        .route("/payments/intent", post(routes::payments::create_intent))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/payments/{id}/confirm", post(routes::payments::confirm))
        .route("/payments/{id}/refund", post(routes::payments::refund))
        .route("/payments/{id}/refunds", get(routes::payments::list_refunds))
        .route("/webhooks/stripe", post(routes::webhooks::stripe));

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/ready", get(routes::health::ready))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
