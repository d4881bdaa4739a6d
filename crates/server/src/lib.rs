//! Server crate provides the HTTP adapter for the order engine.
//!
//! It exposes checkout, order reads, customer cancellation, the admin list and
//! status endpoints and the payment provider callback, plus health and
//! Prometheus metrics.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, patch, post},
};
use service::{OrderService, PaymentWebhookService};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

mod handlers;
mod metrics;

pub use metrics::Metrics;

/// Server represents the HTTP server for working with orders.
pub struct Server {
    port: u16,
    state: AppState,
}

/// Application state shared between request handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    orders: Arc<dyn OrderService>,
    webhooks: Arc<dyn PaymentWebhookService>,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Creates a new Server instance.
    ///
    /// # Errors
    /// Fails if the metrics registry cannot be built.
    pub fn new(
        port: u16,
        orders: Arc<dyn OrderService>,
        webhooks: Arc<dyn PaymentWebhookService>,
    ) -> Result<Self> {
        info!("Initializing HTTP server on port {}", port);
        let metrics = Metrics::new().context("Failed to create metrics registry")?;

        Ok(Self {
            port,
            state: AppState {
                orders,
                webhooks,
                metrics: Arc::new(metrics),
            },
        })
    }

    /// Serves requests until `shutdown` resolves, then drains in-flight
    /// requests.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .with_context(|| format!("Failed to bind to port {}", self.port))?;

        info!("HTTP server listening on port {}", self.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/orders", post(handlers::create_order))
            .route("/api/orders/{uuid}", get(handlers::get_order_by_uuid))
            .route(
                "/api/orders/track/{track_id}",
                get(handlers::get_order_by_track_id),
            )
            .route(
                "/api/orders/track/{track_id}/cancel",
                post(handlers::cancel_order),
            )
            .route("/api/admin/orders", get(handlers::list_orders))
            .route("/api/admin/orders/id/{id}", get(handlers::get_order_by_id))
            .route(
                "/api/admin/orders/{uuid}/status",
                patch(handlers::advance_order_status),
            )
            .route("/api/webhooks/payments", post(handlers::payment_webhook))
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .layer(axum::middleware::from_fn_with_state(
                self.state.metrics.clone(),
                metrics::metrics_middleware,
            ))
            .with_state(self.state.clone())
    }
}

/// Waits for Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires, so the other
/// signal still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
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
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
