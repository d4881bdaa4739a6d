/// Order Engine Application
///
/// Entry point of the order pricing, payment dispatch and reconciliation
/// service. It wires configuration, PostgreSQL storage, the payment provider
/// client, the notification worker and the HTTP server together, and shuts
/// them down in order on Ctrl+C or SIGTERM.
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use app_config::AppConfig;
use notification::LogNotifier;
use payment::{HttpPaymentGateway, PaymentDispatcher};
use repository::{PgCatalogRepository, PgCustomersRepository, PgDatabase};
use server::Server;
use service::{OrderServiceImpl, OrderSettings, SystemClock};

/// Initialize the tracing subscriber for logging. `RUST_LOG` overrides the
/// default `info` level.
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    info!("Order engine starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db_pool = db::init_db_pool(&config)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized successfully");

    let gateway = HttpPaymentGateway::new(
        &config.payment_gateway_base_url,
        &config.payment_gateway_secret_key,
        config.payment_gateway_timeout,
    )
    .context("Failed to build payment gateway client")?;
    let dispatcher = PaymentDispatcher::new(
        Arc::new(gateway),
        &config.payment_success_redirect_url,
    );

    if config.payment_callback_token.is_empty() {
        warn!("PAYMENT_CALLBACK_TOKEN is empty, every payment callback will be rejected");
    }

    let (notifications, worker) =
        notification::channel(config.notification_queue_capacity, Arc::new(LogNotifier));

    let settings = OrderSettings {
        order_expiry: chrono::Duration::from_std(config.order_expiry)
            .context("Order expiry is out of range")?,
        delivery_fee: config.delivery_fee,
    };
    let order_service = Arc::new(OrderServiceImpl::new(
        PgDatabase::new(db_pool.clone()),
        PgCatalogRepository::new(db_pool.clone()),
        PgCustomersRepository::new(db_pool.clone()),
        dispatcher,
        notifications,
        Arc::new(SystemClock),
        settings,
        &config.payment_callback_token,
    ));

    let http_server = Server::new(config.http_port, order_service.clone(), order_service)
        .context("Failed to create HTTP server")?;

    // Stops background workers once the HTTP server is down.
    let shutdown = Arc::new(Notify::new());
    let mut tasks = JoinSet::new();

    let worker_shutdown = shutdown.clone();
    tasks.spawn(async move {
        worker.run(worker_shutdown).await;
    });

    let server_result = http_server.start(server::shutdown_signal()).await;
    if let Err(err) = &server_result {
        error!("HTTP server error: {:#}", err);
    }
    shutdown.notify_one();

    let drain = async {
        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                error!("Task error: {}", err);
            }
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain)
        .await
        .is_err()
    {
        warn!(
            "Background tasks did not finish within {:?}, aborting",
            config.shutdown_timeout
        );
        tasks.abort_all();
    }

    db_pool.close();
    info!("Application stopped");
    server_result
}
