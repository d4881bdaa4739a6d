use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// `AppConfig` holds all configuration parameters required by the application.
///
/// The configuration is loaded from environment variables (optionally via a `.env` file)
/// or uses default values if the variable is not set. Keys are flat: the environment
/// variable `PAYMENT_CALLBACK_TOKEN` fills `payment_callback_token`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname or service name (e.g. "postgres" in Docker Compose, "localhost" for local runs).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,

    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,

    // --- Orders ---
    /// How long an order may wait for payment before it expires.
    #[serde(deserialize_with = "deserialize_duration")]
    pub order_expiry: Duration,
    /// Flat delivery fee added to every order.
    pub delivery_fee: i64,

    // --- Payment provider ---
    pub payment_gateway_base_url: String,
    /// Secret API key, sent as the basic-auth user name.
    pub payment_gateway_secret_key: String,
    /// Upper bound for every provider call.
    #[serde(deserialize_with = "deserialize_duration")]
    pub payment_gateway_timeout: Duration,
    /// Shared secret expected in the callback token header. Empty rejects all callbacks.
    pub payment_callback_token: String,
    /// Where e-wallet and paylater checkouts send the customer after paying.
    pub payment_success_redirect_url: String,

    // --- Notifications ---
    /// Bound of the in-process notification queue.
    pub notification_queue_capacity: usize,
}

/// Custom deserializer for durations.
/// Accepts human-readable formats like "5s", "1m", "24h".
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid or missing required values.
    pub fn load() -> Result<Self> {
        // Load from .env file (for Docker environment)
        dotenvy::dotenv().ok();

        Self::from_environment(config::Environment::default())
    }

    /// Builds the configuration from defaults overlaid with `env`.
    ///
    /// # Errors
    /// Returns an error if a value cannot be parsed into its field type.
    pub fn from_environment(env: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            // Database
            .set_default("db_host", "localhost")? // Use localhost for local development
            .set_default("db_port", 5432)?
            .set_default("db_user", "orders_user")?
            .set_default("db_password", "securepassword")?
            .set_default("db_name", "orders_db")?
            .set_default("db_pool_size", 16)?
            // HTTP
            .set_default("http_port", 8081)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Orders
            .set_default("order_expiry", "24h")?
            .set_default("delivery_fee", 0)?
            // Payment provider
            .set_default("payment_gateway_base_url", "https://api.xendit.co")?
            .set_default("payment_gateway_secret_key", "")?
            .set_default("payment_gateway_timeout", "10s")?
            .set_default("payment_callback_token", "")?
            .set_default(
                "payment_success_redirect_url",
                "http://localhost:8081/orders/success",
            )?
            // Notifications
            .set_default("notification_queue_capacity", 256)?
            .add_source(env.try_parsing(true))
            .build()?;

        settings
            .try_deserialize()
            .context("Failed to load configuration")
    }
}
