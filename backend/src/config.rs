//! Configuration management for the Warehouse Management Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with WMS_ prefix (`WMS__DATABASE__URL`)

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::InvoiceIssuer;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sales defaults
    pub sales: SalesConfig,

    /// Electronic invoicing
    pub invoicing: InvoicingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SalesConfig {
    /// VAT percentage applied when neither the line nor the product sets one
    pub default_tax_rate: Decimal,

    /// ISO currency code
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InvoicingConfig {
    /// Electronic invoice number prefix (e.g. "SETP")
    pub prefix: Option<String>,

    pub issuer: InvoiceIssuer,

    /// Technical key assigned to the numbering range
    pub technical_key: String,

    /// "1" production, "2" testing
    pub environment: String,

    /// Sales at or above this total always get an electronic invoice
    pub electronic_invoice_threshold: Decimal,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("WMS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("sales.default_tax_rate", "19")?
            .set_default("sales.currency", "COP")?
            .set_default("invoicing.issuer.nit", "")?
            .set_default("invoicing.issuer.name", "")?
            .set_default("invoicing.issuer.address", "")?
            .set_default("invoicing.issuer.city", "")?
            .set_default("invoicing.issuer.department", "")?
            .set_default("invoicing.technical_key", "")?
            .set_default("invoicing.environment", "2")?
            .set_default("invoicing.electronic_invoice_threshold", "1000000")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (WMS_ prefix)
            .add_source(
                Environment::with_prefix("WMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
