use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DATABASE_URL: &str = "sqlite://storefront.db?mode=rwc";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_FREE_DELIVERY_THRESHOLD: Decimal = dec!(500);
const DEFAULT_DELIVERY_CHARGE: Decimal = dec!(40);
const DEFAULT_MIN_ITEM_QUANTITY: i32 = 1;
const DEFAULT_MAX_ITEM_QUANTITY: i32 = 5;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Basis the refund allocator measures an item's share of the coupon against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundBasis {
    /// Active items plus the item being cancelled, as they stand now.
    #[default]
    LiveActiveItems,
    /// Subtotal frozen when the order was placed.
    OrderCreation,
}

/// Flat delivery fee waived at or above a subtotal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub free_delivery_threshold: Decimal,
    pub delivery_charge: Decimal,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            free_delivery_threshold: DEFAULT_FREE_DELIVERY_THRESHOLD,
            delivery_charge: DEFAULT_DELIVERY_CHARGE,
        }
    }
}

impl DeliveryPolicy {
    pub fn charge_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.free_delivery_threshold {
            Decimal::ZERO
        } else {
            self.delivery_charge
        }
    }
}

/// Pricing engine configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Database connection URL for the sea-orm backed stores
    #[serde(default = "default_database_url")]
    #[validate(length(min = 1))]
    pub database_url: String,

    /// ISO currency code used in summaries
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Subtotal at or above which delivery is free
    #[serde(default = "default_free_delivery_threshold")]
    pub free_delivery_threshold: Decimal,

    /// Flat delivery fee below the threshold
    #[serde(default = "default_delivery_charge")]
    pub delivery_charge: Decimal,

    /// Smallest quantity a cart line may hold
    #[serde(default = "default_min_item_quantity")]
    #[validate(range(min = 1))]
    pub min_item_quantity: i32,

    /// Largest quantity a cart line may hold
    #[serde(default = "default_max_item_quantity")]
    #[validate(range(min = 1, max = 1000))]
    pub max_item_quantity: i32,

    /// How cancelled items' coupon share is measured
    #[serde(default)]
    pub refund_basis: RefundBasis,

    /// Event channel capacity
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            database_url: default_database_url(),
            currency: default_currency(),
            free_delivery_threshold: default_free_delivery_threshold(),
            delivery_charge: default_delivery_charge(),
            min_item_quantity: default_min_item_quantity(),
            max_item_quantity: default_max_item_quantity(),
            refund_basis: RefundBasis::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl PricingConfig {
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            free_delivery_threshold: self.free_delivery_threshold,
            delivery_charge: self.delivery_charge,
        }
    }

    pub fn quantity_range(&self) -> std::ops::RangeInclusive<i32> {
        self.min_item_quantity..=self.max_item_quantity
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.free_delivery_threshold < Decimal::ZERO {
            let mut err = ValidationError::new("free_delivery_threshold");
            err.message = Some("free_delivery_threshold cannot be negative".into());
            errors.add("free_delivery_threshold", err);
        }

        if self.delivery_charge < Decimal::ZERO {
            let mut err = ValidationError::new("delivery_charge");
            err.message = Some("delivery_charge cannot be negative".into());
            errors.add("delivery_charge", err);
        }

        if self.min_item_quantity > self.max_item_quantity {
            let mut err = ValidationError::new("item_quantity_range");
            err.message = Some("min_item_quantity must not exceed max_item_quantity".into());
            errors.add("min_item_quantity", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runs the derived field checks and the cross-field checks.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.validate_additional_constraints()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_free_delivery_threshold() -> Decimal {
    DEFAULT_FREE_DELIVERY_THRESHOLD
}

fn default_delivery_charge() -> Decimal {
    DEFAULT_DELIVERY_CHARGE
}

fn default_min_item_quantity() -> i32 {
    DEFAULT_MIN_ITEM_QUANTITY
}

fn default_max_item_quantity() -> i32 {
    DEFAULT_MAX_ITEM_QUANTITY
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_pricing={},sea_orm=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads pricing configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<PricingConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<PricingConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let pricing_config: PricingConfig = config.try_deserialize()?;

    pricing_config.validate_all().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(pricing_config)
}
