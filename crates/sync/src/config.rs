//! Sync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPIFY_STORE` - Shopify store domain (e.g., your-store.myshopify.com, or just `your-store`)
//! - `SHOPIFY_ACCESS_TOKEN` - Admin API access token (HIGH PRIVILEGE)
//! - `NOTION_API_KEY` - Notion integration token
//!
//! ## Optional
//! - `SHOPIFY_API_VERSION` - API version (default: 2024-10)
//! - `SHOPIFY_API_STYLE` - `graphql` or `rest` (default: graphql)
//! - `NOTION_DATABASE_ID` - Products database (default: built-in workspace database)
//! - `NOTION_ORDERS_DATABASE_ID` - Orders database (default: same as products)
//! - `NOTION_VERSION` - Notion API version header (default: 2022-06-28)
//! - `SYNC_PAGE_SIZE` - Records per source page, 1-250 (default: 50)
//! - `SYNC_PROGRESS_INTERVAL` - Log progress every N records (default: 10)
//! - `NOTION_WRITE_DELAY_MS` - Minimum spacing between Notion writes (default: 350)
//! - `SEARCH_LIMIT` - Maximum hits per source in a search (default: 50)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_API_VERSION: &str = "2024-10";
const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Products database used when `NOTION_DATABASE_ID` is unset.
pub const DEFAULT_NOTION_DATABASE_ID: &str = "1f2e3d4c5b6a47988796a5b4c3d2e1f0";

/// Largest page size either source API style accepts.
pub const MAX_PAGE_SIZE: u32 = 250;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Top-level configuration, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source store configuration
    pub shopify: ShopifyConfig,
    /// Target workspace configuration
    pub notion: NotionConfig,
    /// Pacing, paging and retry knobs
    pub tuning: SyncTuning,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
}

/// Which source API style to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiStyle {
    /// Single-endpoint query documents with cost-based throttling.
    #[default]
    GraphQl,
    /// Resource-path REST with `Link` header paging and 429 backoff.
    Rest,
}

impl FromStr for ApiStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graphql" | "gql" => Ok(Self::GraphQl),
            "rest" => Ok(Self::Rest),
            other => Err(format!("expected `graphql` or `rest`, got `{other}`")),
        }
    }
}

impl std::fmt::Display for ApiStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GraphQl => f.write_str("graphql"),
            Self::Rest => f.write_str("rest"),
        }
    }
}

/// Shopify Admin API configuration.
///
/// Implements `Debug` manually to redact the HIGH PRIVILEGE access token.
#[derive(Clone)]
pub struct ShopifyConfig {
    /// Shopify store domain (e.g., your-store.myshopify.com)
    pub store: String,
    /// Shopify API version (e.g., 2024-10)
    pub api_version: String,
    /// Admin API access token (HIGH PRIVILEGE - full store access)
    pub access_token: SecretString,
    /// Source API style
    pub api_style: ApiStyle,
}

impl std::fmt::Debug for ShopifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyConfig")
            .field("store", &self.store)
            .field("api_version", &self.api_version)
            .field("access_token", &"[REDACTED]")
            .field("api_style", &self.api_style)
            .finish()
    }
}

/// Notion API configuration.
///
/// Implements `Debug` manually to redact the integration token.
#[derive(Clone)]
pub struct NotionConfig {
    /// Integration token
    pub api_key: SecretString,
    /// Database receiving product records
    pub products_database_id: String,
    /// Database receiving order records
    pub orders_database_id: String,
    /// `Notion-Version` header value
    pub version: String,
}

impl std::fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionConfig")
            .field("api_key", &"[REDACTED]")
            .field("products_database_id", &self.products_database_id)
            .field("orders_database_id", &self.orders_database_id)
            .field("version", &self.version)
            .finish()
    }
}

/// Paging, pacing and retry knobs.
#[derive(Debug, Clone)]
pub struct SyncTuning {
    /// Records requested per source page.
    pub page_size: u32,
    /// Log progress every N records.
    pub progress_interval: usize,
    /// Minimum spacing between successive target writes.
    pub write_delay: Duration,
    /// Cost budget floor below which query-document calls pause.
    pub cost_floor: f64,
    /// Smallest pause applied when under the cost floor.
    pub min_cost_delay: Duration,
    /// Retries after a "too many requests" response before giving up.
    pub max_retries: u32,
    /// Wait used when a rate-limited response carries no `Retry-After`.
    pub default_retry_after: Duration,
    /// Maximum hits per source in a search.
    pub search_limit: usize,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            page_size: 50,
            progress_interval: 10,
            write_delay: Duration::from_millis(350),
            cost_floor: 500.0,
            min_cost_delay: Duration::from_millis(100),
            max_retries: 3,
            default_retry_after: Duration::from_secs(2),
            search_limit: 50,
        }
    }
}

impl SyncTuning {
    /// Tuning with every delay set to zero, for tests and dry runs against fakes.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            write_delay: Duration::ZERO,
            min_cost_delay: Duration::ZERO,
            default_retry_after: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl SyncConfig {
    /// Load configuration from the process environment.
    ///
    /// `.env` loading belongs to the binary; this only reads what is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let shopify = ShopifyConfig::from_env(&env)?;
        let notion = NotionConfig::from_env(&env)?;
        let tuning = SyncTuning::from_env(&env)?;

        Ok(Self {
            shopify,
            notion,
            tuning,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Build configuration from a map (tests and embedding callers).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }
}

impl ShopifyConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        let api_style = env
            .or_default("SHOPIFY_API_STYLE", "graphql")
            .parse::<ApiStyle>()
            .map_err(|e| ConfigError::InvalidEnvVar("SHOPIFY_API_STYLE".to_string(), e))?;

        Ok(Self {
            store: normalize_store_domain(&env.required("SHOPIFY_STORE")?),
            api_version: env.or_default("SHOPIFY_API_VERSION", DEFAULT_API_VERSION),
            access_token: env.checked_secret("SHOPIFY_ACCESS_TOKEN")?,
            api_style,
        })
    }

    /// Admin URL of a product, as shown in search results.
    #[must_use]
    pub fn product_admin_url(&self, product_id: &str) -> String {
        format!("https://{}/admin/products/{product_id}", self.store)
    }
}

impl NotionConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        let products_database_id =
            env.or_default("NOTION_DATABASE_ID", DEFAULT_NOTION_DATABASE_ID);
        let orders_database_id = env
            .optional("NOTION_ORDERS_DATABASE_ID")
            .unwrap_or_else(|| products_database_id.clone());

        Ok(Self {
            api_key: env.checked_secret("NOTION_API_KEY")?,
            products_database_id,
            orders_database_id,
            version: env.or_default("NOTION_VERSION", DEFAULT_NOTION_VERSION),
        })
    }
}

impl SyncTuning {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let page_size = env
            .parsed::<u32>("SYNC_PAGE_SIZE")?
            .unwrap_or(defaults.page_size)
            .clamp(1, MAX_PAGE_SIZE);
        let progress_interval = env
            .parsed::<usize>("SYNC_PROGRESS_INTERVAL")?
            .unwrap_or(defaults.progress_interval)
            .max(1);
        let write_delay = env
            .parsed::<u64>("NOTION_WRITE_DELAY_MS")?
            .map_or(defaults.write_delay, Duration::from_millis);
        let search_limit = env
            .parsed::<usize>("SEARCH_LIMIT")?
            .unwrap_or(defaults.search_limit)
            .max(1);

        Ok(Self {
            page_size,
            progress_interval,
            write_delay,
            search_limit,
            ..defaults
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Environment lookup with the typed accessors used above.
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Get an optional variable, treating blank values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse an optional variable.
    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
            })
            .transpose()
    }

    /// Load a required secret, warning (not failing) on weak-looking values.
    ///
    /// Tokens are issued by the providers, so a failed strength check most
    /// likely means a placeholder was left in `.env`.
    fn checked_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        if let Err(e) = validate_secret_strength(&value, key) {
            tracing::warn!("{key} validation warning: {e}");
        }
        Ok(SecretString::from(value))
    }
}

/// Normalize a store identifier to a bare `*.myshopify.com` host.
fn normalize_store_domain(raw: &str) -> String {
    let host = raw
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    if host.contains('.') {
        host.to_string()
    } else {
        format!("{host}.myshopify.com")
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Expose a secret for a request header.
pub(crate) fn bearer(secret: &SecretString) -> String {
    format!("Bearer {}", secret.expose_secret())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("SHOPIFY_STORE", "pistachio-test"),
            ("SHOPIFY_ACCESS_TOKEN", "shpat_9f8Kd2mQ7xLp4Zr1Vb6Nc3Ty"),
            ("NOTION_API_KEY", "ntn_4Hs8Jq2Lw9Xe5Rt7Yu1Io3Pa"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = SyncConfig::from_map(&base_vars()).unwrap();

        assert_eq!(config.shopify.store, "pistachio-test.myshopify.com");
        assert_eq!(config.shopify.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.shopify.api_style, ApiStyle::GraphQl);
        assert_eq!(
            config.notion.products_database_id,
            DEFAULT_NOTION_DATABASE_ID
        );
        assert_eq!(
            config.notion.orders_database_id,
            config.notion.products_database_id
        );
        assert_eq!(config.tuning.max_retries, 3);
        assert!((config.tuning.cost_floor - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_token_is_error() {
        let mut vars = base_vars();
        vars.remove("NOTION_API_KEY");

        let err = SyncConfig::from_map(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "NOTION_API_KEY"));
    }

    #[test]
    fn test_api_style_and_page_size() {
        let mut vars = base_vars();
        vars.insert("SHOPIFY_API_STYLE".to_string(), "REST".to_string());
        vars.insert("SYNC_PAGE_SIZE".to_string(), "1000".to_string());

        let config = SyncConfig::from_map(&vars).unwrap();
        assert_eq!(config.shopify.api_style, ApiStyle::Rest);
        assert_eq!(config.tuning.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_invalid_api_style() {
        let mut vars = base_vars();
        vars.insert("SHOPIFY_API_STYLE".to_string(), "soap".to_string());

        let err = SyncConfig::from_map(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_normalize_store_domain() {
        assert_eq!(
            normalize_store_domain("https://shop.myshopify.com/"),
            "shop.myshopify.com"
        );
        assert_eq!(normalize_store_domain("shop"), "shop.myshopify.com");
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_shopify_config_debug_redacts_secrets() {
        let config = ShopifyConfig {
            store: "test.myshopify.com".to_string(),
            api_version: "2024-10".to_string(),
            access_token: SecretString::from("shpat_super_secret_value"),
            api_style: ApiStyle::Rest,
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("test.myshopify.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("shpat_super_secret_value"));
    }

    #[test]
    fn test_notion_config_debug_redacts_secrets() {
        let config = NotionConfig {
            api_key: SecretString::from("ntn_super_secret_value"),
            products_database_id: "db1".to_string(),
            orders_database_id: "db2".to_string(),
            version: DEFAULT_NOTION_VERSION.to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("db1"));
        assert!(!debug_output.contains("ntn_super_secret_value"));
    }
}
