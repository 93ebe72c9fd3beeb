//! Configuration management for store access.

use std::env;

/// Store configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// HTTP endpoint of the store
    pub endpoint: String,
    /// Region label forwarded to the store
    pub region: String,
    /// Prefix prepended to every resolved table name
    pub table_prefix: String,
    /// Page size sent with each scan request
    pub scan_page_size: Option<u32>,
    /// Static `Authorization` header value, for signing proxies
    pub authorization: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            region: "local".to_string(),
            table_prefix: String::new(),
            scan_page_size: None,
            authorization: None,
        }
    }
}

impl StoreConfig {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = env::var("DYNADOC_ENDPOINT").unwrap_or(defaults.endpoint);
        let region = env::var("DYNADOC_REGION").unwrap_or(defaults.region);
        let table_prefix = env::var("DYNADOC_TABLE_PREFIX").unwrap_or_default();

        let scan_page_size = match env::var("DYNADOC_SCAN_PAGE_SIZE") {
            Ok(raw) => Some(
                raw.parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::InvalidScanPageSize(raw))?,
            ),
            Err(_) => None,
        };

        let authorization = env::var("DYNADOC_AUTHORIZATION").ok();

        Ok(Self {
            endpoint,
            region,
            table_prefix,
            scan_page_size,
            authorization,
        })
    }

    /// Table name for a model: prefix plus the lowercased, pluralised name.
    pub fn table_name(&self, model_name: &str) -> String {
        let mut name = model_name.to_lowercase();
        if !name.ends_with('s') {
            name.push('s');
        }
        format!("{}{}", self.table_prefix, name)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid DYNADOC_SCAN_PAGE_SIZE value: {0}")]
    InvalidScanPageSize(String),
}
