//! Workload configuration.
//!
//! Read once per request from Spin variables (falling back to the process
//! environment) and passed by reference from then on.

use std::fmt;
use std::time::Duration;

use edge_sdk::edge_observability::{LogFormat, LogLevel};

use crate::error::ConfigError;
use crate::media::{PoolPolicy, SourceFallback, SourcePreference};

/// Default upstream API base.
pub const DEFAULT_API_BASE: &str = "https://api.pexels.com";
/// Default and maximum page size accepted by the collections endpoint.
pub const MAX_PER_PAGE: u32 = 80;
/// Default list TTL.
pub const DEFAULT_LIST_TTL_SECS: u64 = 900;
/// Default cached-proxy duration.
pub const DEFAULT_IMAGE_CACHE_SECS: u64 = 3600;

/// A source of named configuration values.
pub trait VariableSource {
    /// Look up a variable by its uppercase name.
    fn get(&self, name: &str) -> Option<String>;

    /// Look up a variable, treating blank values as absent.
    fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl VariableSource for std::collections::HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        std::collections::HashMap::get(self, name).cloned()
    }
}

/// Spin variables, with the process environment as fallback.
///
/// Spin variable names are the lowercase form of the configuration name.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinVariables;

#[cfg(target_arch = "wasm32")]
impl VariableSource for SpinVariables {
    fn get(&self, name: &str) -> Option<String> {
        spin_sdk::variables::get(&name.to_ascii_lowercase())
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var(name).ok())
    }
}

/// How the selected image is handed to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// 302 to the image URL.
    #[default]
    Redirect,
    /// Stream the image through, uncacheable.
    Proxy,
    /// Stream the image through, cacheable at the edge and downstream.
    CachedProxy,
    /// Return the media pool as JSON.
    List,
}

impl DeliveryMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redirect" => Some(Self::Redirect),
            "proxy" => Some(Self::Proxy),
            "cached-proxy" | "cached_proxy" => Some(Self::CachedProxy),
            "list" | "json" => Some(Self::List),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::Proxy => "proxy",
            Self::CachedProxy => "cached-proxy",
            Self::List => "list",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved workload configuration.
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub collection_id: String,
    pub per_page: u32,
    pub list_ttl: Duration,
    pub image_cache: Duration,
    pub delivery_mode: DeliveryMode,
    pub media_pool: PoolPolicy,
    /// How the image URL of the selected item is chosen.
    pub source: SourcePreference,
    pub api_base: String,
    /// Values that were present but unusable and replaced by defaults.
    pub warnings: Vec<String>,
}

impl Config {
    /// Load the configuration, failing only on missing required values.
    pub fn load(source: &impl VariableSource) -> Result<Self, ConfigError> {
        let api_key = source
            .get_non_empty("PEXELS_API_KEY")
            .ok_or(ConfigError::MissingApiKey)?;
        let collection_id = source
            .get_non_empty("PEXELS_COLLECTION_ID")
            .or_else(|| source.get_non_empty("COLLECTION_ID"))
            .ok_or(ConfigError::MissingCollectionId)?;

        let mut warnings = Vec::new();

        let per_page = match parse_number(source, "PER_PAGE", MAX_PER_PAGE as u64, &mut warnings) {
            n if n > MAX_PER_PAGE as u64 => {
                warnings.push(format!("PER_PAGE={} clamped to {}", n, MAX_PER_PAGE));
                MAX_PER_PAGE
            }
            0 => {
                warnings.push("PER_PAGE=0 clamped to 1".to_string());
                1
            }
            n => n as u32,
        };
        let list_ttl = parse_number(source, "LIST_TTL_SECONDS", DEFAULT_LIST_TTL_SECS, &mut warnings);
        let image_cache =
            parse_number(source, "IMAGE_CACHE_SECONDS", DEFAULT_IMAGE_CACHE_SECS, &mut warnings);

        let delivery_mode = parse_enum(source, "DELIVERY_MODE", DeliveryMode::parse, &mut warnings);
        let media_pool = parse_enum(source, "MEDIA_POOL", PoolPolicy::parse, &mut warnings);
        let source_fallback =
            parse_enum(source, "SOURCE_FALLBACK", SourceFallback::parse, &mut warnings);

        Ok(Self {
            api_key,
            collection_id,
            per_page,
            list_ttl: Duration::from_secs(list_ttl),
            image_cache: Duration::from_secs(image_cache),
            delivery_mode,
            media_pool,
            source: SourcePreference {
                preferred: source
                    .get_non_empty("PREFERRED_SOURCE")
                    .map(|v| v.to_ascii_lowercase()),
                fallback: source_fallback,
            },
            api_base: source
                .get_non_empty("PEXELS_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            warnings,
        })
    }
}

// The API key never reaches log output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("collection_id", &self.collection_id)
            .field("per_page", &self.per_page)
            .field("list_ttl", &self.list_ttl)
            .field("image_cache", &self.image_cache)
            .field("delivery_mode", &self.delivery_mode)
            .field("media_pool", &self.media_pool)
            .field("source", &self.source)
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn parse_number(
    source: &impl VariableSource,
    name: &str,
    default: u64,
    warnings: &mut Vec<String>,
) -> u64 {
    match source.get_non_empty(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warnings.push(format!("{}={:?} is not a number, using {}", name, raw, default));
            default
        }),
    }
}

fn parse_enum<T: Default + fmt::Debug>(
    source: &impl VariableSource,
    name: &str,
    parse: fn(&str) -> Option<T>,
    warnings: &mut Vec<String>,
) -> T {
    match source.get_non_empty(name) {
        None => T::default(),
        Some(raw) => parse(&raw).unwrap_or_else(|| {
            let fallback = T::default();
            warnings.push(format!("{}={:?} is not recognised, using {:?}", name, raw, fallback));
            fallback
        }),
    }
}

/// Logger settings. Independent of the required values so that a broken
/// configuration can still be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LogSettings {
    pub fn load(source: &impl VariableSource) -> Self {
        Self {
            level: source
                .get_non_empty("LOG_LEVEL")
                .and_then(|v| LogLevel::parse(&v))
                .unwrap_or(LogLevel::Info),
            format: source
                .get_non_empty("LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
        }
    }
}
