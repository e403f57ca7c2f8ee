//! Configuration for yggd.
//!
//! Everything is read from the environment with defaults; provider keys
//! gate adapter availability rather than failing startup. A daemon with no
//! keys still serves: councils deadlock and the pipeline refuses.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default bind address. Localhost only; the outer transport layer owns
/// exposure and auth.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7865";

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YggConfig {
    pub bind_addr: String,
    /// SQLite path, or `:memory:` for tests.
    pub database_url: String,
    /// Token signing secret for the outer auth layer. Absence disables
    /// enforcement and logs a warning.
    pub jwt_secret: Option<String>,
    pub jwt_expires_in: String,
    pub groq_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    /// Optional rate-limit cache. Absence degrades, never fails.
    pub redis_url: Option<String>,
    /// Per-adapter call timeout in milliseconds.
    pub adapter_timeout_ms: u64,
    /// Whole-pipeline deadline in milliseconds.
    pub pipeline_timeout_ms: u64,
}

impl Default for YggConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: "yggdrasil.db".to_string(),
            jwt_secret: None,
            jwt_expires_in: "15m".to_string(),
            groq_api_key: None,
            gemini_api_key: None,
            openrouter_api_key: None,
            redis_url: None,
            adapter_timeout_ms: 30_000,
            pipeline_timeout_ms: 120_000,
        }
    }
}

impl YggConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            bind_addr: env_or("YGG_BIND_ADDR", &defaults.bind_addr),
            database_url: env_or("DATABASE_URL", &defaults.database_url),
            jwt_secret: env_opt("JWT_SECRET"),
            jwt_expires_in: env_or("JWT_EXPIRES_IN", &defaults.jwt_expires_in),
            groq_api_key: env_opt("GROQ_API_KEY"),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            openrouter_api_key: env_opt("OPENROUTER_API_KEY"),
            redis_url: env_opt("REDIS_URL"),
            adapter_timeout_ms: env_parse("YGG_ADAPTER_TIMEOUT_MS", defaults.adapter_timeout_ms),
            pipeline_timeout_ms: env_parse("YGG_PIPELINE_TIMEOUT_MS", defaults.pipeline_timeout_ms),
        };

        if config.jwt_secret.is_none() {
            warn!("JWT_SECRET not set - token enforcement disabled");
        }
        if config.redis_url.is_none() {
            warn!("REDIS_URL not set - rate-limit caching disabled");
        }

        config
    }

    /// Count of configured provider keys.
    pub fn provider_key_count(&self) -> usize {
        [&self.groq_api_key, &self.gemini_api_key, &self.openrouter_api_key]
            .iter()
            .filter(|k| k.is_some())
            .count()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
