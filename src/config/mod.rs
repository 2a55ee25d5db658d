use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the portal server, e.g. `https://portal.example.com`.
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the persisted session slot. Defaults to
    /// `$HOME/.config/estate/portal` when unset.
    pub config_dir: Option<PathBuf>,
    /// How long before token expiry the proactive refresh fires.
    pub refresh_margin_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("ESTATE_PORTAL_API_URL") {
            if url::Url::parse(&v).is_ok() {
                self.api.base_url = v;
            } else {
                tracing::warn!("ignoring invalid ESTATE_PORTAL_API_URL: {}", v);
            }
        }
        if let Ok(v) = env::var("ESTATE_PORTAL_REQUEST_TIMEOUT_SECS") {
            self.api.request_timeout_secs = v.parse().unwrap_or(self.api.request_timeout_secs);
        }
        if let Ok(v) = env::var("ESTATE_PORTAL_CONFIG_DIR") {
            self.session.config_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("ESTATE_PORTAL_REFRESH_MARGIN_SECS") {
            self.session.refresh_margin_secs = v.parse().unwrap_or(self.session.refresh_margin_secs);
        }

        self
    }

    fn defaults() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:3000".to_string(),
                request_timeout_secs: 30,
            },
            session: SessionConfig {
                config_dir: None,
                refresh_margin_secs: 5 * 60,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
