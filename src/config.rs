//! Environment-driven settings.
//!
//! Every value has a default so the server runs with no configuration at
//! all; `.env` files are honored via dotenvy before the process reads its
//! environment.

use std::path::PathBuf;

/// Settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub db_path: PathBuf,
    /// CORS origin for the admin frontend; `None` means same-origin only.
    pub frontend_url: Option<String>,
    /// How often the call-expiry sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 4110,
            db_path: PathBuf::from("prodtrack.db"),
            frontend_url: None,
            sweep_interval_secs: 300,
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PRODTRACK_PORT").unwrap_or(defaults.port),
            db_path: std::env::var("PRODTRACK_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            frontend_url: std::env::var("FRONTEND_URL").ok().filter(|v| !v.is_empty()),
            sweep_interval_secs: env_parse("PRODTRACK_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.port, 4110);
        assert_eq!(settings.db_path, PathBuf::from("prodtrack.db"));
        assert!(settings.frontend_url.is_none());
        assert_eq!(settings.sweep_interval_secs, 300);
    }
}
