//! Tracing subscriber setup for binaries and tests embedding the ledger.

use stock_store::StoreConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a global subscriber with human-readable output.
///
/// `RUST_LOG` takes precedence; `default_filter` applies when it is unset or
/// invalid. Returns false if a global subscriber was already installed, so
/// calling this more than once is harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Like [`init_tracing`], but emits one JSON object per event.
pub fn init_json_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .is_ok()
}

/// Installs a human-readable subscriber filtered by `config.log_level`.
///
/// [`StoreConfig::from_env`] already took `RUST_LOG` into account; an
/// unparsable level falls back to `info`.
pub fn init_tracing_from_config(config: &StoreConfig) -> bool {
    tracing_subscriber::registry()
        .with(config_filter(config))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

fn config_filter(config: &StoreConfig) -> EnvFilter {
    EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing("warn");
        assert!(!init_tracing("debug"));
        assert!(!init_json_tracing("debug"));
        assert!(!init_tracing_from_config(&StoreConfig::default()));
    }

    #[test]
    fn test_config_level_drives_filter() {
        let mut config = StoreConfig::default();
        config.log_level = "warn".to_string();
        assert_eq!(config_filter(&config).to_string(), "warn");
    }
}
