//! Context policy.

use std::str::FromStr;

pub const DEFAULT_BUFFER_BYTES: usize = 4096;

/// Policy of a [`Context`](crate::Context). Swapping it on a live context
/// only affects calls made afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Default size for small I/O buffers used by helpers. Not a hard limit.
    pub default_buffer_bytes: usize,

    /// Worker hint for server-style accept loops. 0 means "backend default".
    pub max_workers: usize,

    /// Check state-machine preconditions locally before any backend I/O.
    pub strict_checks: bool,

    /// Emit `tracing` events for state transitions and bridge calls.
    pub enable_tracing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_buffer_bytes: DEFAULT_BUFFER_BYTES,
            max_workers: 0,
            strict_checks: true,
            enable_tracing: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `SYNCNET_BUFFER_BYTES`, `SYNCNET_MAX_WORKERS`,
    /// `SYNCNET_STRICT_CHECKS` and `SYNCNET_TRACING`.
    pub fn from_env() -> Self {
        let def = Self::default();
        Config {
            default_buffer_bytes: env_get("SYNCNET_BUFFER_BYTES", def.default_buffer_bytes),
            max_workers: env_get("SYNCNET_MAX_WORKERS", def.max_workers),
            strict_checks: env_get_bool("SYNCNET_STRICT_CHECKS", def.strict_checks),
            enable_tracing: env_get_bool("SYNCNET_TRACING", def.enable_tracing),
        }
    }

    pub fn with_default_buffer_bytes(mut self, n: usize) -> Self {
        self.default_buffer_bytes = n;
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    pub fn with_strict_checks(mut self, on: bool) -> Self {
        self.strict_checks = on;
        self
    }

    pub fn with_tracing(mut self, on: bool) -> Self {
        self.enable_tracing = on;
        self
    }
}

/// Returns a default configuration.
pub fn default_config() -> Config {
    Config::default()
}

fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.default_buffer_bytes, 4096);
        assert_eq!(cfg.max_workers, 0);
        assert!(cfg.strict_checks);
        assert!(!cfg.enable_tracing);
        assert_eq!(cfg, default_config());
    }

    #[test]
    fn builder() {
        let cfg = Config::new()
            .with_strict_checks(false)
            .with_tracing(true)
            .with_max_workers(4)
            .with_default_buffer_bytes(512);
        assert!(!cfg.strict_checks);
        assert!(cfg.enable_tracing);
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.default_buffer_bytes, 512);
    }

    #[test]
    fn bool_values() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn env_overlay() {
        std::env::set_var("SYNCNET_MAX_WORKERS", "7");
        std::env::set_var("SYNCNET_TRACING", "true");
        std::env::set_var("SYNCNET_BUFFER_BYTES", "not-a-number");
        let cfg = Config::from_env();
        std::env::remove_var("SYNCNET_MAX_WORKERS");
        std::env::remove_var("SYNCNET_TRACING");
        std::env::remove_var("SYNCNET_BUFFER_BYTES");

        assert_eq!(cfg.max_workers, 7);
        assert!(cfg.enable_tracing);
        assert_eq!(cfg.default_buffer_bytes, DEFAULT_BUFFER_BYTES);
    }
}
