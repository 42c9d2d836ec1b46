//! Startup settings: library defaults overridden from the environment.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use codeshare_collab::{HttpConfig, RoomConfig, ServerConfig};
use codeshare_exec::DispatcherConfig;
use thiserror::Error;

pub const BIND_VAR: &str = "CODESHARE_BIND";
pub const HTTP_BIND_VAR: &str = "CODESHARE_HTTP_BIND";
pub const SCRATCH_DIR_VAR: &str = "CODESHARE_SCRATCH_DIR";
pub const EXEC_TIMEOUT_VAR: &str = "CODESHARE_EXEC_TIMEOUT_SECS";
pub const LAUNCHER_VAR: &str = "CODESHARE_LAUNCHER";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidTimeout { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub room: RoomConfig,
    pub dispatcher: DispatcherConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(bind) = lookup(BIND_VAR) {
            settings.server.bind_addr = bind;
        }
        if let Some(bind) = lookup(HTTP_BIND_VAR) {
            settings.http.bind_addr = bind;
        }
        if let Some(dir) = lookup(SCRATCH_DIR_VAR) {
            settings.dispatcher.scratch_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(EXEC_TIMEOUT_VAR) {
            let secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout {
                    var: EXEC_TIMEOUT_VAR,
                    value: value.clone(),
                })?;
            settings.dispatcher.sandbox.wall_clock = Duration::from_secs(secs);
        }
        if let Some(launcher) = lookup(LAUNCHER_VAR) {
            let argv: Vec<OsString> = launcher.split_whitespace().map(OsString::from).collect();
            settings.dispatcher.sandbox.launcher = (!argv.is_empty()).then_some(argv);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(settings.http.bind_addr, "127.0.0.1:8081");
        assert_eq!(settings.room.exec_base_name, "main-");
        assert!(settings.dispatcher.sandbox.launcher.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (BIND_VAR, "0.0.0.0:9000"),
            (HTTP_BIND_VAR, "0.0.0.0:9001"),
            (SCRATCH_DIR_VAR, "/var/lib/codeshare"),
            (EXEC_TIMEOUT_VAR, "5"),
            (LAUNCHER_VAR, "bwrap --unshare-net --"),
        ]))
        .unwrap();

        assert_eq!(settings.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(settings.http.bind_addr, "0.0.0.0:9001");
        assert_eq!(settings.dispatcher.scratch_dir, PathBuf::from("/var/lib/codeshare"));
        assert_eq!(settings.dispatcher.sandbox.wall_clock, Duration::from_secs(5));
        assert_eq!(
            settings.dispatcher.sandbox.launcher,
            Some(vec!["bwrap".into(), "--unshare-net".into(), "--".into()])
        );
    }

    #[test]
    fn test_blank_launcher_is_none() {
        let settings = Settings::from_lookup(lookup(&[(LAUNCHER_VAR, "   ")])).unwrap();
        assert!(settings.dispatcher.sandbox.launcher.is_none());
    }

    #[test]
    fn test_invalid_timeout() {
        for bad in ["0", "ten", "-1"] {
            let err = Settings::from_lookup(lookup(&[(EXEC_TIMEOUT_VAR, bad)])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidTimeout {
                    var: EXEC_TIMEOUT_VAR,
                    value: bad.to_string()
                }
            );
        }
    }
}
