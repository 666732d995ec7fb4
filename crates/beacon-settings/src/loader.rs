//! Settings loading.
//!
//! Loading flow, lowest priority first:
//! 1. Compiled [`Settings::default()`]
//! 2. Optional JSON file
//! 3. `BEACON_*` environment variables, `__` separating nested keys
//!    (`BEACON_SERVER__PORT=8080` sets `server.port`)
//! 4. Command-line overrides

use std::path::Path;

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::Settings;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BEACON_";

/// Values supplied on the command line. `None` leaves the lower layers alone.
#[derive(Clone, Debug, Default)]
pub struct SettingsOverrides {
    /// Bind address.
    pub host: Option<String>,
    /// Bind port.
    pub port: Option<u16>,
    /// Default log level.
    pub log_level: Option<String>,
}

/// Load settings with no command-line overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    load_settings_with(path, &SettingsOverrides::default())
}

/// Load settings from every layer and validate the result.
///
/// A path that was asked for but does not exist is an error; without a path
/// only defaults and the environment apply.
pub fn load_settings_with(path: Option<&Path>, overrides: &SettingsOverrides) -> Result<Settings> {
    let settings: Settings = figment(path, overrides)?.extract()?;
    validate(&settings)?;
    Ok(settings)
}

fn figment(path: Option<&Path>, overrides: &SettingsOverrides) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(SettingsError::MissingFile(path.to_path_buf()));
        }
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(ref host) = overrides.host {
        figment = figment.merge(Serialized::default("server.host", host));
    }
    if let Some(port) = overrides.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    if let Some(ref level) = overrides.log_level {
        figment = figment.merge(Serialized::default("logging.level", level));
    }
    Ok(figment)
}

/// Reject values the server cannot run with.
pub fn validate(settings: &Settings) -> Result<()> {
    let server = &settings.server;
    if server.keepalive_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.keepalive_interval_secs must be at least 1".to_string(),
        ));
    }
    if server.channel_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.channel_capacity must be at least 1".to_string(),
        ));
    }
    if server.max_body_bytes == 0 {
        return Err(SettingsError::InvalidValue(
            "server.max_body_bytes must be at least 1".to_string(),
        ));
    }
    if !server.message_path.starts_with('/') {
        return Err(SettingsError::InvalidValue(format!(
            "server.message_path must start with '/': {}",
            server.message_path
        )));
    }
    if !is_literal_path(&server.message_path) {
        return Err(SettingsError::InvalidValue(format!(
            "server.message_path must be a literal path: {}",
            server.message_path
        )));
    }
    if matches!(server.message_path.as_str(), "/" | "/sse" | "/health") {
        return Err(SettingsError::InvalidValue(format!(
            "server.message_path collides with a built-in route: {}",
            server.message_path
        )));
    }
    Ok(())
}

// Captures and wildcards would be parsed by the router, a leading ':' in a
// segment is refused outright, and the path is echoed in the endpoint event.
fn is_literal_path(path: &str) -> bool {
    !path.contains(&['{', '}', '*'][..])
        && !path.chars().any(char::is_control)
        && !path.split('/').any(|segment| segment.starts_with(':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogFormat;
    use figment::Jail;

    fn to_figment_err(err: SettingsError) -> figment::Error {
        figment::Error::from(err.to_string())
    }

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_jail| {
            let s = load_settings(None).map_err(to_figment_err)?;
            assert_eq!(s, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "beacon.json",
                r#"{"server":{"port":7777,"server_name":"gw"},"logging":{"format":"json"}}"#,
            )?;
            let s = load_settings(Some(Path::new("beacon.json"))).map_err(to_figment_err)?;
            assert_eq!(s.server.port, 7777);
            assert_eq!(s.server.server_name, "gw");
            assert_eq!(s.server.keepalive_interval_secs, 30);
            assert_eq!(s.logging.format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("beacon.json", r#"{"server":{"port":7777}}"#)?;
            jail.set_env("BEACON_SERVER__PORT", 8888);
            jail.set_env("BEACON_LOGGING__LEVEL", "debug");
            let s = load_settings(Some(Path::new("beacon.json"))).map_err(to_figment_err)?;
            assert_eq!(s.server.port, 8888);
            assert_eq!(s.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn cli_overrides_env() {
        Jail::expect_with(|jail| {
            jail.set_env("BEACON_SERVER__PORT", 8888);
            let overrides = SettingsOverrides {
                host: Some("127.0.0.1".to_string()),
                port: Some(9999),
                log_level: Some("trace".to_string()),
            };
            let s = load_settings_with(None, &overrides).map_err(to_figment_err)?;
            assert_eq!(s.server.port, 9999);
            assert_eq!(s.server.host, "127.0.0.1");
            assert_eq!(s.logging.level, "trace");
            Ok(())
        });
    }

    #[test]
    fn module_levels_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "beacon.json",
                r#"{"logging":{"modules":{"beacon_server::sse":"trace"}}}"#,
            )?;
            let s = load_settings(Some(Path::new("beacon.json"))).map_err(to_figment_err)?;
            assert_eq!(
                s.logging.modules.get("beacon_server::sse").map(String::as_str),
                Some("trace")
            );
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, SettingsError::MissingFile(_)));
    }

    #[test]
    fn malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, SettingsError::Extract(_)));
    }

    #[test]
    fn non_numeric_port_is_error() {
        Jail::expect_with(|jail| {
            jail.set_env("BEACON_SERVER__PORT", "eighty");
            assert!(matches!(
                load_settings(None),
                Err(SettingsError::Extract(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn zero_keepalive_rejected() {
        let mut s = Settings::default();
        s.server.keepalive_interval_secs = 0;
        assert!(matches!(validate(&s), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut s = Settings::default();
        s.server.channel_capacity = 0;
        assert!(validate(&s).is_err());
    }

    #[test]
    fn message_path_must_be_absolute() {
        let mut s = Settings::default();
        s.server.message_path = "message".to_string();
        assert!(validate(&s).is_err());
    }

    #[test]
    fn message_path_cannot_shadow_builtin() {
        let mut s = Settings::default();
        s.server.message_path = "/health".to_string();
        assert!(validate(&s).is_err());
    }

    #[test]
    fn message_path_rejects_route_syntax() {
        for path in ["/rpc/{", "/rpc/{id}", "/rpc}", "/rpc/*rest", "/rpc/:id", "/rpc\r\n"] {
            let mut s = Settings::default();
            s.server.message_path = path.to_string();
            assert!(
                matches!(validate(&s), Err(SettingsError::InvalidValue(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn message_path_allows_nested_literal() {
        let mut s = Settings::default();
        s.server.message_path = "/api/v1/message".to_string();
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn default_settings_validate() {
        assert!(validate(&Settings::default()).is_ok());
    }
}
