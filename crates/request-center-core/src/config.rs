use std::env;

/// Recognised configuration, per §6. Every field can be set directly or
/// overridden by the matching environment variable via [`Config::from_env`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Debugger ↔ browser WebSocket port.
    pub port: u16,
    /// Host ↔ debugger IPC port (used as a well-known identifier, not a
    /// TCP port, since the IPC transport is a Unix domain socket — see
    /// `request-center-ipc`).
    pub server_port: u16,
    /// Chromium remote-debugging port.
    pub remote_debugger_port: u16,
    /// When true, suppresses automatic browser launch.
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5270,
            server_port: 5271,
            remote_debugger_port: 9333,
            dev_mode: false,
        }
    }
}

impl Config {
    /// Starts from [`Config::default`] and overlays `NETWORK_PORT`,
    /// `NETWORK_SERVER_PORT`, `REMOTE_DEBUGGER_PORT`, and
    /// `NETWORK_DEBUG_MODE`. Malformed values are ignored in favour of the
    /// default rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_env("NETWORK_PORT") {
            config.port = v;
        }
        if let Some(v) = parse_env("NETWORK_SERVER_PORT") {
            config.server_port = v;
        }
        if let Some(v) = parse_env("REMOTE_DEBUGGER_PORT") {
            config.remote_debugger_port = v;
        }
        if let Ok(v) = env::var("NETWORK_DEBUG_MODE") {
            config.dev_mode = v.eq_ignore_ascii_case("true");
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.port, 5270);
        assert_eq!(config.server_port, 5271);
        assert_eq!(config.remote_debugger_port, 9333);
        assert!(!config.dev_mode);
    }

    #[test]
    fn malformed_env_falls_back_to_default() {
        // SAFETY: test-local env mutation; no other test reads this key.
        unsafe { env::set_var("NETWORK_PORT", "not-a-port") };
        let config = Config::from_env();
        assert_eq!(config.port, 5270);
        unsafe { env::remove_var("NETWORK_PORT") };
    }
}
