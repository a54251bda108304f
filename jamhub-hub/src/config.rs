use std::{
    env,
    path::{Path, PathBuf},
};

/// The configuration of the hub, constructed once at startup and passed to
/// every component that needs it.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Externally reachable hostname handed to transport clients
    pub host: String,
    /// TCP port for HTTP and WebSocket
    pub port: u16,
    /// Path to the external jacktrip binary
    pub transport_bin: String,
    /// First UDP port of the transport pool
    pub transport_base_port: u16,
    /// Number of UDP ports in the transport pool
    pub transport_port_range: u16,
    /// Audio channel count passed to spawned transports
    pub transport_channels: u16,
    /// TLS certificate path. A self-signed pair is generated under
    /// `certs_dir()` when either file is missing.
    pub ssl_certfile: Option<PathBuf>,
    /// TLS private key path
    pub ssl_keyfile: Option<PathBuf>,
    /// When true, exactly one room exists for the lifetime of the hub
    pub single_room_mode: bool,
    /// Display name of the default room in single room mode
    pub band_name: String,
    /// Directory holding the user database and generated TLS material
    pub data_dir: PathBuf,
    /// How long a room may sit empty before the reaper destroys it
    pub reap_grace_secs: u64,
}

impl HubConfig {
    /// Reads the configuration from the environment, falling back to
    /// defaults for anything unset. Malformed numeric values abort startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: var_or("HUB_HOST", defaults.host),
            port: parsed_var_or("HUB_PORT", defaults.port),
            transport_bin: var_or("TRANSPORT_BIN", defaults.transport_bin),
            transport_base_port: parsed_var_or(
                "TRANSPORT_BASE_PORT",
                defaults.transport_base_port,
            ),
            transport_port_range: parsed_var_or(
                "TRANSPORT_PORT_RANGE",
                defaults.transport_port_range,
            ),
            transport_channels: parsed_var_or("TRANSPORT_CHANNELS", defaults.transport_channels),
            ssl_certfile: env::var("SSL_CERTFILE").ok().map(PathBuf::from),
            ssl_keyfile: env::var("SSL_KEYFILE").ok().map(PathBuf::from),
            single_room_mode: parsed_var_or("SINGLE_ROOM_MODE", false),
            band_name: var_or("BAND_NAME", defaults.band_name),
            data_dir: env::var("HUB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            reap_grace_secs: parsed_var_or("HUB_REAP_GRACE_SECS", defaults.reap_grace_secs),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("hub.db")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.data_dir.join("certs")
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            transport_bin: "jacktrip".to_string(),
            transport_base_port: 4464,
            transport_port_range: 100,
            transport_channels: 2,
            ssl_certfile: None,
            ssl_keyfile: None,
            single_room_mode: false,
            band_name: "The Band".to_string(),
            data_dir: Path::new(".").to_path_buf(),
            reap_grace_secs: 300,
        }
    }
}

fn var_or(name: &str, default: String) -> String {
    env::var(name).unwrap_or(default)
}

fn parsed_var_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => panic!("{name} is invalid: {e}"),
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = HubConfig::default();

        assert_eq!(config.port, 8000);
        assert_eq!(config.transport_base_port, 4464);
        assert_eq!(config.transport_port_range, 100);
        assert!(!config.single_room_mode);
        assert_eq!(config.db_path(), PathBuf::from("./hub.db"));
        assert_eq!(config.certs_dir(), PathBuf::from("./certs"));
    }
}
