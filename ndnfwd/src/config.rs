use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use std::{fs, path::Path};

use anyhow::Context;
use clap::ArgMatches;
use serde::{Deserialize, Serialize};

use ndnfw_core::Mode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub firewall: FirewallConfig,
    pub pit: PitConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub mode: Mode,
    pub whitelist_size: usize,
    pub blacklist_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitConfig {
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub local_port: u16,
    pub command_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub max_connections: usize,
    pub connect_attempts: u32,
    pub connect_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Accept,
            whitelist_size: 1_000_000,
            blacklist_size: 1_000_000,
        }
    }
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            size: ndnfw_core::pit::DEFAULT_PIT_SIZE,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_port: 6361,
            command_port: 6362,
            remote_address: "127.0.0.1".to_string(),
            remote_port: 6363,
            max_connections: 128,
            connect_attempts: 3,
            connect_delay_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("remote address '{0}' is not an IP address")]
    InvalidRemoteAddress(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Config {
    /// Read `path`, falling back to the defaults when it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Override fields with the command-line flags that were given.
    pub fn apply_args(&mut self, matches: &ArgMatches) {
        if let Some(&mode) = matches.get_one::<Mode>("mode") {
            self.firewall.mode = mode;
        }
        if let Some(&size) = matches.get_one::<usize>("whitelist-size") {
            self.firewall.whitelist_size = size;
        }
        if let Some(&size) = matches.get_one::<usize>("blacklist-size") {
            self.firewall.blacklist_size = size;
        }
        if let Some(&size) = matches.get_one::<usize>("pit-size") {
            self.pit.size = size;
        }
        if let Some(&port) = matches.get_one::<u16>("local-port") {
            self.network.local_port = port;
        }
        if let Some(&port) = matches.get_one::<u16>("command-port") {
            self.network.command_port = port;
        }
        if let Some(address) = matches.get_one::<String>("remote-address") {
            self.network.remote_address = address.clone();
        }
        if let Some(&port) = matches.get_one::<u16>("remote-port") {
            self.network.remote_port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.remote_ip()?;
        let sizes = [
            ("whitelist size", self.firewall.whitelist_size),
            ("blacklist size", self.firewall.blacklist_size),
            ("pit size", self.pit.size),
            ("max connections", self.network.max_connections),
        ];
        for (what, value) in sizes {
            if value == 0 {
                return Err(ConfigError::Zero(what));
            }
        }
        Ok(())
    }

    fn remote_ip(&self) -> Result<IpAddr, ConfigError> {
        self.network
            .remote_address
            .parse()
            .map_err(|_| ConfigError::InvalidRemoteAddress(self.network.remote_address.clone()))
    }

    pub fn upstream_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.remote_ip()?, self.network.remote_port))
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.network.connect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.firewall.mode, Mode::Accept);
        assert_eq!(config.firewall.whitelist_size, 1_000_000);
        assert_eq!(config.pit.size, 1_000_000);
        assert_eq!(config.network.local_port, 6361);
        assert_eq!(config.network.command_port, 6362);
        assert_eq!(config.upstream_addr().unwrap(), "127.0.0.1:6363".parse().unwrap());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[firewall]\nmode = \"drop\"\n\n[network]\nremote_address = \"10.0.0.2\"\nremote_port = 7000\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.firewall.mode, Mode::Drop);
        assert_eq!(config.firewall.blacklist_size, 1_000_000);
        assert_eq!(config.upstream_addr().unwrap(), "10.0.0.2:7000".parse().unwrap());
        assert_eq!(config.network.local_port, 6361);
    }

    #[test]
    fn test_written_config_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndnfwd.toml");
        let mut config = Config::default();
        config.pit.size = 42;
        config.logging.file = Some("/tmp/ndnfwd.log".to_string());

        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[firewall\nmode = ").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let matches = crate::cli().get_matches_from([
            "ndnfwd",
            "-m",
            "drop",
            "-w",
            "10",
            "--pit-size",
            "99",
            "--remote-address",
            "192.168.1.1",
            "--local-port",
            "7001",
        ]);
        let mut config = Config::default();
        config.firewall.blacklist_size = 5;
        config.apply_args(&matches);

        assert_eq!(config.firewall.mode, Mode::Drop);
        assert_eq!(config.firewall.whitelist_size, 10);
        assert_eq!(config.firewall.blacklist_size, 5);
        assert_eq!(config.pit.size, 99);
        assert_eq!(config.network.remote_address, "192.168.1.1");
        assert_eq!(config.network.local_port, 7001);
        assert_eq!(config.network.command_port, 6362);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.network.remote_address = "localhost".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidRemoteAddress("localhost".to_string()))
        );

        let mut config = Config::default();
        config.pit.size = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("pit size")));
    }
}
