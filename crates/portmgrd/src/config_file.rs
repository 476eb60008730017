//! Configuration file support for portmgrd
//!
//! Loads and validates portmgrd configuration from TOML files.
//! Default location: /etc/portmgrd/portmgrd.toml

use crate::error::DaemonError;
use crate::mac::MacAddress;
use crate::registry::{PortRegistry, RegistryConfig};
use crate::types::{PortHwInfo, PortLayer2Info, PortType, MAX_BOND_IFS, MAX_PHY_IFS};
use crate::zone::{ZoneOps, ZoneTable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/portmgrd/portmgrd.toml";

type Result<T> = std::result::Result<T, DaemonError>;

/// Port number pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Interface (non-bond) port numbers
    #[serde(default = "default_max_phy_ifs")]
    pub max_phy_ifs: u32,

    /// Bond port numbers
    #[serde(default = "default_max_bond_ifs")]
    pub max_bond_ifs: u32,
}

/// Link-state ticker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerConfig {
    /// Polling period in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Run the ticker at all
    #[serde(default = "default_ticker_enabled")]
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. "info" or "dp_portmgrd=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
}

/// Port added at start-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPortConfig {
    pub name: String,
    pub os_id: i32,

    /// Role tags, e.g. "phy", "bond", "bond-sif", "vxlan"
    #[serde(rename = "type")]
    pub port_type: String,

    #[serde(default = "default_zone")]
    pub zone: String,

    #[serde(default = "default_mtu")]
    pub mtu: u32,

    #[serde(default)]
    pub mac: Option<MacAddress>,

    #[serde(default)]
    pub master: Option<String>,

    #[serde(default)]
    pub real: Option<String>,

    #[serde(default)]
    pub tun_id: u32,

    #[serde(default)]
    pub pvid: bool,

    #[serde(default)]
    pub vid: u32,
}

/// Complete portmgrd configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortmgrConfig {
    #[serde(default)]
    pub pools: PoolConfig,

    #[serde(default)]
    pub ticker: TickerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default = "default_zones")]
    pub zones: Vec<ZoneConfig>,

    #[serde(default)]
    pub ports: Vec<StaticPortConfig>,
}

// Default functions
fn default_max_phy_ifs() -> u32 {
    MAX_PHY_IFS
}

fn default_max_bond_ifs() -> u32 {
    MAX_BOND_IFS
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_ticker_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_zone() -> String {
    "default".to_string()
}

fn default_mtu() -> u32 {
    1500
}

fn default_zones() -> Vec<ZoneConfig> {
    vec![ZoneConfig {
        name: default_zone(),
    }]
}

// Default implementations
impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_phy_ifs: default_max_phy_ifs(),
            max_bond_ifs: default_max_bond_ifs(),
        }
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            enabled: default_ticker_enabled(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PortmgrConfig {
    fn default() -> Self {
        Self {
            pools: PoolConfig::default(),
            ticker: TickerConfig::default(),
            logging: LoggingConfig::default(),
            zones: default_zones(),
            ports: Vec::new(),
        }
    }
}

impl StaticPortConfig {
    pub fn port_type(&self) -> Result<PortType> {
        PortType::from_tags(&self.port_type).map_err(|e| {
            DaemonError::Configuration(format!("port {}: {}", self.name, e))
        })
    }

    pub fn hw_info(&self) -> PortHwInfo {
        PortHwInfo {
            mac: self.mac.unwrap_or_default(),
            link: true,
            state: true,
            mtu: self.mtu,
            master: self.master.clone(),
            real: self.real.clone(),
            tun_id: self.tun_id,
        }
    }

    pub fn l2_info(&self) -> PortLayer2Info {
        PortLayer2Info::new(self.pvid, self.vid)
    }
}

impl PortmgrConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    DaemonError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(DaemonError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            DaemonError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_phy_ifs: self.pools.max_phy_ifs,
            max_bond_ifs: self.pools.max_bond_ifs,
        }
    }

    /// Get polling period as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.ticker.poll_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.registry_config().validate()?;

        if self.ticker.poll_interval_ms == 0 {
            return Err(DaemonError::Configuration(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        let mut zones = HashSet::new();
        for zone in &self.zones {
            if zone.name.is_empty() {
                return Err(DaemonError::Configuration(
                    "zone name must not be empty".to_string(),
                ));
            }
            if !zones.insert(zone.name.as_str()) {
                return Err(DaemonError::Configuration(format!(
                    "duplicate zone {}",
                    zone.name
                )));
            }
        }

        for port in &self.ports {
            port.port_type()?;
            if !zones.contains(port.zone.as_str()) {
                return Err(DaemonError::Configuration(format!(
                    "port {} names unknown zone {}",
                    port.name, port.zone
                )));
            }
        }

        Ok(())
    }

    /// Builds the zone table, numbering zones in file order.
    pub fn zone_table(&self) -> Result<ZoneTable> {
        ZoneTable::with_zones(self.zones.iter().map(|z| z.name.as_str()))
            .map_err(|e| DaemonError::Configuration(e.to_string()))
    }

    /// Adds every static port in file order. Failures are logged and skipped.
    ///
    /// Returns the number of ports (or roles) added.
    pub fn apply_static_ports<Z: ZoneOps>(&self, registry: &mut PortRegistry<Z>) -> usize {
        let mut added = 0;
        for port in &self.ports {
            let ptype = match port.port_type() {
                Ok(ptype) => ptype,
                Err(e) => {
                    warn!("Skipping static port: {}", e);
                    continue;
                }
            };
            match registry.add(
                &port.name,
                port.os_id,
                ptype,
                &port.zone,
                port.hw_info(),
                port.l2_info(),
            ) {
                Ok(()) => added += 1,
                Err(e) => warn!(
                    "Static port {} ({}) failed: {} (code {})",
                    port.name,
                    port.port_type,
                    e,
                    e.code()
                ),
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::DpSender;
    use std::io::Write;

    const SAMPLE: &str = r#"
[pools]
max_phy_ifs = 64

[ticker]
poll_interval_ms = 250

[logging]
level = "debug"

[[zones]]
name = "default"

[[zones]]
name = "blue"

[[ports]]
name = "eth0"
os_id = 2
type = "phy"
mac = "02:00:00:00:00:02"

[[ports]]
name = "bond0"
os_id = 10
type = "bond"

[[ports]]
name = "eth0"
os_id = 2
type = "bond-sif"
master = "bond0"

[[ports]]
name = "eth1"
os_id = 3
type = "phy"
zone = "blue"
"#;

    #[test]
    fn test_default_config() {
        let config = PortmgrConfig::default();
        assert_eq!(config.pools.max_phy_ifs, 128);
        assert_eq!(config.pools.max_bond_ifs, 8);
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert!(config.ticker.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.zones, default_zones());
        assert!(config.ports.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(PortmgrConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = PortmgrConfig::default();
        config.ticker.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_pools_overflow() {
        let mut config = PortmgrConfig::default();
        config.pools.max_phy_ifs = 509;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_zone_and_type() {
        let mut config: PortmgrConfig = toml::from_str(SAMPLE).unwrap();
        config.ports[3].zone = "red".to_string();
        assert!(config.validate().is_err());

        let mut config: PortmgrConfig = toml::from_str(SAMPLE).unwrap();
        config.ports[0].port_type = "tap".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let config: PortmgrConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.pools.max_phy_ifs, 64);
        // Unspecified values should use defaults
        assert_eq!(config.pools.max_bond_ifs, 8);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.zones.len(), 2);
        assert_eq!(config.ports.len(), 4);
        assert_eq!(config.ports[0].zone, "default");
        assert_eq!(config.ports[0].mtu, 1500);
        assert_eq!(
            config.ports[0].mac,
            Some(MacAddress::new([2, 0, 0, 0, 0, 2]))
        );
        assert_eq!(config.ports[2].port_type().unwrap(), PortType::BONDSIF);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = PortmgrConfig::load_or_default("/nonexistent/portmgrd.toml").unwrap();
        assert_eq!(config.pools.max_phy_ifs, 128);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = PortmgrConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[pools\nmax_phy_ifs = ").unwrap();
        let err = PortmgrConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, DaemonError::Configuration(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portmgrd.toml");
        let mut config = PortmgrConfig::default();
        config.ticker.enabled = false;
        config.save(&path).unwrap();

        let loaded = PortmgrConfig::load_or_default(&path).unwrap();
        assert!(!loaded.ticker.enabled);
        assert_eq!(loaded.zones, config.zones);
    }

    #[test]
    fn test_apply_static_ports() {
        let config: PortmgrConfig = toml::from_str(SAMPLE).unwrap();
        let (tx, _rx) = DpSender::channel();
        let mut registry =
            PortRegistry::with_config(config.zone_table().unwrap(), tx, config.registry_config())
                .unwrap();

        assert_eq!(config.apply_static_ports(&mut registry), 4);

        let eth0 = registry.find_by_name("eth0").unwrap();
        assert_eq!(eth0.port_type(), PortType::REAL | PortType::BONDSIF);
        assert_eq!(eth0.master(), Some("bond0"));
        assert_eq!(registry.find_by_name("eth1").unwrap().zone, "blue");
        assert_eq!(registry.zones().zone_index("blue"), Some(1));
    }
}
