//! Zone collaborator.
//!
//! Zones own bridge domains and port membership. The registry only needs the
//! narrow [`ZoneOps`] surface; [`ZoneTable`] is the in-memory implementation
//! used by the daemon and the tests.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::debug;

use crate::types::PortHwInfo;

/// Zone operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("no such zone: {0}")]
    NoSuchZone(String),

    #[error("zone already exists: {0}")]
    ZoneExists(String),

    #[error("port {port} belongs to zone {zone}")]
    PortInOtherZone { port: String, zone: String },

    #[error("zone {0} still has ports")]
    ZoneBusy(String),
}

/// Lookup result for a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInfo {
    pub name: String,
    /// Zone number programmed into the dataplane.
    pub index: u32,
}

/// Bridge domain owned by a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeDomain {
    pub vid: u32,
    pub name: String,
    pub zone: String,
    pub parent_vid: Option<u32>,
    pub hw: PortHwInfo,
}

/// What the port registry needs from the zone subsystem.
pub trait ZoneOps: Send {
    /// Checks that `name` may live in `zone`.
    fn validate_port(&self, name: &str, zone: &str) -> Result<(), ZoneError>;

    fn find(&self, zone: &str) -> Option<ZoneInfo>;

    /// Dataplane zone number for `zone`.
    fn zone_index(&self, zone: &str) -> Option<u32> {
        self.find(zone).map(|z| z.index)
    }

    fn add_bridge_domain(
        &mut self,
        vid: u32,
        name: &str,
        zone: &str,
        parent_vid: Option<u32>,
        hw: &PortHwInfo,
    ) -> Result<(), ZoneError>;

    fn delete_bridge_domain(&mut self, vid: u32) -> Option<BridgeDomain>;

    fn register_port(&mut self, name: &str, zone: &str) -> Result<(), ZoneError>;

    fn deregister_port(&mut self, name: &str);

    /// Zone the port is registered in.
    fn port_zone(&self, name: &str) -> Option<String>;
}

/// In-memory zone table.
#[derive(Debug, Default)]
pub struct ZoneTable {
    zones: HashMap<String, ZoneInfo>,
    next_index: u32,
    bridge_domains: BTreeMap<u32, BridgeDomain>,
    port_zone: HashMap<String, String>,
}

impl ZoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table holding the named zones, numbered in order.
    pub fn with_zones<I, S>(names: I) -> Result<Self, ZoneError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for name in names {
            table.add_zone(name.as_ref())?;
        }
        Ok(table)
    }

    /// Adds a zone and returns its index.
    pub fn add_zone(&mut self, name: &str) -> Result<u32, ZoneError> {
        if self.zones.contains_key(name) {
            return Err(ZoneError::ZoneExists(name.to_string()));
        }
        let index = self.next_index;
        self.next_index += 1;
        self.zones.insert(
            name.to_string(),
            ZoneInfo {
                name: name.to_string(),
                index,
            },
        );
        debug!("Added zone {} index {}", name, index);
        Ok(index)
    }

    /// Removes an empty zone.
    pub fn delete_zone(&mut self, name: &str) -> Result<(), ZoneError> {
        if !self.zones.contains_key(name) {
            return Err(ZoneError::NoSuchZone(name.to_string()));
        }
        if self.port_zone.values().any(|z| z == name) {
            return Err(ZoneError::ZoneBusy(name.to_string()));
        }
        self.zones.remove(name);
        self.bridge_domains.retain(|_, bd| bd.zone != name);
        Ok(())
    }

    pub fn bridge_domain(&self, vid: u32) -> Option<&BridgeDomain> {
        self.bridge_domains.get(&vid)
    }

    pub fn bridge_domains(&self) -> impl Iterator<Item = &BridgeDomain> {
        self.bridge_domains.values()
    }

    pub fn bridge_domain_count(&self) -> usize {
        self.bridge_domains.len()
    }

    /// Ports registered in `zone`.
    pub fn zone_ports(&self, zone: &str) -> Vec<&str> {
        let mut ports: Vec<&str> = self
            .port_zone
            .iter()
            .filter(|(_, z)| z.as_str() == zone)
            .map(|(p, _)| p.as_str())
            .collect();
        ports.sort_unstable();
        ports
    }
}

impl ZoneOps for ZoneTable {
    fn validate_port(&self, name: &str, zone: &str) -> Result<(), ZoneError> {
        if !self.zones.contains_key(zone) {
            return Err(ZoneError::NoSuchZone(zone.to_string()));
        }
        match self.port_zone.get(name) {
            Some(owner) if owner != zone => Err(ZoneError::PortInOtherZone {
                port: name.to_string(),
                zone: owner.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn find(&self, zone: &str) -> Option<ZoneInfo> {
        self.zones.get(zone).cloned()
    }

    fn add_bridge_domain(
        &mut self,
        vid: u32,
        name: &str,
        zone: &str,
        parent_vid: Option<u32>,
        hw: &PortHwInfo,
    ) -> Result<(), ZoneError> {
        if !self.zones.contains_key(zone) {
            return Err(ZoneError::NoSuchZone(zone.to_string()));
        }
        self.bridge_domains.insert(
            vid,
            BridgeDomain {
                vid,
                name: name.to_string(),
                zone: zone.to_string(),
                parent_vid,
                hw: hw.clone(),
            },
        );
        Ok(())
    }

    fn delete_bridge_domain(&mut self, vid: u32) -> Option<BridgeDomain> {
        self.bridge_domains.remove(&vid)
    }

    fn register_port(&mut self, name: &str, zone: &str) -> Result<(), ZoneError> {
        self.validate_port(name, zone)?;
        self.port_zone.insert(name.to_string(), zone.to_string());
        Ok(())
    }

    fn deregister_port(&mut self, name: &str) {
        self.port_zone.remove(name);
    }

    fn port_zone(&self, name: &str) -> Option<String> {
        self.port_zone.get(name).cloned()
    }
}
