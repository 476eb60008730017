//! PortRegistry - owner of every port and the interface-type lattice.
//!
//! Ports are stored once, in a map keyed by name (the map of record), and
//! indexed twice more: by OS interface id and by hardware port number.
//! Back-references between ports (`real_ref`, `overlay_ref`, `master`) are
//! names resolved through the registry, never direct references.
//!
//! # Role transitions
//!
//! Adding a port that already exists is a role transition. Only these are
//! legal; every other combination fails with [`PortError::PortExists`] and
//! leaves the port untouched:
//!
//! | existing | requested        | precondition          |
//! |----------|------------------|-----------------------|
//! | REAL     | VLANSIF (pvid)   | l2 info differs       |
//! | REAL     | BONDSIF          | master exists         |
//! | BOND     | VLANSIF (pvid)   | l2 info differs       |
//! | VXLANBR  | VLANSIF (pvid)   | -                     |
//!
//! Every structural change is pushed to the dataplane as a remove followed by
//! a create (see [`crate::dp_sync`]).

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::counter::Counter;
use crate::dataplane::{DpSender, DpWork};
use crate::error::{DaemonError, PortError, Result};
use crate::link::LinkProbe;
use crate::notify::{PortEvent, PortNotifier};
use crate::port::Port;
use crate::types::{
    PortHwInfo, PortLayer2Info, PortType, BOND_VB, MAX_BOND_IFS, MAX_IFS, MAX_PHY_IFS,
};
use crate::zone::{ZoneOps, ZoneTable};

/// Pool sizing for a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Interface numbers handed out from `[1, max_phy_ifs]`.
    pub max_phy_ifs: u32,
    /// Bond numbers handed out from the top `max_bond_ifs` slots.
    pub max_bond_ifs: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_phy_ifs: MAX_PHY_IFS,
            max_bond_ifs: MAX_BOND_IFS,
        }
    }
}

impl RegistryConfig {
    /// First bond port number.
    pub fn bond_base(&self) -> u32 {
        MAX_IFS - self.max_bond_ifs + 1
    }

    /// Checks both pools fit the port number space without overlapping.
    pub fn validate(&self) -> std::result::Result<(), DaemonError> {
        if self.max_phy_ifs == 0 || self.max_bond_ifs == 0 {
            return Err(DaemonError::Configuration(
                "pool sizes must be > 0".to_string(),
            ));
        }
        match self.max_phy_ifs.checked_add(self.max_bond_ifs) {
            Some(total) if total <= MAX_IFS => {}
            _ => {
                return Err(DaemonError::Configuration(format!(
                    "max_phy_ifs + max_bond_ifs must be <= {}",
                    MAX_IFS
                )))
            }
        }
        Ok(())
    }
}

/// The port registry.
pub struct PortRegistry<Z: ZoneOps = ZoneTable> {
    /// Map of record.
    pub(crate) ports: HashMap<String, Port>,
    /// Port number -> name. Slot 0 is never used.
    pub(crate) port_no_index: Vec<Option<String>>,
    /// OS interface id -> name.
    pub(crate) os_index: HashMap<i32, String>,
    notifiers: Vec<Arc<dyn PortNotifier>>,
    port_pool: Counter,
    bond_pool: Counter,
    pub(crate) zones: Z,
    pub(crate) dp: DpSender,
}

impl<Z: ZoneOps> fmt::Debug for PortRegistry<Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortRegistry")
            .field("ports", &self.ports.len())
            .field("notifiers", &self.notifiers.len())
            .field("port_pool_in_use", &self.port_pool.in_use())
            .field("bond_pool_in_use", &self.bond_pool.in_use())
            .finish()
    }
}

impl<Z: ZoneOps> PortRegistry<Z> {
    /// Creates a registry with default pool sizes.
    pub fn new(zones: Z, dp: DpSender) -> Self {
        let config = RegistryConfig::default();
        Self::build(zones, dp, config)
    }

    /// Creates a registry with custom pool sizes.
    pub fn with_config(
        zones: Z,
        dp: DpSender,
        config: RegistryConfig,
    ) -> std::result::Result<Self, DaemonError> {
        config.validate()?;
        Ok(Self::build(zones, dp, config))
    }

    fn build(zones: Z, dp: DpSender, config: RegistryConfig) -> Self {
        Self {
            ports: HashMap::new(),
            port_no_index: vec![None; MAX_IFS as usize + 1],
            os_index: HashMap::new(),
            notifiers: Vec::new(),
            port_pool: Counter::new(1, config.max_phy_ifs),
            bond_pool: Counter::new(config.bond_base(), config.max_bond_ifs),
            zones,
            dp,
        }
    }

    // ============ Lookups ============

    pub fn zones(&self) -> &Z {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut Z {
        &mut self.zones
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// All live ports, in name order.
    pub fn ports(&self) -> Vec<&Port> {
        let mut ports: Vec<&Port> = self.ports.values().collect();
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        ports
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    pub fn find_by_os_id(&self, os_id: i32) -> Option<&Port> {
        self.os_index.get(&os_id).and_then(|n| self.ports.get(n))
    }

    pub fn find_by_port_no(&self, port_no: u32) -> Option<&Port> {
        self.port_no_index
            .get(port_no as usize)
            .and_then(|slot| slot.as_deref())
            .and_then(|n| self.ports.get(n))
    }

    /// Ports enslaved to `master`, in name order.
    pub fn get_slaves(&self, master: &str) -> Vec<&Port> {
        let mut slaves: Vec<&Port> = self
            .ports
            .values()
            .filter(|p| p.master() == Some(master))
            .collect();
        slaves.sort_by(|a, b| a.name.cmp(&b.name));
        slaves
    }

    /// Slaves of `master` holding every role in `mask`.
    pub fn has_tunnel_slaves(&self, master: &str, mask: PortType) -> (bool, Vec<&Port>) {
        let slaves: Vec<&Port> = self
            .get_slaves(master)
            .into_iter()
            .filter(|p| p.is(mask))
            .collect();
        (!slaves.is_empty(), slaves)
    }

    /// Returns true if `name` exists and its MAC equals `candidate`'s.
    pub fn mac_matches(&self, name: &str, candidate: &Port) -> bool {
        self.find_by_name(name)
            .is_some_and(|p| p.hw.mac == candidate.hw.mac)
    }

    /// Bridge domain of a bond's default VLAN.
    pub fn bond_vid(&self, port_no: u32) -> u32 {
        port_no - self.bond_pool.base() + 1 + BOND_VB
    }

    /// Default VLAN a port reverts to when it loses a stacked role.
    fn default_vid(&self, port: &Port) -> u32 {
        if port.is(PortType::BOND) {
            self.bond_vid(port.port_no)
        } else if port.is(PortType::VXLANBR) {
            port.hw.tun_id
        } else {
            port.real_default_vid()
        }
    }

    fn port_mut(&mut self, name: &str) -> Result<&mut Port> {
        self.ports
            .get_mut(name)
            .ok_or_else(|| PortError::NotExist(name.to_string()))
    }

    // ============ Mutations ============

    /// Adds a port, or a role to an existing port.
    #[instrument(skip(self, hw, l2))]
    pub fn add(
        &mut self,
        name: &str,
        os_id: i32,
        ptype: PortType,
        zone: &str,
        hw: PortHwInfo,
        l2: PortLayer2Info,
    ) -> Result<()> {
        if let Err(e) = self.zones.validate_port(name, zone) {
            return Err(PortError::ZoneInvalid(e.to_string()));
        }
        if self.zones.find(zone).is_none() {
            return Err(PortError::ZoneInvalid(format!("no such zone: {}", zone)));
        }

        if self.ports.contains_key(name) {
            return self.add_role(name, ptype, hw, l2);
        }

        if let Some(owner) = self.os_index.get(&os_id) {
            return Err(PortError::PortExists(format!(
                "os id {} in use by {}",
                os_id, owner
            )));
        }

        let real = match hw.real.as_deref() {
            Some(real) if self.ports.contains_key(real) => Some(real.to_string()),
            Some(real) => return Err(PortError::NoRealDev(real.to_string())),
            None if ptype.contains(PortType::VXLANBR) => {
                return Err(PortError::NoRealDev(format!("{} needs a real device", name)))
            }
            None => None,
        };

        let port_no = if ptype.contains(PortType::BOND) {
            self.bond_pool.acquire()?
        } else {
            self.port_pool.acquire()?
        };

        let mut port = Port::new(name, port_no, os_id, ptype, zone, hw);

        if ptype == PortType::REAL || ptype == PortType::BOND {
            let vid = if ptype == PortType::BOND {
                self.bond_vid(port_no)
            } else {
                port.real_default_vid()
            };
            port.l2 = PortLayer2Info::pvid(vid);

            // Every base port keeps a default bridge domain in its zone.
            let bd_name = format!("vlan{}", vid);
            if let Err(e) = self.zones.add_bridge_domain(
                vid,
                &bd_name,
                zone,
                None,
                &PortHwInfo::bridge_domain(),
            ) {
                warn!("Failed to add bridge domain {} for {}: {}", vid, name, e);
            }
        } else if ptype == PortType::VXLANBR {
            port.l2 = PortLayer2Info::pvid(port.hw.tun_id);
        } else {
            debug!("{}: is_pvid {}", name, l2.is_pvid);
            port.l2 = l2;
        }

        self.ports.insert(name.to_string(), port);
        self.port_no_index[port_no as usize] = Some(name.to_string());
        self.os_index.insert(os_id, name.to_string());

        if ptype == PortType::VXLANBR {
            if let Some(real) = real.as_deref() {
                self.link_overlay(name, real);
            }
        }

        if let Err(e) = self.zones.register_port(name, zone) {
            warn!("Zone {} refused membership of {}: {}", zone, name, e);
        }

        info!("Added port {} port_no {} os_id {}", name, port_no, os_id);
        self.port_dp(name, DpWork::Create);
        Ok(())
    }

    /// Applies a role transition to an existing port.
    fn add_role(
        &mut self,
        name: &str,
        ptype: PortType,
        hw: PortHwInfo,
        l2: PortLayer2Info,
    ) -> Result<()> {
        let (current, current_l2) = match self.ports.get(name) {
            Some(p) => (p.port_type(), p.l2),
            None => return Err(PortError::NotExist(name.to_string())),
        };

        if current == PortType::REAL && ptype == PortType::VLANSIF && l2.is_pvid {
            if l2 != current_l2 {
                self.port_dp(name, DpWork::Remove);
                let port = self.port_mut(name)?;
                port.hw.master = hw.master;
                port.sw.port_type |= PortType::VLANSIF;
                port.l2 = l2;
                self.port_dp(name, DpWork::Create);
                debug!("Port {} vlan info updated", name);
                return Ok(());
            }
        } else if current == PortType::REAL && ptype == PortType::BONDSIF {
            let master = hw
                .master
                .ok_or_else(|| PortError::NoMaster(format!("{} names no master", name)))?;
            let vid = match self.ports.get(&master) {
                Some(m) if m.is(PortType::BOND) => self.bond_vid(m.port_no),
                Some(m) => m.l2.vid,
                None => return Err(PortError::NoMaster(master)),
            };

            self.port_dp(name, DpWork::Remove);
            let port = self.port_mut(name)?;
            port.sw.port_type |= PortType::BONDSIF;
            port.hw.master = Some(master);
            port.l2 = PortLayer2Info::pvid(vid);
            self.port_dp(name, DpWork::Create);
            debug!("Port {} enslaved to bond", name);
            return Ok(());
        } else if current == PortType::BOND && ptype == PortType::VLANSIF && l2.is_pvid {
            if l2 != current_l2 {
                self.port_dp(name, DpWork::Remove);
                let port = self.port_mut(name)?;
                port.l2 = l2;
                port.sw.port_type |= PortType::VLANSIF;
                self.port_dp(name, DpWork::Create);
                debug!("Bond {} vlan info updated", name);
                return Ok(());
            }
        } else if current == PortType::VXLANBR && ptype == PortType::VLANSIF && l2.is_pvid {
            let port = self.port_mut(name)?;
            port.hw.master = hw.master;
            port.sw.port_type |= PortType::VLANSIF;
            self.port_dp(name, DpWork::Remove);
            self.port_mut(name)?.l2 = l2;
            self.port_dp(name, DpWork::Create);
            debug!("Port {} vlan info updated", name);
            return Ok(());
        }

        Err(PortError::PortExists(name.to_string()))
    }

    /// Removes a role from a port, or the port itself.
    #[instrument(skip(self))]
    pub fn delete(&mut self, name: &str, ptype: PortType) -> Result<()> {
        let (current, real_vid, default_vid) = match self.ports.get(name) {
            Some(p) => (p.port_type(), p.real_default_vid(), self.default_vid(p)),
            None => return Err(PortError::NotExist(name.to_string())),
        };

        // (role stripped, reverted vid, clear master)
        let strip = if current.contains(PortType::REAL | PortType::VLANSIF)
            && ptype == PortType::VLANSIF
        {
            Some((PortType::VLANSIF, real_vid, true))
        } else if current.contains(PortType::VXLANBR | PortType::VLANSIF)
            && (ptype == PortType::VXLANBR || ptype == PortType::VLANSIF)
        {
            Some((PortType::VLANSIF, default_vid, true))
        } else if current.contains(PortType::BOND | PortType::VLANSIF)
            && ptype == PortType::VLANSIF
        {
            Some((PortType::VLANSIF, default_vid, false))
        } else if current.contains(PortType::REAL | PortType::BONDSIF)
            && ptype == PortType::BONDSIF
        {
            Some((PortType::BONDSIF, real_vid, true))
        } else {
            None
        };

        if let Some((role, vid, clear_master)) = strip {
            self.port_dp(name, DpWork::Remove);
            let port = self.port_mut(name)?;
            port.sw.port_type.remove(role);
            if clear_master {
                port.hw.master = None;
            }
            port.l2 = PortLayer2Info::pvid(vid);
            self.port_dp(name, DpWork::Create);
            debug!("Port {} lost role {:?}", name, role);
            return Ok(());
        }

        if ptype != current {
            return Err(PortError::NotExist(format!(
                "{} has no role {:?}",
                name, ptype
            )));
        }

        self.remove_port(name)
    }

    /// Fully removes a port and releases its slots.
    fn remove_port(&mut self, name: &str) -> Result<()> {
        let (port_no, os_id, is_bond) = match self.ports.get(name) {
            Some(p) => (p.port_no, p.os_id(), p.is(PortType::BOND)),
            None => return Err(PortError::NotExist(name.to_string())),
        };

        let indexed = self
            .port_no_index
            .get(port_no as usize)
            .and_then(|slot| slot.as_deref());
        if indexed != Some(name) {
            error!("Port {} missing from port number index slot {}", name, port_no);
            return Err(PortError::MapError(format!(
                "{} not in port number index",
                name
            )));
        }
        if self.os_index.get(&os_id).map(String::as_str) != Some(name) {
            error!("Port {} missing from os id index ({})", name, os_id);
            return Err(PortError::MapError(format!("{} not in os id index", name)));
        }

        self.port_dp(name, DpWork::Remove);

        self.unlink_overlay(name);
        self.detach_dependents(name);

        if is_bond {
            let vid = self.bond_vid(port_no);
            if self.zones.delete_bridge_domain(vid).is_none() {
                warn!("Bond {} had no bridge domain {}", name, vid);
            }
        }
        self.zones.deregister_port(name);

        self.ports.remove(name);
        self.os_index.remove(&os_id);
        self.port_no_index[port_no as usize] = None;

        let released = if is_bond {
            self.bond_pool.release(port_no)
        } else {
            self.port_pool.release(port_no)
        };
        if let Err(e) = released {
            warn!("Port {} number {} release failed: {}", name, port_no, e);
        }

        info!("Deleted port {} port_no {}", name, port_no);
        Ok(())
    }

    /// Links an overlay and its real port. Both ends are set here and only here.
    fn link_overlay(&mut self, overlay: &str, real: &str) {
        if let Some(r) = self.ports.get_mut(real) {
            r.sw.overlay_ref = Some(overlay.to_string());
        }
        if let Some(o) = self.ports.get_mut(overlay) {
            o.sw.real_ref = Some(real.to_string());
        }
    }

    /// Clears the overlay pairing `name` takes part in, from either end.
    fn unlink_overlay(&mut self, name: &str) {
        let Some(port) = self.ports.get_mut(name) else {
            return;
        };
        let overlay = port.sw.overlay_ref.take();
        let real = if port.is(PortType::VXLANBR) {
            port.sw.real_ref.take()
        } else {
            None
        };

        if let Some(overlay) = overlay {
            if let Some(o) = self.ports.get_mut(&overlay) {
                if o.real_ref() == Some(name) {
                    o.sw.real_ref = None;
                }
            }
        }
        if let Some(real) = real {
            if let Some(r) = self.ports.get_mut(&real) {
                if r.overlay_ref() == Some(name) {
                    r.sw.overlay_ref = None;
                }
            }
        }
    }

    /// Drops `real_ref` links other ports still hold to `name`.
    fn detach_dependents(&mut self, name: &str) {
        for port in self.ports.values_mut() {
            if port.name != name && port.real_ref() == Some(name) {
                warn!("Port {} loses real device {}", port.name, name);
                port.sw.real_ref = None;
            }
        }
    }

    /// Reserved for in-place attribute updates.
    pub fn update(&mut self) {}

    /// Deletes every port, dependents before the ports they depend on.
    ///
    /// Order: tunnel slaves, bridge slaves, bond slaves, bonds, bridges,
    /// tunnels, real devices.
    pub fn destroy_all(&mut self) {
        let order = [
            PortType::VXLANSIF,
            PortType::VLANSIF,
            PortType::BONDSIF,
            PortType::BOND,
            PortType::VLANBR,
            PortType::VXLANBR,
            PortType::REAL,
        ];

        let buckets: Vec<(PortType, Vec<String>)> = order
            .iter()
            .map(|role| {
                let names: Vec<String> = self
                    .ports()
                    .into_iter()
                    .filter(|p| p.is(*role))
                    .map(|p| p.name.clone())
                    .collect();
                (*role, names)
            })
            .collect();

        for (role, names) in buckets {
            for name in names {
                if let Err(e) = self.delete(&name, role) {
                    debug!("Teardown of {} as {:?} skipped: {}", name, role, e);
                }
            }
        }

        // Ports holding none of the ordered roles (e.g. wireguard).
        let rest: Vec<(String, PortType)> = self
            .ports()
            .into_iter()
            .map(|p| (p.name.clone(), p.port_type()))
            .collect();
        for (name, ptype) in rest {
            if let Err(e) = self.delete(&name, ptype) {
                error!("Teardown of {} failed: {}", name, e);
            }
        }

        info!("Destroyed all ports, {} left", self.ports.len());
    }

    // ============ Notification ============

    /// Adds an observer of link events. Observers are never removed.
    pub fn register_notifier(&mut self, notifier: Arc<dyn PortNotifier>) {
        self.notifiers.push(notifier);
    }

    /// One polling pass over every port.
    ///
    /// Admin transitions fire `UP` or `DOWN`. Losing carrier while admin up
    /// fires `LOWER_DOWN`. An interface that vanished from the OS fires
    /// `DELETE` once and the port is marked inactive; it is not deleted.
    /// Returns the number of events fired.
    pub fn poll_link_state(&mut self, probe: &dyn LinkProbe) -> io::Result<usize> {
        let snapshot = probe.snapshot()?;
        let mut events: Vec<(String, i32, PortEvent)> = Vec::new();

        for port in self.ports.values_mut() {
            let Some(os) = snapshot.get(&port.name) else {
                if port.sw.active {
                    port.sw.active = false;
                    events.push((port.name.clone(), port.os_id(), PortEvent::DELETE));
                }
                continue;
            };

            if !port.sw.active {
                debug!("Port {} reappeared", port.name);
                port.sw.active = true;
            }

            if port.hw.state && !os.admin_up {
                port.hw.state = false;
                events.push((port.name.clone(), port.os_id(), PortEvent::DOWN));
            } else if !port.hw.state && os.admin_up {
                port.hw.state = true;
                events.push((port.name.clone(), port.os_id(), PortEvent::UP));
            }

            if port.hw.link && !os.running {
                port.hw.link = false;
                if port.hw.state {
                    events.push((port.name.clone(), port.os_id(), PortEvent::LOWER_DOWN));
                }
            } else if !port.hw.link && os.running {
                port.hw.link = true;
            }
        }

        events.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, os_id, event) in &events {
            debug!("Port {} event {:?}", name, event);
            for notifier in &self.notifiers {
                notifier.port_notify(name, *os_id, *event);
            }
        }
        Ok(events.len())
    }
}
