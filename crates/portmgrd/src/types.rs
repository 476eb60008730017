//! Port type lattice and the per-port sub-records.
//!
//! A port's role is a *set* of [`PortType`] flags rather than a single
//! variant: a physical port that joins a VLAN is `REAL | VLANSIF`, a VXLAN
//! bridge that joins one is `VXLANBR | VLANSIF`. Which combinations can be
//! reached is decided by the registry's transition table, not by the flag
//! type itself.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::mac::MacAddress;

/// Maximum number of bond interfaces.
pub const MAX_BOND_IFS: u32 = 8;

/// Maximum number of physical and logical (non-bond) interfaces.
pub const MAX_PHY_IFS: u32 = 128;

/// Size of the hardware-visible port number space.
pub const MAX_IFS: u32 = 512;

/// Bridge-domain offset for a physical port's default VLAN.
pub const REAL_PORT_VB: u32 = 3800;

/// Bridge-domain offset for a bond's default VLAN.
pub const BOND_VB: u32 = 4000;

/// MTU of auto-created bridge domains.
pub const BRIDGE_DOMAIN_MTU: u32 = 9000;

bitflags! {
    /// Structural roles a port can hold.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PortType: u32 {
        /// Physical port.
        const REAL = 0x1;
        /// Bond slave.
        const BONDSIF = 0x2;
        /// Bond (aggregate).
        const BOND = 0x4;
        /// VLAN slave / sub-interface.
        const VLANSIF = 0x8;
        /// VLAN bridge.
        const VLANBR = 0x10;
        /// VXLAN slave.
        const VXLANSIF = 0x20;
        /// VXLAN bridge (tunnel endpoint).
        const VXLANBR = 0x40;
        /// Wireguard interface.
        const WG = 0x80;
    }
}

impl PortType {
    /// Comma-joined role tags, as shown in port summaries.
    ///
    /// `real_name` is appended in parentheses to the `vxlan` tag.
    pub fn tags(&self, real_name: Option<&str>) -> String {
        let mut tags: Vec<String> = Vec::new();
        if self.contains(PortType::REAL) {
            tags.push("phy".into());
        }
        if self.contains(PortType::VLANSIF) {
            tags.push("vlan-sif".into());
        }
        if self.contains(PortType::VLANBR) {
            tags.push("vlan".into());
        }
        if self.contains(PortType::BONDSIF) {
            tags.push("bond-sif".into());
        }
        if self.contains(PortType::BOND) {
            tags.push("bond".into());
        }
        if self.contains(PortType::VXLANSIF) {
            tags.push("vxlan-sif".into());
        }
        if self.contains(PortType::VXLANBR) {
            match real_name {
                Some(real) => tags.push(format!("vxlan({})", real)),
                None => tags.push("vxlan".into()),
            }
        }
        if self.contains(PortType::WG) {
            tags.push("wg".into());
        }
        tags.join(",")
    }

    /// Parses a comma-separated tag list such as `"phy"` or `"vxlan,vlan-sif"`.
    pub fn from_tags(s: &str) -> Result<Self, String> {
        let mut ptype = PortType::empty();
        for tag in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            ptype |= match tag.to_lowercase().as_str() {
                "phy" | "real" => PortType::REAL,
                "bond-sif" | "bondsif" => PortType::BONDSIF,
                "bond" => PortType::BOND,
                "vlan-sif" | "vlansif" => PortType::VLANSIF,
                "vlan" | "vlanbr" => PortType::VLANBR,
                "vxlan-sif" | "vxlansif" => PortType::VXLANSIF,
                "vxlan" | "vxlanbr" => PortType::VXLANBR,
                "wg" => PortType::WG,
                _ => return Err(format!("Unknown port type: {}", tag)),
            };
        }
        if ptype.is_empty() {
            return Err(format!("Empty port type: {:?}", s));
        }
        Ok(ptype)
    }
}

/// Hardware view of a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortHwInfo {
    pub mac: MacAddress,
    /// Lower link (carrier) is up.
    pub link: bool,
    /// Administratively up.
    pub state: bool,
    pub mtu: u32,
    /// Aggregating port (bond or VLAN bridge) this port is enslaved to.
    pub master: Option<String>,
    /// Underlying physical port for overlay types.
    pub real: Option<String>,
    pub tun_id: u32,
}

impl PortHwInfo {
    /// Descriptor for an auto-created bridge domain.
    pub fn bridge_domain() -> Self {
        Self {
            mac: MacAddress::BRIDGE_DOMAIN,
            link: true,
            state: true,
            mtu: BRIDGE_DOMAIN_MTU,
            master: None,
            real: None,
            tun_id: 0,
        }
    }
}

/// Software/composite-type state of a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSwInfo {
    pub os_id: i32,
    pub port_type: PortType,
    /// OS interface was present at the last poll.
    pub active: bool,
    /// Real port backing this overlay (name).
    pub real_ref: Option<String>,
    /// Overlay riding on this real port (name).
    pub overlay_ref: Option<String>,
}

/// Layer-2 role of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLayer2Info {
    /// Untagged/native VLAN role.
    pub is_pvid: bool,
    /// VLAN / bridge-domain id.
    pub vid: u32,
}

impl PortLayer2Info {
    pub fn new(is_pvid: bool, vid: u32) -> Self {
        Self { is_pvid, vid }
    }

    /// Untagged membership in `vid`.
    pub fn pvid(vid: u32) -> Self {
        Self { is_pvid: true, vid }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLayer3Info {
    pub routed: bool,
    pub ipv4_addrs: Vec<String>,
    pub ipv6_addrs: Vec<String>,
}

/// Interface counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatsInfo {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_type_tags() {
        assert_eq!(PortType::REAL.tags(None), "phy");
        assert_eq!((PortType::REAL | PortType::VLANSIF).tags(None), "phy,vlan-sif");
        assert_eq!(PortType::BOND.tags(None), "bond");
        assert_eq!(PortType::VXLANBR.tags(Some("eth0")), "vxlan(eth0)");
        assert_eq!(PortType::WG.tags(None), "wg");
    }

    #[test]
    fn test_port_type_parse() {
        assert_eq!(PortType::from_tags("phy").unwrap(), PortType::REAL);
        assert_eq!(
            PortType::from_tags("vxlan, vlan-sif").unwrap(),
            PortType::VXLANBR | PortType::VLANSIF
        );
        assert!(PortType::from_tags("bogus").is_err());
        assert!(PortType::from_tags("").is_err());
    }

    #[test]
    fn test_bridge_domain_descriptor() {
        let hw = PortHwInfo::bridge_domain();
        assert_eq!(hw.mac, MacAddress::BRIDGE_DOMAIN);
        assert!(hw.link && hw.state);
        assert_eq!(hw.mtu, 9000);
    }
}
