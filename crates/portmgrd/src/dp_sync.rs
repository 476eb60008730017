//! Dataplane synchronization.
//!
//! Translates a port's current role into the work items the forwarding plane
//! needs. The translation is pure ([`PortRegistry::build_dp_work`]); sending
//! and recording the outcome happens in `port_dp`.
//!
//! | port role              | work emitted                                 |
//! |------------------------|----------------------------------------------|
//! | VXLANBR                | none                                         |
//! | VXLANBR + VLANSIF      | router MAC on the real port                  |
//! | VLANSIF over a bond    | port work on the bond, tagged                |
//! | BOND + VLANSIF         | port work on every slave, untagged           |
//! | REAL, or over a REAL   | port work on the real port                   |

use tracing::debug;

use crate::dataplane::{
    DpSyncState, DpTunnelType, DpWork, DpWorkItem, PortDpWorkQ, RouterMacDpWorkQ,
};
use crate::port::Port;
use crate::registry::PortRegistry;
use crate::types::PortType;
use crate::zone::ZoneOps;

impl<Z: ZoneOps> PortRegistry<Z> {
    /// Work items describing `port` for the given directive.
    pub fn build_dp_work(&self, port: &Port, work: DpWork) -> Vec<DpWorkItem> {
        let Some(zone_num) = self.zones.zone_index(&port.zone) else {
            debug!("Port {} zone {} has no index", port.name, port.zone);
            return Vec::new();
        };

        let ptype = port.port_type();
        if ptype == PortType::VXLANBR {
            return Vec::new();
        }

        let real = port.real_ref().and_then(|r| self.ports.get(r));

        if ptype.contains(PortType::VXLANBR | PortType::VLANSIF) {
            let Some(up) = real else {
                debug!("Tunnel {} has no real port", port.name);
                return Vec::new();
            };
            return vec![DpWorkItem::RouterMac(RouterMacDpWorkQ {
                work,
                status: None,
                l2_addr: up.hw.mac,
                port_num: up.port_no,
                tun_id: port.hw.tun_id,
                tun_type: DpTunnelType::Vxlan,
                bd: port.l2.vid,
            })];
        }

        if ptype == PortType::VLANSIF {
            if let Some(bond) = real.filter(|r| r.is(PortType::BOND)) {
                return vec![DpWorkItem::Port(PortDpWorkQ {
                    work,
                    port_num: bond.port_no,
                    os_port_num: bond.os_id(),
                    ing_vlan: port.l2.vid,
                    set_bd: port.l2.vid,
                    set_zone_num: zone_num,
                    load_ebpf: None,
                })];
            }
        }

        if ptype.contains(PortType::BOND | PortType::VLANSIF) {
            return self
                .get_slaves(&port.name)
                .into_iter()
                .map(|slave| {
                    DpWorkItem::Port(PortDpWorkQ {
                        work,
                        port_num: slave.port_no,
                        os_port_num: slave.os_id(),
                        ing_vlan: 0,
                        set_bd: port.l2.vid,
                        set_zone_num: zone_num,
                        load_ebpf: None,
                    })
                })
                .collect();
        }

        let over_real = real.is_some_and(|r| r.is(PortType::REAL));
        if !port.is(PortType::REAL) && !over_real {
            return Vec::new();
        }

        let (port_num, os_port_num) = match real {
            Some(r) => (r.port_no, r.os_id()),
            None => (port.port_no, port.os_id()),
        };
        let ing_vlan = if port.l2.is_pvid { 0 } else { port.l2.vid };
        let load_ebpf = (port.is(PortType::REAL) || port.is(PortType::BOND))
            .then(|| port.name.clone());

        vec![DpWorkItem::Port(PortDpWorkQ {
            work,
            port_num,
            os_port_num,
            ing_vlan,
            set_bd: port.l2.vid,
            set_zone_num: zone_num,
            load_ebpf,
        })]
    }

    /// Sends `name`'s work and records the outcome. Returns the item count.
    pub(crate) fn port_dp(&mut self, name: &str, work: DpWork) -> usize {
        let items = match self.ports.get(name) {
            Some(port) => self.build_dp_work(port, work),
            None => return 0,
        };
        if items.is_empty() {
            return 0;
        }

        let count = items.len();
        let mut queued = true;
        for item in items {
            debug!("Port {} -> {}", name, item);
            queued &= self.dp.send(item);
        }

        if let Some(port) = self.ports.get_mut(name) {
            port.sync = if queued {
                DpSyncState::Queued
            } else {
                DpSyncState::Failed
            };
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use crate::dataplane::{DpReceiver, DpSender, DpSyncState, DpWork, DpWorkItem};
    use crate::mac::MacAddress;
    use crate::registry::PortRegistry;
    use crate::types::{PortHwInfo, PortLayer2Info, PortType};
    use crate::zone::ZoneTable;
    use pretty_assertions::assert_eq;

    fn registry() -> (PortRegistry, DpReceiver) {
        let (tx, rx) = DpSender::channel();
        let zones = ZoneTable::with_zones(["default"]).unwrap();
        (PortRegistry::new(zones, tx), rx)
    }

    fn drain(rx: &mut DpReceiver) -> Vec<DpWorkItem> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    fn hw(last: u8) -> PortHwInfo {
        PortHwInfo {
            mac: MacAddress::new([2, 0, 0, 0, 0, last]),
            link: true,
            state: true,
            mtu: 1500,
            ..Default::default()
        }
    }

    #[test]
    fn test_real_port_create() {
        let (mut reg, mut rx) = registry();
        reg.add("eth0", 7, PortType::REAL, "default", hw(7), PortLayer2Info::default())
            .unwrap();

        let items = drain(&mut rx);
        assert_eq!(items.len(), 1);
        let w = items[0].as_port().unwrap();
        assert_eq!(w.work, DpWork::Create);
        assert_eq!(w.port_num, 1);
        assert_eq!(w.os_port_num, 7);
        assert_eq!(w.ing_vlan, 0);
        assert_eq!(w.set_bd, 3801);
        assert_eq!(w.set_zone_num, 0);
        assert_eq!(w.load_ebpf.as_deref(), Some("eth0"));
        assert_eq!(reg.find_by_name("eth0").unwrap().sync, DpSyncState::Queued);
    }

    #[test]
    fn test_tagged_subinterface_uses_real_ids() {
        let (mut reg, mut rx) = registry();
        reg.add("eth0", 7, PortType::REAL, "default", hw(7), PortLayer2Info::default())
            .unwrap();
        let sub_hw = PortHwInfo {
            real: Some("eth0".into()),
            ..hw(8)
        };
        reg.add(
            "eth0.100",
            8,
            PortType::VLANSIF,
            "default",
            sub_hw,
            PortLayer2Info::new(false, 100),
        )
        .unwrap();

        let items = drain(&mut rx);
        let w = items.last().unwrap().as_port().unwrap();
        assert_eq!(w.port_num, 1);
        assert_eq!(w.os_port_num, 7);
        assert_eq!(w.ing_vlan, 100);
        assert_eq!(w.set_bd, 100);
        assert_eq!(w.load_ebpf, None);
    }

    #[test]
    fn test_plain_vxlan_sends_nothing() {
        let (mut reg, mut rx) = registry();
        reg.add("eth0", 7, PortType::REAL, "default", hw(7), PortLayer2Info::default())
            .unwrap();
        drain(&mut rx);

        let vx_hw = PortHwInfo {
            real: Some("eth0".into()),
            tun_id: 100,
            ..hw(9)
        };
        reg.add("vxlan100", 9, PortType::VXLANBR, "default", vx_hw, PortLayer2Info::default())
            .unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(
            reg.find_by_name("vxlan100").unwrap().sync,
            DpSyncState::Unsynced
        );
    }

    #[test]
    fn test_vxlan_vlan_member_sends_router_mac() {
        let (mut reg, mut rx) = registry();
        reg.add("eth0", 7, PortType::REAL, "default", hw(7), PortLayer2Info::default())
            .unwrap();
        let vx_hw = PortHwInfo {
            real: Some("eth0".into()),
            tun_id: 100,
            ..hw(9)
        };
        reg.add("vxlan100", 9, PortType::VXLANBR, "default", vx_hw, PortLayer2Info::default())
            .unwrap();
        drain(&mut rx);

        reg.add(
            "vxlan100",
            9,
            PortType::VLANSIF,
            "default",
            PortHwInfo {
                master: Some("vlan100".into()),
                ..Default::default()
            },
            PortLayer2Info::pvid(100),
        )
        .unwrap();

        let items = drain(&mut rx);
        assert_eq!(items.len(), 2);
        let rmac = items[1].as_router_mac().unwrap();
        assert_eq!(rmac.work, DpWork::Create);
        assert_eq!(rmac.l2_addr, MacAddress::new([2, 0, 0, 0, 0, 7]));
        assert_eq!(rmac.port_num, 1);
        assert_eq!(rmac.tun_id, 100);
        assert_eq!(rmac.bd, 100);
    }

    #[test]
    fn test_bond_vlan_fans_out_to_slaves() {
        let (mut reg, mut rx) = registry();
        reg.add("bond0", 20, PortType::BOND, "default", hw(20), PortLayer2Info::default())
            .unwrap();
        for (i, name) in ["eth0", "eth1", "eth2"].iter().enumerate() {
            let os_id = 10 + i as i32;
            reg.add(name, os_id, PortType::REAL, "default", hw(os_id as u8), PortLayer2Info::default())
                .unwrap();
            let slave_hw = PortHwInfo {
                master: Some("bond0".into()),
                ..Default::default()
            };
            reg.add(name, os_id, PortType::BONDSIF, "default", slave_hw, PortLayer2Info::default())
                .unwrap();
        }
        drain(&mut rx);

        reg.add(
            "bond0",
            20,
            PortType::VLANSIF,
            "default",
            PortHwInfo::default(),
            PortLayer2Info::pvid(100),
        )
        .unwrap();

        let items = drain(&mut rx);
        let creates: Vec<_> = items
            .iter()
            .filter(|i| i.work() == DpWork::Create)
            .map(|i| i.as_port().unwrap())
            .collect();
        assert_eq!(creates.len(), 3);
        for (w, os_id) in creates.iter().zip([10, 11, 12]) {
            assert_eq!(w.os_port_num, os_id);
            assert_eq!(w.ing_vlan, 0);
            assert_eq!(w.set_bd, 100);
        }
    }

    #[test]
    fn test_closed_dispatcher_marks_failed() {
        let (mut reg, rx) = registry();
        drop(rx);
        reg.add("eth0", 7, PortType::REAL, "default", hw(7), PortLayer2Info::default())
            .unwrap();
        assert_eq!(reg.find_by_name("eth0").unwrap().sync, DpSyncState::Failed);
    }
}
