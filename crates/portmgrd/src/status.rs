//! Port status reporting: JSON dumps and human-readable summaries.

use std::io::Write;

use crate::port::Port;
use crate::registry::PortRegistry;
use crate::zone::ZoneOps;

/// Line sink for port summaries.
pub trait NodeWalker {
    fn walk(&mut self, line: &str);
}

/// Collects summary lines into a string.
impl NodeWalker for String {
    fn walk(&mut self, line: &str) {
        self.push_str(line);
    }
}

fn summary(port: &Port) -> [String; 2] {
    let mut state = if port.hw.state { "UP" } else { "DOWN" }.to_string();
    if port.hw.link {
        state.push_str(",RUNNING");
    }
    [
        format!("{:<10}: <{}> mtu {} {}\n", port.name, state, port.hw.mtu, port.zone),
        format!(
            "{:<10}  ether {}  {}\n",
            "",
            port.hw.mac,
            port.port_type().tags(port.real_ref())
        ),
    ]
}

impl<Z: ZoneOps> PortRegistry<Z> {
    /// Writes every live port as one JSON array.
    pub fn ports_to_json<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, &self.ports())
    }

    /// Renders a two-line summary per port into `sink`, in name order.
    pub fn ports_to_string(&self, sink: &mut dyn NodeWalker) {
        for port in self.ports() {
            for line in summary(port) {
                sink.walk(&line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::DpSender;
    use crate::mac::MacAddress;
    use crate::types::{PortHwInfo, PortLayer2Info, PortType};
    use crate::zone::ZoneTable;
    use pretty_assertions::assert_eq;

    fn registry_with_eth0() -> PortRegistry {
        let (tx, _rx) = DpSender::channel();
        let zones = ZoneTable::with_zones(["default"]).unwrap();
        let mut reg = PortRegistry::new(zones, tx);
        let hw = PortHwInfo {
            mac: MacAddress::new([0x02, 0, 0, 0, 0, 0x07]),
            link: true,
            state: true,
            mtu: 1500,
            ..Default::default()
        };
        reg.add("eth0", 7, PortType::REAL, "default", hw, PortLayer2Info::default())
            .unwrap();
        reg
    }

    #[test]
    fn test_ports_to_string() {
        let reg = registry_with_eth0();
        let mut out = String::new();
        reg.ports_to_string(&mut out);
        let expected = format!(
            "{:<10}: <UP,RUNNING> mtu 1500 default\n{:12}ether 02:00:00:00:00:07  phy\n",
            "eth0", ""
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_ports_to_json() {
        let reg = registry_with_eth0();
        let mut buf = Vec::new();
        reg.ports_to_json(&mut buf).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json[0]["name"], "eth0");
        assert_eq!(json[0]["hw"]["mac"], "02:00:00:00:00:07");
        assert_eq!(json[0]["l2"]["vid"], 3801);
        assert_eq!(json[0]["sw"]["port_type"], "REAL");
    }
}
