//! Port entity.
//!
//! A [`Port`] is owned by the registry and only ever reached through its
//! index maps; it is intentionally not `Clone`.

use serde::Serialize;

use crate::dataplane::DpSyncState;
use crate::types::{
    PortHwInfo, PortLayer2Info, PortLayer3Info, PortStatsInfo, PortSwInfo, PortType, REAL_PORT_VB,
};

/// One interface of any role.
#[derive(Debug, Serialize)]
pub struct Port {
    pub name: String,
    /// Hardware-visible number from the interface or bond pool.
    pub port_no: u32,
    pub zone: String,
    pub sw: PortSwInfo,
    pub hw: PortHwInfo,
    pub stats: PortStatsInfo,
    pub l3: PortLayer3Info,
    pub l2: PortLayer2Info,
    pub sync: DpSyncState,
}

impl Port {
    pub(crate) fn new(
        name: &str,
        port_no: u32,
        os_id: i32,
        port_type: PortType,
        zone: &str,
        hw: PortHwInfo,
    ) -> Self {
        Self {
            name: name.to_string(),
            port_no,
            zone: zone.to_string(),
            sw: PortSwInfo {
                os_id,
                port_type,
                active: true,
                real_ref: hw.real.clone(),
                overlay_ref: None,
            },
            hw,
            stats: PortStatsInfo::default(),
            l3: PortLayer3Info::default(),
            l2: PortLayer2Info::default(),
            sync: DpSyncState::default(),
        }
    }

    pub fn port_type(&self) -> PortType {
        self.sw.port_type
    }

    pub fn os_id(&self) -> i32 {
        self.sw.os_id
    }

    /// Returns true if the port holds every role in `mask`.
    pub fn is(&self, mask: PortType) -> bool {
        self.sw.port_type.contains(mask)
    }

    pub fn master(&self) -> Option<&str> {
        self.hw.master.as_deref()
    }

    /// Name of the real port backing this one, if linked.
    pub fn real_ref(&self) -> Option<&str> {
        self.sw.real_ref.as_deref()
    }

    /// Name of the overlay riding on this port, if linked.
    pub fn overlay_ref(&self) -> Option<&str> {
        self.sw.overlay_ref.as_deref()
    }

    /// Default bridge domain of a physical port.
    pub fn real_default_vid(&self) -> u32 {
        self.port_no + REAL_PORT_VB
    }
}
