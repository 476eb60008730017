//! Port graph manager for a software dataplane.
//!
//! This crate tracks every network interface the dataplane forwards on and
//! the structural roles each one holds: physical port, bond, bond slave, VLAN
//! member, VLAN bridge, VXLAN endpoint or wireguard device. Role changes are
//! mirrored to the forwarding plane as work items on a channel.
//!
//! # Responsibilities
//!
//! - Allocate hardware port numbers from two disjoint pools (interfaces, bonds)
//! - Validate and apply role transitions (`REAL -> REAL|VLANSIF`, ...)
//! - Create and remove default bridge domains in the owning zone
//! - Push ordered remove/create work for every structural change
//! - Poll OS link state and notify observers of UP/DOWN/LOWER_DOWN/DELETE
//! - Tear everything down in dependency order
//!
//! # Port number layout
//!
//! | Pool       | Numbers        | Default bridge domain      |
//! |------------|----------------|----------------------------|
//! | interfaces | 1 ..= 128      | `port_no + 3800`           |
//! | bonds      | 505 ..= 512    | `4000 + bond ordinal`      |
//!
//! # Example
//!
//! ```
//! use dp_portmgrd::{DpSender, PortHwInfo, PortLayer2Info, PortRegistry, PortType, ZoneTable};
//!
//! let (dp, _rx) = DpSender::channel();
//! let zones = ZoneTable::with_zones(["default"]).unwrap();
//! let mut ports = PortRegistry::new(zones, dp);
//!
//! ports
//!     .add("eth0", 2, PortType::REAL, "default", PortHwInfo::default(), PortLayer2Info::default())
//!     .unwrap();
//! assert_eq!(ports.find_by_name("eth0").unwrap().l2.vid, 3801);
//! ```

pub mod config_file;
mod counter;
mod dataplane;
mod dp_sync;
mod error;
mod link;
mod mac;
mod manager;
mod notify;
mod port;
mod registry;
mod status;
mod types;
mod zone;

pub use config_file::{PortmgrConfig, DEFAULT_CONFIG_PATH};
pub use counter::{Counter, CounterError};
pub use dataplane::{
    DpReceiver, DpSender, DpStatus, DpSyncState, DpTunnelType, DpWork, DpWorkItem, PortDpWorkQ,
    RouterMacDpWorkQ,
};
pub use error::{DaemonError, PortError, Result, PORT_BASE_ERR};
pub use link::{LinkProbe, OsLinkProbe, OsLinkState, StaticLinkProbe};
pub use mac::{MacAddress, MacParseError};
pub use manager::PortManager;
pub use notify::{ChannelNotifier, PortEvent, PortNotification, PortNotifier};
pub use port::Port;
pub use registry::{PortRegistry, RegistryConfig};
pub use status::NodeWalker;
pub use types::*;
pub use zone::{BridgeDomain, ZoneError, ZoneInfo, ZoneOps, ZoneTable};
