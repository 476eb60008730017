//! Dataplane work-queue messages.
//!
//! The registry never talks to the forwarding plane directly. Every structural
//! change is turned into [`DpWorkItem`]s pushed onto an unbounded tokio channel
//! owned by the dataplane dispatcher. Sends never block; delivery is
//! fire-and-forget.
//!
//! Structural changes are always sent as a `Remove` followed by a `Create`,
//! never as a partial update.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::mac::MacAddress;

/// Work directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DpWork {
    Create,
    Remove,
}

impl fmt::Display for DpWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Tunnel encapsulation carried in router-MAC work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DpTunnelType {
    Vxlan,
}

/// Last known outcome of pushing a port's work to the dataplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DpSyncState {
    /// Nothing sent yet.
    #[default]
    Unsynced,
    /// Work queued on the dispatch channel.
    Queued,
    /// Dispatcher is gone; work was dropped.
    Failed,
}

/// Dataplane acknowledgement of a router-MAC request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpStatus {
    Ok,
    Error(i32),
}

/// Port configuration work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDpWorkQ {
    pub work: DpWork,
    /// Hardware port number.
    pub port_num: u32,
    /// OS interface index.
    pub os_port_num: i32,
    /// Ingress VLAN to match, 0 for untagged.
    pub ing_vlan: u32,
    /// Bridge domain to assign.
    pub set_bd: u32,
    pub set_zone_num: u32,
    /// Dataplane program to (re)load on this interface.
    pub load_ebpf: Option<String>,
}

/// Router-MAC work for a VXLAN endpoint.
#[derive(Debug)]
pub struct RouterMacDpWorkQ {
    pub work: DpWork,
    /// Optional completion handle.
    pub status: Option<oneshot::Sender<DpStatus>>,
    pub l2_addr: MacAddress,
    pub port_num: u32,
    pub tun_id: u32,
    pub tun_type: DpTunnelType,
    pub bd: u32,
}

/// One message on the dispatch channel.
#[derive(Debug)]
pub enum DpWorkItem {
    Port(PortDpWorkQ),
    RouterMac(RouterMacDpWorkQ),
}

impl DpWorkItem {
    pub fn work(&self) -> DpWork {
        match self {
            DpWorkItem::Port(w) => w.work,
            DpWorkItem::RouterMac(w) => w.work,
        }
    }

    /// Returns the port work, if this is one.
    pub fn as_port(&self) -> Option<&PortDpWorkQ> {
        match self {
            DpWorkItem::Port(w) => Some(w),
            DpWorkItem::RouterMac(_) => None,
        }
    }

    /// Returns the router-MAC work, if this is one.
    pub fn as_router_mac(&self) -> Option<&RouterMacDpWorkQ> {
        match self {
            DpWorkItem::RouterMac(w) => Some(w),
            DpWorkItem::Port(_) => None,
        }
    }
}

impl fmt::Display for DpWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpWorkItem::Port(w) => write!(
                f,
                "port {} port_num {} os_port {} ing_vlan {} bd {} zone {} ebpf {}",
                w.work,
                w.port_num,
                w.os_port_num,
                w.ing_vlan,
                w.set_bd,
                w.set_zone_num,
                w.load_ebpf.as_deref().unwrap_or("-")
            ),
            DpWorkItem::RouterMac(w) => write!(
                f,
                "rmac {} {} port_num {} tun_id {} bd {}",
                w.work, w.l2_addr, w.port_num, w.tun_id, w.bd
            ),
        }
    }
}

/// Receiving half handed to the dataplane dispatcher.
pub type DpReceiver = mpsc::UnboundedReceiver<DpWorkItem>;

/// Send-only handle to the dataplane dispatcher.
#[derive(Debug, Clone)]
pub struct DpSender {
    tx: mpsc::UnboundedSender<DpWorkItem>,
}

impl DpSender {
    /// Creates a sender and the matching dispatcher receiver.
    pub fn channel() -> (Self, DpReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues `item`. Returns false if the dispatcher has gone away.
    pub fn send(&self, item: DpWorkItem) -> bool {
        match self.tx.send(item) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dataplane dispatcher closed, dropping {}", e.0);
                false
            }
        }
    }

    /// Returns true if the dispatcher has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port_work(work: DpWork) -> DpWorkItem {
        DpWorkItem::Port(PortDpWorkQ {
            work,
            port_num: 1,
            os_port_num: 7,
            ing_vlan: 0,
            set_bd: 3801,
            set_zone_num: 0,
            load_ebpf: Some("eth0".into()),
        })
    }

    #[test]
    fn test_send_and_receive_in_order() {
        let (tx, mut rx) = DpSender::channel();
        assert!(tx.send(port_work(DpWork::Remove)));
        assert!(tx.send(port_work(DpWork::Create)));

        assert_eq!(rx.try_recv().unwrap().work(), DpWork::Remove);
        assert_eq!(rx.try_recv().unwrap().work(), DpWork::Create);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = DpSender::channel();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.send(port_work(DpWork::Create)));
    }

    #[test]
    fn test_display() {
        let item = port_work(DpWork::Create);
        assert_eq!(
            item.to_string(),
            "port create port_num 1 os_port 7 ing_vlan 0 bd 3801 zone 0 ebpf eth0"
        );
        assert!(item.as_router_mac().is_none());
    }
}
