//! Port event notification.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

bitflags! {
    /// Link events delivered to registered notifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PortEvent: u32 {
        /// Port went administratively down.
        const DOWN = 0x1;
        /// Lower link lost carrier while admin up.
        const LOWER_DOWN = 0x2;
        /// OS interface disappeared.
        const DELETE = 0x4;
        /// Port came administratively up.
        const UP = 0x8;
    }
}

/// Observer of port link events.
pub trait PortNotifier: Send + Sync {
    fn port_notify(&self, name: &str, os_id: i32, event: PortEvent);
}

/// Event as forwarded by [`ChannelNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortNotification {
    pub name: String,
    pub os_id: i32,
    pub event: PortEvent,
}

/// Notifier that forwards every event onto a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<PortNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PortNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PortNotifier for ChannelNotifier {
    fn port_notify(&self, name: &str, os_id: i32, event: PortEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(PortNotification {
            name: name.to_string(),
            os_id,
            event,
        });
    }
}
