//! Shared, locked handle to the port registry.
//!
//! Every public operation takes the lock once for its whole duration, so API
//! calls and the link ticker never observe a half-applied transition.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dataplane::DpSender;
use crate::error::Result;
use crate::link::LinkProbe;
use crate::notify::PortNotifier;
use crate::registry::PortRegistry;
use crate::status::NodeWalker;
use crate::types::{PortHwInfo, PortLayer2Info, PortType};
use crate::zone::{ZoneOps, ZoneTable};

/// Cloneable handle to a [`PortRegistry`].
#[derive(Debug)]
pub struct PortManager<Z: ZoneOps = ZoneTable> {
    inner: Arc<Mutex<PortRegistry<Z>>>,
}

impl<Z: ZoneOps> Clone for PortManager<Z> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Z: ZoneOps + 'static> PortManager<Z> {
    pub fn new(zones: Z, dp: DpSender) -> Self {
        Self::from_registry(PortRegistry::new(zones, dp))
    }

    pub fn from_registry(registry: PortRegistry<Z>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Runs `f` under the registry lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut PortRegistry<Z>) -> R) -> R {
        let mut registry = self.inner.lock();
        f(&mut *registry)
    }

    pub fn add(
        &self,
        name: &str,
        os_id: i32,
        ptype: PortType,
        zone: &str,
        hw: PortHwInfo,
        l2: PortLayer2Info,
    ) -> Result<()> {
        self.inner.lock().add(name, os_id, ptype, zone, hw, l2)
    }

    pub fn delete(&self, name: &str, ptype: PortType) -> Result<()> {
        self.inner.lock().delete(name, ptype)
    }

    pub fn destroy_all(&self) {
        self.inner.lock().destroy_all();
    }

    pub fn register_notifier(&self, notifier: Arc<dyn PortNotifier>) {
        self.inner.lock().register_notifier(notifier);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn ports_to_json(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        self.inner.lock().ports_to_json(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn ports_to_string(&self, sink: &mut dyn NodeWalker) {
        self.inner.lock().ports_to_string(sink);
    }

    /// One polling pass. Probe failures are logged and skipped.
    pub fn poll_once(&self, probe: &dyn LinkProbe) -> usize {
        match self.inner.lock().poll_link_state(probe) {
            Ok(events) => events,
            Err(e) => {
                warn!("Link probe failed: {}", e);
                0
            }
        }
    }

    /// Spawns the periodic link-state ticker.
    pub fn spawn_link_ticker(
        &self,
        probe: Arc<dyn LinkProbe>,
        period: Duration,
    ) -> JoinHandle<()> {
        let mgr = self.clone();
        info!("Starting link ticker every {:?}", period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let events = mgr.poll_once(probe.as_ref());
                if events > 0 {
                    debug!("Link ticker fired {} events", events);
                }
            }
        })
    }
}
