//! OS link-state probing for the periodic port ticker.

use std::collections::HashMap;
use std::io;

use parking_lot::Mutex;

/// Interface flags the ticker cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OsLinkState {
    /// IFF_UP
    pub admin_up: bool,
    /// IFF_RUNNING
    pub running: bool,
}

/// Source of OS interface state.
///
/// One snapshot is taken per tick and shared by every port, so the OS is
/// walked once rather than once per port.
#[cfg_attr(test, mockall::automock)]
pub trait LinkProbe: Send + Sync {
    fn snapshot(&self) -> io::Result<HashMap<String, OsLinkState>>;
}

/// Reads interface flags with `getifaddrs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLinkProbe;

#[cfg(unix)]
impl LinkProbe for OsLinkProbe {
    fn snapshot(&self) -> io::Result<HashMap<String, OsLinkState>> {
        use nix::ifaddrs::getifaddrs;
        use nix::net::if_::InterfaceFlags;

        let mut out: HashMap<String, OsLinkState> = HashMap::new();
        for ifa in getifaddrs().map_err(io::Error::from)? {
            let state = out.entry(ifa.interface_name.clone()).or_default();
            state.admin_up = ifa.flags.contains(InterfaceFlags::IFF_UP);
            state.running = ifa.flags.contains(InterfaceFlags::IFF_RUNNING);
        }
        Ok(out)
    }
}

#[cfg(not(unix))]
impl LinkProbe for OsLinkProbe {
    fn snapshot(&self) -> io::Result<HashMap<String, OsLinkState>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "link probing needs getifaddrs",
        ))
    }
}

/// Probe returning whatever state was last stored in it.
///
/// Used to drive the ticker without touching real interfaces.
#[derive(Debug, Default)]
pub struct StaticLinkProbe {
    links: Mutex<HashMap<String, OsLinkState>>,
}

impl StaticLinkProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, admin_up: bool, running: bool) {
        self.links
            .lock()
            .insert(name.to_string(), OsLinkState { admin_up, running });
    }

    pub fn remove(&self, name: &str) {
        self.links.lock().remove(name);
    }
}

impl LinkProbe for StaticLinkProbe {
    fn snapshot(&self) -> io::Result<HashMap<String, OsLinkState>> {
        Ok(self.links.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_probe() {
        let probe = StaticLinkProbe::new();
        probe.set("eth0", true, false);
        let snap = probe.snapshot().unwrap();
        assert_eq!(
            snap.get("eth0"),
            Some(&OsLinkState {
                admin_up: true,
                running: false
            })
        );
        probe.remove("eth0");
        assert!(probe.snapshot().unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_os_probe_sees_loopback() {
        let snap = OsLinkProbe.snapshot().unwrap();
        assert!(snap.contains_key("lo"));
    }
}
