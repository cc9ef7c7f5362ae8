//! The OpenBSD kernel WireGuard backend.

use tracing::{debug, trace};
use wgctrl_types::{Backend, Config, Device, Result, WgError};

use crate::ioctl::{Ioctl, probe_fill};
use crate::layout::{ENOENT, ENXIO, ENOTTY, WG_GROUP, config_bytes, ifname, parse_device, parse_group_members};

/// Controls `wg(4)` interfaces through ioctls.
#[derive(Debug)]
pub struct OpenBsdClient<I> {
    ioctl: I,
}

#[cfg(target_os = "openbsd")]
impl OpenBsdClient<crate::ioctl::Socket> {
    /// Opens a control socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created.
    pub fn open() -> Result<Self> {
        Ok(Self::with_ioctl(crate::ioctl::Socket::open()?))
    }
}

impl<I: Ioctl> OpenBsdClient<I> {
    /// Creates a client issuing calls through `ioctl`.
    pub fn with_ioctl(ioctl: I) -> Self {
        Self { ioctl }
    }

    fn interfaces(&mut self) -> Result<Vec<String>> {
        let group = ifname(WG_GROUP)?;
        let ioctl = &mut self.ioctl;
        match probe_fill("SIOCGIFGMEMB", |buf| ioctl.group_members(&group, buf)) {
            Ok(buf) => Ok(parse_group_members(&buf)),
            // No interface has joined the group yet.
            Err(WgError::Io(e)) if e.raw_os_error() == Some(ENOENT) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn get(&mut self, name: &str) -> Result<Device> {
        let ifname = ifname(name)?;
        let ioctl = &mut self.ioctl;
        let buf = probe_fill("SIOCGWG", |buf| ioctl.get_wg(&ifname, buf)).map_err(not_exist)?;
        trace!(device = %name, bytes = buf.len(), "read device");
        parse_device(name, &buf)
    }
}

impl<I: Ioctl> Backend for OpenBsdClient<I> {
    fn name(&self) -> &'static str {
        "openbsd"
    }

    fn devices(&mut self) -> Result<Vec<Device>> {
        let names = self.interfaces()?;
        debug!(interfaces = names.len(), "listed wg group");

        let mut devices = Vec::with_capacity(names.len());
        for name in names {
            match self.get(&name) {
                Ok(d) => devices.push(d),
                Err(WgError::NotExist) => debug!(device = %name, "interface vanished while listing"),
                Err(e) => return Err(e),
            }
        }
        Ok(devices)
    }

    fn device(&mut self, name: &str) -> Result<Device> {
        if name.is_empty() {
            return Err(WgError::NotExist);
        }
        self.get(name)
    }

    fn configure_device(&mut self, name: &str, cfg: &Config) -> Result<()> {
        let ifname = ifname(name)?;
        let mut buf = config_bytes(cfg)?;
        debug!(device = %name, peers = cfg.peers.len(), bytes = buf.len(), "configuring device");
        self.ioctl
            .set_wg(&ifname, &mut buf)
            .map_err(|e| not_exist(e.into()))
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.ioctl.close()?)
    }
}

/// Maps "no such interface" and "not a wg interface" to [`WgError::NotExist`].
fn not_exist(err: WgError) -> WgError {
    let gone = matches!(&err, WgError::Io(e) if matches!(e.raw_os_error(), Some(ENXIO | ENOTTY)));
    if gone { WgError::NotExist } else { err }
}
