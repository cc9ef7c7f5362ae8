//! The chained client.

use tracing::debug;
use wgctrl_types::{Backend, Config, Device, ErrorKind, Result, Unimplemented, WgError};

use crate::options::{BackendKind, ClientOptions};

/// Controls WireGuard devices through an ordered list of backends.
///
/// Lookups walk the list until a backend owns the device. A backend that
/// answers [`WgError::NotExist`] or [`WgError::Unimplemented`] passes the
/// call on; any other error ends it.
pub struct Client {
    backends: Vec<Box<dyn Backend>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("backends", &self.backend_names())
            .finish()
    }
}

impl Client {
    /// Opens every backend available on this OS.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend's OS handle cannot be opened.
    pub fn new() -> Result<Self> {
        Self::with_options(&ClientOptions::default())
    }

    /// Opens the backends named in `opts`, in order.
    ///
    /// Kinds that cannot run on this OS are kept as [`Unimplemented`]
    /// placeholders. On Linux, netlink is left out when the kernel has no
    /// WireGuard family registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend's OS handle cannot be opened.
    pub fn with_options(opts: &ClientOptions) -> Result<Self> {
        let mut backends = Vec::with_capacity(opts.backends.len());
        for &kind in &opts.backends {
            if let Some(backend) = open_backend(kind, opts)? {
                backends.push(backend);
            }
        }
        let client = Self::from_backends(backends);
        debug!(backends = ?client.backend_names(), "opened client");
        Ok(client)
    }

    /// Chains already constructed backends.
    #[must_use]
    pub fn from_backends(backends: Vec<Box<dyn Backend>>) -> Self {
        Self { backends }
    }

    /// Names of the chained backends, in order.
    #[must_use]
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Runs `op` against each backend until one does not pass.
    fn first<T>(&mut self, name: &str, mut op: impl FnMut(&mut dyn Backend) -> Result<T>) -> Result<T> {
        for backend in &mut self.backends {
            match op(backend.as_mut()) {
                Err(e) if passes(&e) => {
                    debug!(backend = backend.name(), device = %name, reason = %e, "trying next backend");
                }
                other => return other,
            }
        }
        Err(WgError::NotExist)
    }
}

impl Backend for Client {
    fn name(&self) -> &'static str {
        "chained"
    }

    /// Lists the devices of every backend, concatenated in backend order.
    ///
    /// A device visible to two backends is reported twice.
    fn devices(&mut self) -> Result<Vec<Device>> {
        let mut devices = Vec::new();
        for backend in &mut self.backends {
            match backend.devices() {
                Ok(found) => devices.extend(found),
                Err(e) if passes(&e) => debug!(backend = backend.name(), reason = %e, "skipping backend"),
                Err(e) => return Err(e),
            }
        }
        Ok(devices)
    }

    fn device(&mut self, name: &str) -> Result<Device> {
        self.first(name, |b| b.device(name))
    }

    /// Applies `cfg` through the first backend that owns `name`.
    ///
    /// Large configurations may be sent as several messages. If one fails,
    /// the messages before it stay applied and the device is left partially
    /// configured.
    fn configure_device(&mut self, name: &str, cfg: &Config) -> Result<()> {
        self.first(name, |b| b.configure_device(name, cfg))
    }

    /// Closes every backend, even after a failure, and returns the first
    /// error.
    fn close(&mut self) -> Result<()> {
        let mut result = Ok(());
        for backend in &mut self.backends {
            if let Err(e) = backend.close() {
                debug!(backend = backend.name(), error = %e, "close failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

fn passes(err: &WgError) -> bool {
    matches!(err.kind(), ErrorKind::NotExist | ErrorKind::Unimplemented)
}

fn open_backend(kind: BackendKind, opts: &ClientOptions) -> Result<Option<Box<dyn Backend>>> {
    let backend: Box<dyn Backend> = match kind {
        BackendKind::Netlink => {
            #[cfg(target_os = "linux")]
            {
                match wgctrl_netlink::NetlinkClient::open()? {
                    Some(c) => Box::new(c),
                    None => {
                        tracing::info!("wireguard generic netlink family not registered, skipping netlink");
                        return Ok(None);
                    }
                }
            }
            #[cfg(not(target_os = "linux"))]
            {
                Box::new(Unimplemented::new("netlink", "generic netlink requires Linux"))
            }
        }
        BackendKind::OpenBsd => {
            #[cfg(target_os = "openbsd")]
            {
                Box::new(wgctrl_openbsd::OpenBsdClient::open()?)
            }
            #[cfg(not(target_os = "openbsd"))]
            {
                Box::new(Unimplemented::new("openbsd", "wg(4) ioctls require OpenBSD"))
            }
        }
        BackendKind::Userspace => {
            #[cfg(unix)]
            {
                Box::new(wgctrl_uapi::UserspaceClient::new(opts.socket_dirs.clone()))
            }
            #[cfg(not(unix))]
            {
                Box::new(Unimplemented::new("userspace", "UAPI sockets require a UNIX platform"))
            }
        }
    };
    Ok(Some(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn options_assemble_requested_backends() {
        let opts = ClientOptions::default()
            .with_backends([BackendKind::OpenBsd, BackendKind::Userspace])
            .with_socket_dirs([std::env::temp_dir().join("wgctrl-none")]);
        let client = Client::with_options(&opts).expect("client");
        assert_eq!(client.backend_names(), vec!["openbsd", "userspace"]);
    }

    #[test]
    fn empty_chain_has_nothing() {
        let mut client = Client::from_backends(Vec::new());
        assert!(client.devices().expect("devices").is_empty());
        assert!(client.device("wg0").expect_err("none").is_not_exist());
        assert!(client.close().is_ok());
    }
}
