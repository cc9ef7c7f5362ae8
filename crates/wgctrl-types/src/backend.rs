//! The capability set every transport backend implements.

use crate::error::{Result, WgError};
use crate::types::{Config, Device};

/// A transport that can query and configure WireGuard devices.
///
/// Every call blocks until the OS answers. A backend that does not know the
/// named device returns [`WgError::NotExist`] so a chained client can try
/// the next backend.
pub trait Backend: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Lists every WireGuard device this backend can see.
    fn devices(&mut self) -> Result<Vec<Device>>;

    /// Fetches a single device by interface name.
    fn device(&mut self, name: &str) -> Result<Device>;

    /// Applies `cfg` to the named device.
    fn configure_device(&mut self, name: &str, cfg: &Config) -> Result<()>;

    /// Releases any OS resources held by the backend.
    fn close(&mut self) -> Result<()>;
}

/// A backend that is not available on this platform.
///
/// Every query returns [`WgError::Unimplemented`]; closing succeeds since
/// nothing was opened.
#[derive(Clone, Debug)]
pub struct Unimplemented {
    backend: &'static str,
    info: String,
}

impl Unimplemented {
    /// Creates a placeholder for `backend` with a descriptive reason.
    pub fn new(backend: &'static str, info: impl Into<String>) -> Self {
        Self {
            backend,
            info: info.into(),
        }
    }

    fn err(&self) -> WgError {
        WgError::unimplemented(self.backend, self.info.clone())
    }
}

impl Backend for Unimplemented {
    fn name(&self) -> &'static str {
        self.backend
    }

    fn devices(&mut self) -> Result<Vec<Device>> {
        Err(self.err())
    }

    fn device(&mut self, _name: &str) -> Result<Device> {
        Err(self.err())
    }

    fn configure_device(&mut self, _name: &str, _cfg: &Config) -> Result<()> {
        Err(self.err())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn unimplemented_fails_every_query() {
        let mut backend = Unimplemented::new("openbsd", "requires OpenBSD");
        assert_eq!(backend.name(), "openbsd");
        let err = backend.devices().expect_err("devices");
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        let err = backend.device("wg0").expect_err("device");
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        let err = backend.configure_device("wg0", &Config::new()).expect_err("configure");
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        assert!(backend.close().is_ok());
    }
}
