//! The userspace WireGuard backend.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::debug;
use wgctrl_types::{Backend, Config, Device, Result, WgError};

use crate::codec::{GET_REQUEST, parse_get_response, parse_set_response, set_request};
use crate::sockets::{default_dirs, device_name, find_sockets};

/// Controls userspace WireGuard implementations through their UAPI sockets.
///
/// Each call opens a fresh connection; nothing is held between calls.
#[derive(Clone, Debug)]
pub struct UserspaceClient {
    dirs: Vec<PathBuf>,
}

impl Default for UserspaceClient {
    fn default() -> Self {
        Self::new(default_dirs())
    }
}

impl UserspaceClient {
    /// Creates a client searching `dirs` for sockets.
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Directories searched for sockets.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn sockets(&self) -> Result<Vec<PathBuf>> {
        let sockets = find_sockets(&self.dirs)?;
        debug!(sockets = sockets.len(), "discovered UAPI sockets");
        Ok(sockets)
    }

    fn socket(&self, name: &str) -> Result<PathBuf> {
        self.sockets()?
            .into_iter()
            .find(|p| device_name(p).as_deref() == Some(name))
            .ok_or(WgError::NotExist)
    }

    fn get(path: &Path, name: &str) -> Result<Device> {
        let response = round_trip(path, GET_REQUEST)?;
        parse_get_response(name, &response)
    }
}

impl Backend for UserspaceClient {
    fn name(&self) -> &'static str {
        "userspace"
    }

    fn devices(&mut self) -> Result<Vec<Device>> {
        let mut devices = Vec::new();
        for path in self.sockets()? {
            let Some(name) = device_name(&path) else {
                continue;
            };
            match Self::get(&path, &name) {
                Ok(d) => devices.push(d),
                Err(WgError::NotExist) => debug!(device = %name, "stale UAPI socket"),
                Err(e) => return Err(e),
            }
        }
        Ok(devices)
    }

    fn device(&mut self, name: &str) -> Result<Device> {
        let path = self.socket(name)?;
        Self::get(&path, name)
    }

    fn configure_device(&mut self, name: &str, cfg: &Config) -> Result<()> {
        let path = self.socket(name)?;
        debug!(device = %name, peers = cfg.peers.len(), "configuring device over UAPI");
        let response = round_trip(&path, &set_request(cfg))?;
        parse_set_response(&response)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sends `request` and reads the response up to and including the blank
/// line that ends it.
fn round_trip(path: &Path, request: &str) -> Result<String> {
    let mut stream = UnixStream::connect(path).map_err(|e| match e.kind() {
        // Socket removed, or left behind by a daemon that exited.
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => WgError::NotExist,
        _ => WgError::Io(e),
    })?;
    stream.write_all(request.as_bytes())?;

    let mut reader = BufReader::new(stream);
    let mut response = Vec::new();
    loop {
        let start = response.len();
        if reader.read_until(b'\n', &mut response)? == 0 || &response[start..] == b"\n" {
            break;
        }
    }
    String::from_utf8(response).map_err(|e| WgError::decode(format!("response is not UTF-8: {e}")))
}
