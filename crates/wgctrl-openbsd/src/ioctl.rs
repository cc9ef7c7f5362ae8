//! The kernel calls behind the OpenBSD backend.

use std::io;

use tracing::debug;
use wgctrl_types::{Result, WgError};

use crate::layout::IFNAMSIZ;

/// Upper bound on probe and fill rounds for a single query.
pub const MAX_FILL_ATTEMPTS: usize = 8;

/// The three ioctls the OpenBSD backend issues.
///
/// Each query call takes a caller-owned buffer and returns the number of
/// bytes the kernel needs. An empty buffer is a size probe. When the
/// returned size exceeds the buffer, nothing useful was written and the
/// caller retries with a larger one.
pub trait Ioctl: Send {
    /// `SIOCGIFGMEMB`: members of interface group `group`.
    fn group_members(&mut self, group: &[u8; IFNAMSIZ], buf: &mut [u8]) -> io::Result<usize>;

    /// `SIOCGWG`: the configuration of interface `name`.
    fn get_wg(&mut self, name: &[u8; IFNAMSIZ], buf: &mut [u8]) -> io::Result<usize>;

    /// `SIOCSWG`: applies the configuration in `buf` to interface `name`.
    fn set_wg(&mut self, name: &[u8; IFNAMSIZ], buf: &mut [u8]) -> io::Result<()>;

    /// Releases the control socket. Later calls fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Runs a size-probe then fill sequence, growing the buffer whenever the
/// kernel reports more data than fit.
pub fn probe_fill<F>(what: &str, mut call: F) -> Result<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> io::Result<usize>,
{
    let mut size = call(&mut [])?;

    for attempt in 1..=MAX_FILL_ATTEMPTS {
        if size == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; size];
        let needed = call(&mut buf)?;
        if needed <= size {
            buf.truncate(needed);
            return Ok(buf);
        }

        debug!(what, attempt, have = size, needed, "ioctl buffer too small, retrying");
        size = needed;
    }

    Err(WgError::decode(format!(
        "{what}: buffer kept growing after {MAX_FILL_ATTEMPTS} attempts"
    )))
}

#[cfg(target_os = "openbsd")]
pub use sys::Socket;

#[cfg(target_os = "openbsd")]
#[allow(unsafe_code)]
mod sys {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::ptr;

    use super::Ioctl;
    use crate::layout::{EINVAL, IFG_REQ_LEN, IFNAMSIZ, SIOCGIFGMEMB, SIOCGWG, SIOCSWG};

    #[repr(C)]
    struct IfGroupReq {
        name: [u8; IFNAMSIZ],
        len: u32,
        buf: *mut libc::c_void,
        _pad: [u8; 8],
    }

    #[repr(C)]
    struct WgDataIo {
        name: [u8; IFNAMSIZ],
        size: libc::size_t,
        mem: *mut libc::c_void,
    }

    /// Datagram socket the WireGuard ioctls are issued on.
    #[derive(Debug)]
    pub struct Socket {
        fd: Option<OwnedFd>,
    }

    impl Socket {
        /// Opens the control socket.
        ///
        /// # Errors
        ///
        /// Returns the error from `socket(2)`.
        pub fn open() -> io::Result<Self> {
            let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self {
                fd: Some(unsafe { OwnedFd::from_raw_fd(fd) }),
            })
        }

        fn ioctl<T>(&self, request: u64, arg: &mut T) -> io::Result<()> {
            let fd = self
                .fd
                .as_ref()
                .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))?;
            let rc = unsafe {
                libc::ioctl(fd.as_raw_fd(), request as libc::c_ulong, ptr::from_mut(arg))
            };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    fn wg_data(name: &[u8; IFNAMSIZ], buf: &mut [u8]) -> WgDataIo {
        WgDataIo {
            name: *name,
            size: buf.len(),
            mem: if buf.is_empty() {
                ptr::null_mut()
            } else {
                buf.as_mut_ptr().cast()
            },
        }
    }

    impl Ioctl for Socket {
        fn group_members(&mut self, group: &[u8; IFNAMSIZ], buf: &mut [u8]) -> io::Result<usize> {
            let mut req = IfGroupReq {
                name: *group,
                len: u32::try_from(buf.len())
                    .map_err(|_| io::Error::from_raw_os_error(EINVAL))?,
                buf: if buf.is_empty() {
                    ptr::null_mut()
                } else {
                    buf.as_mut_ptr().cast()
                },
                _pad: [0; 8],
            };
            match self.ioctl(SIOCGIFGMEMB, &mut req) {
                Ok(()) => Ok(req.len as usize),
                // Members were added between probe and fill.
                Err(e) if e.raw_os_error() == Some(EINVAL) && !buf.is_empty() => {
                    Ok(buf.len() + IFG_REQ_LEN)
                }
                Err(e) => Err(e),
            }
        }

        fn get_wg(&mut self, name: &[u8; IFNAMSIZ], buf: &mut [u8]) -> io::Result<usize> {
            let mut data = wg_data(name, buf);
            self.ioctl(SIOCGWG, &mut data)?;
            Ok(data.size)
        }

        fn set_wg(&mut self, name: &[u8; IFNAMSIZ], buf: &mut [u8]) -> io::Result<()> {
            let mut data = wg_data(name, buf);
            self.ioctl(SIOCSWG, &mut data)
        }

        fn close(&mut self) -> io::Result<()> {
            drop(self.fd.take());
            Ok(())
        }
    }
}
