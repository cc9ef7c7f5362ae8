//! A blocking netlink socket.

#![allow(unsafe_code)]

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use tracing::trace;
use wgctrl_types::Result;

use crate::client::Transport;
use crate::message::{Header, Message, Replies};

/// A netlink socket bound to a kernel-assigned port.
///
/// Requests are strictly sequential: each [`Transport::execute`] call reads
/// until its own exchange completes before returning.
#[derive(Debug)]
pub struct Conn {
    fd: Option<OwnedFd>,
    protocol: i32,
    sequence: u32,
}

impl Conn {
    /// Opens and binds a socket for the netlink `protocol`.
    pub fn open(protocol: i32) -> io::Result<Self> {
        // SAFETY: plain syscall, the descriptor is checked before use.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                protocol,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a fresh descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl is plain data and all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;

        // SAFETY: `addr` outlives the call and the length matches its type.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd: Some(fd),
            protocol,
            sequence: 0,
        })
    }

    /// The open descriptor, or EBADF once closed.
    fn raw_fd(&self) -> io::Result<RawFd> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }

    fn send(&self, buf: &[u8]) -> io::Result<()> {
        let fd = self.raw_fd()?;
        // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
        let n = unsafe { libc::send(fd, buf.as_ptr().cast(), buf.len(), 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn recv(&self) -> io::Result<Vec<u8>> {
        let fd = self.raw_fd()?;
        loop {
            // Peek with MSG_TRUNC to learn the datagram size first.
            // SAFETY: a zero-length read never touches the null buffer.
            let size = unsafe {
                libc::recv(
                    fd,
                    ptr::null_mut(),
                    0,
                    libc::MSG_PEEK | libc::MSG_TRUNC,
                )
            };
            let Ok(size) = usize::try_from(size) else {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            };

            let mut buf = vec![0u8; size];
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            let n = unsafe {
                libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), 0)
            };
            let Ok(n) = usize::try_from(n) else {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            };

            buf.truncate(n);
            return Ok(buf);
        }
    }
}

impl Transport for Conn {
    fn execute(&mut self, kind: u16, flags: u16, payload: Vec<u8>) -> Result<Vec<Message>> {
        self.sequence = self.sequence.wrapping_add(1);
        let req = Message {
            header: Header {
                kind,
                flags,
                sequence: self.sequence,
                pid: 0,
            },
            payload,
        };

        trace!(protocol = self.protocol, kind, sequence = self.sequence, "netlink request");
        self.send(&req.encode()?)?;

        let mut replies = Replies::new(self.sequence, flags);
        while !replies.feed(&self.recv()?)? {}
        Ok(replies.into_messages())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(fd) = self.fd.take() {
            trace!(protocol = self.protocol, "closing netlink socket");
            drop(fd);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wgctrl_types::WgError;

    use super::*;
    use crate::consts::{NLM_F_DUMP, NLM_F_REQUEST, RTM_GETLINK};

    #[test]
    fn closed_socket_refuses_requests() {
        let mut conn = Conn::open(libc::NETLINK_ROUTE).expect("open");
        conn.close().expect("close");
        conn.close().expect("second close");

        let err = conn
            .execute(RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP, Vec::new())
            .expect_err("closed");
        assert!(matches!(err, WgError::Io(ref e) if e.raw_os_error() == Some(libc::EBADF)));
    }
}
