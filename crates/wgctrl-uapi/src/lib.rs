//! Userspace WireGuard control over the UAPI text protocol.
//!
//! Userspace implementations such as wireguard-go expose one UNIX socket
//! per device, named after the interface. [`codec`] encodes requests and
//! decodes responses; [`UserspaceClient`] finds sockets and talks to them.

pub mod codec;
#[cfg(unix)]
mod client;
mod sockets;

#[cfg(unix)]
pub use client::UserspaceClient;
pub use sockets::{DEFAULT_SOCKET_DIR, default_dirs, device_name, find_sockets};
