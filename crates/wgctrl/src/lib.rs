//! Cross-platform WireGuard device control.
//!
//! [`Client`] chains the transports available on this OS: generic netlink
//! for the Linux kernel module, `wg(4)` ioctls on OpenBSD, and the UAPI
//! socket protocol spoken by userspace implementations. Each call is tried
//! against the backends in order until one of them owns the device.
//!
//! ```no_run
//! use wgctrl::{Backend, Client};
//!
//! let mut client = Client::new()?;
//! for device in client.devices()? {
//!     println!("{} ({} peers)", device.name, device.peers.len());
//! }
//! client.close()?;
//! # Ok::<(), wgctrl::WgError>(())
//! ```

#![forbid(unsafe_code)]

mod client;
mod options;

pub use client::Client;
pub use options::{BackendKind, ClientOptions};

pub use wgctrl_types::{
    Backend, Config, Device, DeviceType, ErrorKind, KEY_LEN, Key, Peer, PeerConfig, Result,
    Unimplemented, WgError,
};
