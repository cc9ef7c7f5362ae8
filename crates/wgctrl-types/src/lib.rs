//! Shared types for the wgctrl family of crates.
//!
//! Every transport backend (generic netlink, OpenBSD ioctl, userspace UAPI)
//! produces [`Device`] snapshots on read and consumes [`Config`] values on
//! write. The [`Backend`] trait is the capability set each transport
//! implements and the chained client composes.

mod backend;
pub mod error;
mod key;
mod time;
mod types;

pub use backend::{Backend, Unimplemented};
pub use error::{ErrorKind, Result, WgError};
pub use key::{Key, KEY_LEN};
pub use time::handshake_time;
pub use types::{Config, Device, DeviceType, Peer, PeerConfig};
