//! OpenBSD kernel WireGuard control through `wg(4)` ioctls.
//!
//! Interfaces are discovered through the `wg` interface group and read and
//! written with `SIOCGWG`/`SIOCSWG`. The byte layouts live in [`layout`];
//! the [`Ioctl`] trait is the seam between them and the kernel, so the
//! client logic runs and is tested on every platform while the real socket
//! exists only on OpenBSD.

mod client;
mod ioctl;
pub mod layout;

pub use client::OpenBsdClient;
#[cfg(target_os = "openbsd")]
pub use ioctl::Socket;
pub use ioctl::{Ioctl, MAX_FILL_ATTEMPTS, probe_fill};
