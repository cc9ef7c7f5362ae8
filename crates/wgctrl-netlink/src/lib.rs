//! Linux kernel WireGuard control over generic netlink.
//!
//! The codec modules ([`attr`], [`message`], [`parse`], [`configure`]) are
//! pure and build on every platform. The socket transport and
//! [`NetlinkClient::open`] are only available on Linux.
//!
//! Large configurations are split by [`configure::build_batches`] and sent
//! one message at a time; device dumps spanning several messages are merged
//! back together by [`parse::parse_device`].

pub mod attr;
mod client;
pub mod configure;
#[cfg(target_os = "linux")]
mod conn;
mod consts;
pub mod message;
pub mod parse;
mod rtnl;

pub use client::{NetlinkClient, Transport};
#[cfg(target_os = "linux")]
pub use conn::Conn;
pub use configure::{IP_BATCH_CHUNK, PEER_BATCH_CHUNK, build_batches, should_batch};
pub use parse::{merge_devices, parse_device};
