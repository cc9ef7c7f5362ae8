//! Core types for WireGuard device state and configuration.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::key::Key;

/// The underlying implementation of a WireGuard device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Implementation could not be determined.
    #[default]
    Unknown,
    /// Linux kernel module, configured over generic netlink.
    LinuxKernel,
    /// OpenBSD kernel driver, configured over ioctl.
    OpenBsdKernel,
    /// Userspace implementation, configured over the UAPI socket.
    Userspace,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::LinuxKernel => "Linux kernel",
            Self::OpenBsdKernel => "OpenBSD kernel",
            Self::Userspace => "userspace",
        };
        f.write_str(s)
    }
}

/// A snapshot of one WireGuard device.
///
/// Every read returns a freshly decoded value; nothing is cached or shared
/// between reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Interface name.
    pub name: String,
    /// Implementation backing this device.
    pub device_type: DeviceType,
    /// Private key; zero when unset.
    pub private_key: Key,
    /// Public key, computed from the private key.
    pub public_key: Key,
    /// UDP listen port.
    pub listen_port: u16,
    /// Firewall mark applied to outgoing packets (routing table on OpenBSD).
    pub firewall_mark: u32,
    /// Peers in the order the backend reported them.
    pub peers: Vec<Peer>,
}

impl Device {
    /// Looks up a peer by public key.
    #[must_use]
    pub fn peer(&self, public_key: &Key) -> Option<&Peer> {
        self.peers.iter().find(|p| p.public_key == *public_key)
    }
}

/// A peer of a [`Device`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Public key identifying this peer. Always present.
    pub public_key: Key,
    /// Preshared key; zero when none is configured.
    pub preshared_key: Key,
    /// Most recent source address, absent until the first handshake.
    pub endpoint: Option<SocketAddr>,
    /// Persistent keepalive interval; zero disables keepalives.
    pub persistent_keepalive_interval: Duration,
    /// Time of the most recent handshake, `None` if there has been none.
    pub last_handshake_time: Option<SystemTime>,
    /// Bytes received from this peer.
    pub receive_bytes: u64,
    /// Bytes transmitted to this peer.
    pub transmit_bytes: u64,
    /// Networks this peer may send and receive traffic for.
    pub allowed_ips: Vec<IpNet>,
    /// Protocol version; 0 means the most recent.
    pub protocol_version: u32,
}

impl Peer {
    /// Creates a peer with the given public key and every other field unset.
    #[must_use]
    pub fn new(public_key: Key) -> Self {
        Self {
            public_key,
            ..Self::default()
        }
    }
}

/// A partial update for a WireGuard device.
///
/// `None` fields leave the current value untouched. `Some` applies the
/// value, so `Some(Key::default())` clears the private key and
/// `Some(0)` clears the firewall mark.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Private key to set.
    pub private_key: Option<Key>,
    /// Listen port to set.
    pub listen_port: Option<u16>,
    /// Firewall mark to set.
    pub firewall_mark: Option<u32>,
    /// Discard every existing peer before applying `peers`.
    pub replace_peers: bool,
    /// Peer updates, applied in order.
    pub peers: Vec<PeerConfig>,
}

impl Config {
    /// Creates an empty configuration that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the private key.
    #[must_use]
    pub fn with_private_key(mut self, key: Key) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Sets the firewall mark.
    #[must_use]
    pub fn with_firewall_mark(mut self, mark: u32) -> Self {
        self.firewall_mark = Some(mark);
        self
    }

    /// Replaces the peer list instead of appending to it.
    #[must_use]
    pub fn replacing_peers(mut self) -> Self {
        self.replace_peers = true;
        self
    }

    /// Adds a peer update.
    #[must_use]
    pub fn with_peer(mut self, peer: PeerConfig) -> Self {
        self.peers.push(peer);
        self
    }

    /// Total number of allowed IPs across all peer updates.
    #[must_use]
    pub fn allowed_ip_count(&self) -> usize {
        self.peers.iter().map(|p| p.allowed_ips.len()).sum()
    }
}

/// A partial update for one peer, identified by its public key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Public key of the peer. Mandatory.
    pub public_key: Key,
    /// Remove the peer instead of updating it.
    pub remove: bool,
    /// Only update an existing peer; never create one.
    pub update_only: bool,
    /// Preshared key to set; a zero key clears it.
    pub preshared_key: Option<Key>,
    /// Endpoint to set.
    pub endpoint: Option<SocketAddr>,
    /// Keepalive interval to set; zero disables keepalives.
    pub persistent_keepalive_interval: Option<Duration>,
    /// Discard the peer's existing allowed IPs before applying `allowed_ips`.
    pub replace_allowed_ips: bool,
    /// Allowed IPs to add.
    pub allowed_ips: Vec<IpNet>,
}

impl PeerConfig {
    /// Creates an update for the peer with `public_key` that changes nothing.
    #[must_use]
    pub fn new(public_key: Key) -> Self {
        Self {
            public_key,
            ..Self::default()
        }
    }

    /// Marks the peer for removal.
    #[must_use]
    pub fn removing(mut self) -> Self {
        self.remove = true;
        self
    }

    /// Restricts the update to an existing peer.
    #[must_use]
    pub fn update_only(mut self) -> Self {
        self.update_only = true;
        self
    }

    /// Sets the preshared key.
    #[must_use]
    pub fn with_preshared_key(mut self, key: Key) -> Self {
        self.preshared_key = Some(key);
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the persistent keepalive interval.
    #[must_use]
    pub fn with_persistent_keepalive(mut self, interval: Duration) -> Self {
        self.persistent_keepalive_interval = Some(interval);
        self
    }

    /// Replaces the allowed IP list instead of appending to it.
    #[must_use]
    pub fn replacing_allowed_ips(mut self) -> Self {
        self.replace_allowed_ips = true;
        self
    }

    /// Adds an allowed IP.
    #[must_use]
    pub fn with_allowed_ip(mut self, ip: IpNet) -> Self {
        self.allowed_ips.push(ip);
        self
    }
}
