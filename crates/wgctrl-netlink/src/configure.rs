//! Encoding `WG_CMD_SET_DEVICE` requests and splitting large ones.

use std::collections::HashSet;
use std::net::SocketAddr;

use ipnet::IpNet;
use wgctrl_types::{Config, Key, PeerConfig, Result, WgError};

use crate::attr::AttributeEncoder;
use crate::consts::{
    AF_INET, AF_INET6, SOCKADDR_IN6_LEN, SOCKADDR_IN_LEN, WGALLOWEDIP_A_CIDR_MASK,
    WGALLOWEDIP_A_FAMILY, WGALLOWEDIP_A_IPADDR, WGDEVICE_A_FLAGS, WGDEVICE_A_FWMARK,
    WGDEVICE_A_IFNAME, WGDEVICE_A_LISTEN_PORT, WGDEVICE_A_PEERS, WGDEVICE_A_PRIVATE_KEY,
    WGDEVICE_F_REPLACE_PEERS, WGPEER_A_ALLOWEDIPS, WGPEER_A_ENDPOINT, WGPEER_A_FLAGS,
    WGPEER_A_PERSISTENT_KEEPALIVE_INTERVAL, WGPEER_A_PRESHARED_KEY, WGPEER_A_PUBLIC_KEY,
    WGPEER_F_REMOVE_ME, WGPEER_F_REPLACE_ALLOWEDIPS, WGPEER_F_UPDATE_ONLY,
};

/// Maximum allowed IPs per peer in one batch.
///
/// The encoded size of a peer is not known up front, so this stays small
/// enough that a full chunk always fits in one message.
pub const IP_BATCH_CHUNK: usize = 256;

/// Peer count above which a configuration is split into batches.
pub const PEER_BATCH_CHUNK: usize = 32;

/// Encodes the attributes configuring device `name` from the present fields
/// of `cfg`.
pub fn config_attrs(name: &str, cfg: &Config) -> Result<Vec<u8>> {
    let mut ae = AttributeEncoder::new();
    ae.string(WGDEVICE_A_IFNAME, name)?;

    if let Some(key) = &cfg.private_key {
        ae.bytes(WGDEVICE_A_PRIVATE_KEY, key.as_bytes())?;
    }
    if let Some(port) = cfg.listen_port {
        ae.u16(WGDEVICE_A_LISTEN_PORT, port)?;
    }
    if let Some(mark) = cfg.firewall_mark {
        ae.u32(WGDEVICE_A_FWMARK, mark)?;
    }
    if cfg.replace_peers {
        ae.u32(WGDEVICE_A_FLAGS, WGDEVICE_F_REPLACE_PEERS)?;
    }

    if !cfg.peers.is_empty() {
        ae.nested(WGDEVICE_A_PEERS, |pe| {
            for (i, peer) in cfg.peers.iter().enumerate() {
                pe.nested(array_index(i)?, |e| encode_peer(e, peer))?;
            }
            Ok(())
        })?;
    }

    Ok(ae.finish())
}

fn encode_peer(ae: &mut AttributeEncoder, p: &PeerConfig) -> Result<()> {
    ae.bytes(WGPEER_A_PUBLIC_KEY, p.public_key.as_bytes())?;

    let mut flags = 0;
    if p.remove {
        flags |= WGPEER_F_REMOVE_ME;
    }
    if p.replace_allowed_ips {
        flags |= WGPEER_F_REPLACE_ALLOWEDIPS;
    }
    if p.update_only {
        flags |= WGPEER_F_UPDATE_ONLY;
    }
    if flags != 0 {
        ae.u32(WGPEER_A_FLAGS, flags)?;
    }

    if let Some(key) = &p.preshared_key {
        ae.bytes(WGPEER_A_PRESHARED_KEY, key.as_bytes())?;
    }
    if let Some(endpoint) = p.endpoint {
        ae.bytes(WGPEER_A_ENDPOINT, &sockaddr_bytes(endpoint))?;
    }
    if let Some(interval) = p.persistent_keepalive_interval {
        let secs = u16::try_from(interval.as_secs()).map_err(|_| {
            WgError::InvalidArgument(format!(
                "persistent keepalive interval {}s exceeds {}s",
                interval.as_secs(),
                u16::MAX
            ))
        })?;
        ae.u16(WGPEER_A_PERSISTENT_KEEPALIVE_INTERVAL, secs)?;
    }

    if !p.allowed_ips.is_empty() {
        ae.nested(WGPEER_A_ALLOWEDIPS, |e| encode_allowed_ips(e, &p.allowed_ips))?;
    }
    Ok(())
}

fn encode_allowed_ips(ae: &mut AttributeEncoder, ips: &[IpNet]) -> Result<()> {
    for (i, ip) in ips.iter().enumerate() {
        ae.nested(array_index(i)?, |e| {
            match ip {
                IpNet::V4(n) => {
                    e.u16(WGALLOWEDIP_A_FAMILY, AF_INET)?;
                    e.bytes(WGALLOWEDIP_A_IPADDR, &n.addr().octets())?;
                }
                IpNet::V6(n) => {
                    e.u16(WGALLOWEDIP_A_FAMILY, AF_INET6)?;
                    e.bytes(WGALLOWEDIP_A_IPADDR, &n.addr().octets())?;
                }
            }
            e.u8(WGALLOWEDIP_A_CIDR_MASK, ip.prefix_len())
        })?;
    }
    Ok(())
}

fn array_index(i: usize) -> Result<u16> {
    u16::try_from(i).map_err(|_| WgError::InvalidArgument(format!("array index {i} too large")))
}

/// Encodes a socket address as a Linux `sockaddr_in` or `sockaddr_in6`.
#[must_use]
pub fn sockaddr_bytes(addr: SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(a) => {
            let mut b = vec![0u8; SOCKADDR_IN_LEN];
            b[..2].copy_from_slice(&AF_INET.to_ne_bytes());
            b[2..4].copy_from_slice(&a.port().to_be_bytes());
            b[4..8].copy_from_slice(&a.ip().octets());
            b
        }
        SocketAddr::V6(a) => {
            let mut b = vec![0u8; SOCKADDR_IN6_LEN];
            b[..2].copy_from_slice(&AF_INET6.to_ne_bytes());
            b[2..4].copy_from_slice(&a.port().to_be_bytes());
            b[4..8].copy_from_slice(&a.flowinfo().to_be_bytes());
            b[8..24].copy_from_slice(&a.ip().octets());
            b[24..28].copy_from_slice(&a.scope_id().to_ne_bytes());
            b
        }
    }
}

/// Reports whether `cfg` is large enough to need splitting.
#[must_use]
pub fn should_batch(cfg: &Config) -> bool {
    cfg.peers.len() > PEER_BATCH_CHUNK || cfg.allowed_ip_count() > IP_BATCH_CHUNK
}

/// Splits `cfg` into configurations that each fit in one message.
///
/// Small configurations come back unchanged as the only batch. Otherwise
/// each batch carries the device fields and a single peer with at most
/// [`IP_BATCH_CHUNK`] allowed IPs. Only a peer's first chunk carries its
/// preshared key, endpoint, keepalive and allowed IP replacement so later
/// chunks append. Only the first batch may replace the peer list.
///
/// Batches must be applied in order.
#[must_use]
pub fn build_batches(cfg: &Config) -> Vec<Config> {
    if !should_batch(cfg) {
        return vec![cfg.clone()];
    }

    let base = Config {
        peers: Vec::new(),
        ..cfg.clone()
    };

    let mut seen: HashSet<Key> = HashSet::new();
    let mut batches = Vec::new();

    for p in &cfg.peers {
        // A peer without IPs still needs one message.
        let chunks: Vec<&[IpNet]> = if p.allowed_ips.is_empty() {
            vec![&p.allowed_ips[..]]
        } else {
            p.allowed_ips.chunks(IP_BATCH_CHUNK).collect()
        };

        for chunk in chunks {
            let mut pcfg = PeerConfig {
                public_key: p.public_key,
                remove: p.remove,
                update_only: p.update_only,
                allowed_ips: chunk.to_vec(),
                ..PeerConfig::default()
            };

            if seen.insert(p.public_key) {
                pcfg.preshared_key = p.preshared_key;
                pcfg.endpoint = p.endpoint;
                pcfg.persistent_keepalive_interval = p.persistent_keepalive_interval;
                pcfg.replace_allowed_ips = p.replace_allowed_ips;
            }

            let mut batch = base.clone();
            batch.peers.push(pcfg);
            batches.push(batch);
        }
    }

    for batch in batches.iter_mut().skip(1) {
        batch.replace_peers = false;
    }

    batches
}
