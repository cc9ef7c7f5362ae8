//! Byte layouts of the OpenBSD `if_wg.h` ioctl structures.
//!
//! `SIOCGWG` and `SIOCSWG` exchange one contiguous buffer: a
//! `wg_interface_io` header, then for each peer a `wg_peer_io` immediately
//! followed by its `wg_aip_io` entries. Offsets are those of the LP64 ABI
//! and every field is read or written explicitly; nothing is reinterpreted
//! in place.
//!
//! ```text
//! wg_interface_io (80)  flags:u16@0 port:be16@2 rtable:i32@4 public@8
//!                       private@40 peers_count:usize@72
//! wg_peer_io (144)      flags:i32@0 protocol_version:i32@4 public@8 psk@40
//!                       pka:u16@72 endpoint:sockaddr@76 txbytes:u64@104
//!                       rxbytes:u64@112 last_handshake:timespec@120
//!                       aips_count:usize@136
//! wg_aip_io (24)        af:u8@0 cidr:i32@4 addr@8
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::{Duration, SystemTime};

use ipnet::IpNet;
use wgctrl_types::{
    Config, Device, DeviceType, KEY_LEN, Key, Peer, PeerConfig, Result, WgError, handshake_time,
};

/// `IFNAMSIZ`, including the terminating NUL.
pub const IFNAMSIZ: usize = 16;

/// Interface group every WireGuard interface joins.
pub const WG_GROUP: &str = "wg";

/// `_IOWR('i', 138, struct ifgroupreq)`.
pub const SIOCGIFGMEMB: u64 = 0xC028_698A;
/// `_IOWR('i', 210, struct wg_data_io)`.
pub const SIOCSWG: u64 = 0xC020_69D2;
/// `_IOWR('i', 211, struct wg_data_io)`.
pub const SIOCGWG: u64 = 0xC020_69D3;

/// Size of one `struct ifg_req` returned by `SIOCGIFGMEMB`.
pub const IFG_REQ_LEN: usize = 16;

/// Size of `struct wg_interface_io`.
pub const INTERFACE_IO_LEN: usize = 80;
/// Size of `struct wg_peer_io`.
pub const PEER_IO_LEN: usize = 144;
/// Size of `struct wg_aip_io`.
pub const AIP_IO_LEN: usize = 24;

/// `wg_interface_io` flags.
pub const WG_INTERFACE_HAS_PUBLIC: u16 = 1 << 0;
pub const WG_INTERFACE_HAS_PRIVATE: u16 = 1 << 1;
pub const WG_INTERFACE_HAS_PORT: u16 = 1 << 2;
pub const WG_INTERFACE_HAS_RTABLE: u16 = 1 << 3;
pub const WG_INTERFACE_REPLACE_PEERS: u16 = 1 << 4;

/// `wg_peer_io` flags.
pub const WG_PEER_HAS_PUBLIC: i32 = 1 << 0;
pub const WG_PEER_HAS_PSK: i32 = 1 << 1;
pub const WG_PEER_HAS_PKA: i32 = 1 << 2;
pub const WG_PEER_HAS_ENDPOINT: i32 = 1 << 3;
pub const WG_PEER_REPLACE_AIPS: i32 = 1 << 4;
pub const WG_PEER_REMOVE: i32 = 1 << 5;
pub const WG_PEER_UPDATE: i32 = 1 << 6;

/// `AF_INET` on OpenBSD.
pub const AF_INET: u8 = 2;
/// `AF_INET6` on OpenBSD.
pub const AF_INET6: u8 = 24;

const SOCKADDR_IN_LEN: u8 = 16;
const SOCKADDR_IN6_LEN: u8 = 28;
const ENDPOINT_LEN: usize = 28;

/// No such group.
pub const ENOENT: i32 = 2;
/// No such interface.
pub const ENXIO: i32 = 6;
/// Invalid argument, or a group buffer that became too small.
pub const EINVAL: i32 = 22;
/// The interface is not a `wg(4)` interface.
pub const ENOTTY: i32 = 25;

/// Encodes an interface name as a NUL-padded `IFNAMSIZ` array.
pub fn ifname(name: &str) -> Result<[u8; IFNAMSIZ]> {
    if name.len() >= IFNAMSIZ || name.contains('\0') {
        return Err(WgError::InvalidArgument(format!("invalid interface name: {name:?}")));
    }
    let mut out = [0u8; IFNAMSIZ];
    out[..name.len()].copy_from_slice(name.as_bytes());
    Ok(out)
}

/// Decodes the interface names in a `SIOCGIFGMEMB` result.
pub fn parse_group_members(buf: &[u8]) -> Vec<String> {
    buf.chunks_exact(IFG_REQ_LEN)
        .filter_map(|entry| {
            let raw = entry.split(|&b| b == 0).next().unwrap_or_default();
            (!raw.is_empty()).then(|| String::from_utf8_lossy(raw).into_owned())
        })
        .collect()
}

/// Bounds-checked reader over a contiguous ioctl buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(WgError::decode(format!(
                "{what} truncated: need {len} bytes, have {}",
                self.buf.len()
            )));
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }
}

fn array<const N: usize>(b: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[at..at + N]);
    out
}

fn u16_at(b: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes(array(b, at))
}

fn i32_at(b: &[u8], at: usize) -> i32 {
    i32::from_ne_bytes(array(b, at))
}

fn u64_at(b: &[u8], at: usize) -> u64 {
    u64::from_ne_bytes(array(b, at))
}

fn i64_at(b: &[u8], at: usize) -> i64 {
    i64::from_ne_bytes(array(b, at))
}

fn key_at(b: &[u8], at: usize) -> Key {
    Key::from_array(array::<KEY_LEN>(b, at))
}

fn count(raw: u64, what: &str) -> Result<usize> {
    usize::try_from(raw).map_err(|_| WgError::decode(format!("{what} count {raw} too large")))
}

/// Decodes a `SIOCGWG` result buffer.
pub fn parse_device(name: &str, buf: &[u8]) -> Result<Device> {
    let mut r = Reader { buf };
    let iface = r.take(INTERFACE_IO_LEN, "wg_interface_io")?;
    let flags = u16_at(iface, 0);

    let mut d = Device {
        name: name.to_owned(),
        device_type: DeviceType::OpenBsdKernel,
        ..Device::default()
    };

    if flags & WG_INTERFACE_HAS_PUBLIC != 0 {
        d.public_key = key_at(iface, 8);
    }
    if flags & WG_INTERFACE_HAS_PRIVATE != 0 {
        d.private_key = key_at(iface, 40);
    }
    if flags & WG_INTERFACE_HAS_PORT != 0 {
        d.listen_port = u16::from_be_bytes(array(iface, 2));
    }
    if flags & WG_INTERFACE_HAS_RTABLE != 0 {
        let rtable = i32_at(iface, 4);
        d.firewall_mark = u32::try_from(rtable)
            .map_err(|_| WgError::decode(format!("negative rtable: {rtable}")))?;
    }

    let peers = count(u64_at(iface, 72), "peer")?;
    for _ in 0..peers {
        d.peers.push(parse_peer(&mut r)?);
    }

    Ok(d)
}

fn parse_peer(r: &mut Reader<'_>) -> Result<Peer> {
    let b = r.take(PEER_IO_LEN, "wg_peer_io")?;
    let flags = i32_at(b, 0);

    let mut p = Peer::default();
    let version = i32_at(b, 4);
    p.protocol_version = u32::try_from(version)
        .map_err(|_| WgError::decode(format!("negative protocol version: {version}")))?;

    if flags & WG_PEER_HAS_PUBLIC != 0 {
        p.public_key = key_at(b, 8);
    }
    if flags & WG_PEER_HAS_PSK != 0 {
        p.preshared_key = key_at(b, 40);
    }
    if flags & WG_PEER_HAS_PKA != 0 {
        p.persistent_keepalive_interval = Duration::from_secs(u64::from(u16_at(b, 72)));
    }
    if flags & WG_PEER_HAS_ENDPOINT != 0 {
        p.endpoint = Some(parse_sockaddr(&b[76..76 + ENDPOINT_LEN])?);
    }

    p.transmit_bytes = u64_at(b, 104);
    p.receive_bytes = u64_at(b, 112);
    p.last_handshake_time = parse_timespec(i64_at(b, 120), i64_at(b, 128))?;

    let aips = count(u64_at(b, 136), "allowed IP")?;
    for _ in 0..aips {
        p.allowed_ips.push(parse_aip(r.take(AIP_IO_LEN, "wg_aip_io")?)?);
    }

    Ok(p)
}

fn parse_aip(b: &[u8]) -> Result<IpNet> {
    let cidr = i32_at(b, 4);
    let prefix = u8::try_from(cidr).map_err(|_| WgError::decode(format!("invalid cidr: {cidr}")))?;
    let addr = match b[0] {
        AF_INET => IpAddr::V4(Ipv4Addr::from(array::<4>(b, 8))),
        AF_INET6 => IpAddr::V6(Ipv6Addr::from(array::<16>(b, 8))),
        af => return Err(WgError::decode(format!("unknown allowed IP family: {af}"))),
    };
    IpNet::new(addr, prefix).map_err(|e| WgError::decode(format!("allowed IP {addr}/{prefix}: {e}")))
}

/// Decodes a BSD `sockaddr_in` or `sockaddr_in6` (length byte, then family
/// byte).
pub fn parse_sockaddr(b: &[u8]) -> Result<SocketAddr> {
    if b.len() < usize::from(SOCKADDR_IN6_LEN) {
        return Err(WgError::decode(format!("endpoint truncated: {} bytes", b.len())));
    }
    let port = u16::from_be_bytes(array(b, 2));
    match b[1] {
        AF_INET => Ok(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::from(array::<4>(b, 4)),
            port,
        ))),
        AF_INET6 => Ok(SocketAddr::V6(SocketAddrV6::new(
            Ipv6Addr::from(array::<16>(b, 8)),
            port,
            u32::from_be_bytes(array(b, 4)),
            u32::from_ne_bytes(array(b, 24)),
        ))),
        af => Err(WgError::decode(format!("unknown endpoint family: {af}"))),
    }
}

fn parse_timespec(sec: i64, nsec: i64) -> Result<Option<SystemTime>> {
    match (u64::try_from(sec), u64::try_from(nsec)) {
        (Ok(sec), Ok(nsec)) => handshake_time(sec, nsec),
        _ => Err(WgError::decode(format!("negative handshake time: {sec}.{nsec}"))),
    }
}

/// Encodes a BSD socket address into a 28 byte endpoint union.
#[must_use]
pub fn sockaddr_bytes(addr: SocketAddr) -> [u8; ENDPOINT_LEN] {
    let mut b = [0u8; ENDPOINT_LEN];
    match addr {
        SocketAddr::V4(a) => {
            b[0] = SOCKADDR_IN_LEN;
            b[1] = AF_INET;
            b[2..4].copy_from_slice(&a.port().to_be_bytes());
            b[4..8].copy_from_slice(&a.ip().octets());
        }
        SocketAddr::V6(a) => {
            b[0] = SOCKADDR_IN6_LEN;
            b[1] = AF_INET6;
            b[2..4].copy_from_slice(&a.port().to_be_bytes());
            b[4..8].copy_from_slice(&a.flowinfo().to_be_bytes());
            b[8..24].copy_from_slice(&a.ip().octets());
            b[24..28].copy_from_slice(&a.scope_id().to_ne_bytes());
        }
    }
    b
}

fn put(buf: &mut [u8], at: usize, data: &[u8]) {
    buf[at..at + data.len()].copy_from_slice(data);
}

/// Encodes `cfg` as a `SIOCSWG` buffer.
pub fn config_bytes(cfg: &Config) -> Result<Vec<u8>> {
    let aips = cfg.allowed_ip_count();
    let mut buf =
        vec![0u8; INTERFACE_IO_LEN + cfg.peers.len() * PEER_IO_LEN + aips * AIP_IO_LEN];

    let mut flags = 0u16;
    if let Some(key) = &cfg.private_key {
        flags |= WG_INTERFACE_HAS_PRIVATE;
        put(&mut buf, 40, key.as_bytes());
    }
    if let Some(port) = cfg.listen_port {
        flags |= WG_INTERFACE_HAS_PORT;
        put(&mut buf, 2, &port.to_be_bytes());
    }
    if let Some(mark) = cfg.firewall_mark {
        let rtable = i32::try_from(mark)
            .map_err(|_| WgError::InvalidArgument(format!("routing table {mark} out of range")))?;
        flags |= WG_INTERFACE_HAS_RTABLE;
        put(&mut buf, 4, &rtable.to_ne_bytes());
    }
    if cfg.replace_peers {
        flags |= WG_INTERFACE_REPLACE_PEERS;
    }
    put(&mut buf, 0, &flags.to_ne_bytes());
    put(&mut buf, 72, &(cfg.peers.len() as u64).to_ne_bytes());

    let mut at = INTERFACE_IO_LEN;
    for peer in &cfg.peers {
        encode_peer(&mut buf[at..at + PEER_IO_LEN], peer)?;
        at += PEER_IO_LEN;

        for ip in &peer.allowed_ips {
            encode_aip(&mut buf[at..at + AIP_IO_LEN], ip);
            at += AIP_IO_LEN;
        }
    }

    Ok(buf)
}

fn encode_peer(b: &mut [u8], p: &PeerConfig) -> Result<()> {
    let mut flags = WG_PEER_HAS_PUBLIC;
    put(b, 8, p.public_key.as_bytes());

    if let Some(psk) = &p.preshared_key {
        flags |= WG_PEER_HAS_PSK;
        put(b, 40, psk.as_bytes());
    }
    if let Some(interval) = p.persistent_keepalive_interval {
        let secs = u16::try_from(interval.as_secs()).map_err(|_| {
            WgError::InvalidArgument(format!(
                "persistent keepalive interval {}s out of range",
                interval.as_secs()
            ))
        })?;
        flags |= WG_PEER_HAS_PKA;
        put(b, 72, &secs.to_ne_bytes());
    }
    if let Some(endpoint) = p.endpoint {
        flags |= WG_PEER_HAS_ENDPOINT;
        put(b, 76, &sockaddr_bytes(endpoint));
    }
    if p.replace_allowed_ips {
        flags |= WG_PEER_REPLACE_AIPS;
    }
    if p.remove {
        flags |= WG_PEER_REMOVE;
    }
    if p.update_only {
        flags |= WG_PEER_UPDATE;
    }

    put(b, 0, &flags.to_ne_bytes());
    put(b, 136, &(p.allowed_ips.len() as u64).to_ne_bytes());
    Ok(())
}

fn encode_aip(b: &mut [u8], ip: &IpNet) {
    match ip {
        IpNet::V4(n) => {
            b[0] = AF_INET;
            put(b, 8, &n.addr().octets());
        }
        IpNet::V6(n) => {
            b[0] = AF_INET6;
            put(b, 8, &n.addr().octets());
        }
    }
    put(b, 4, &i32::from(ip.prefix_len()).to_ne_bytes());
}
