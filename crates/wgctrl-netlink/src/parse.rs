//! Decoding WireGuard `WG_CMD_GET_DEVICE` dump responses.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::{Duration, SystemTime};

use ipnet::IpNet;
use wgctrl_types::{Device, DeviceType, Key, Peer, Result, WgError, handshake_time};

use crate::attr::{Attribute, Attributes};
use crate::consts::{
    AF_INET, AF_INET6, SOCKADDR_IN6_LEN, SOCKADDR_IN_LEN, WGALLOWEDIP_A_CIDR_MASK,
    WGALLOWEDIP_A_FAMILY, WGALLOWEDIP_A_IPADDR, WGDEVICE_A_FWMARK, WGDEVICE_A_IFNAME,
    WGDEVICE_A_LISTEN_PORT, WGDEVICE_A_PEERS, WGDEVICE_A_PRIVATE_KEY, WGDEVICE_A_PUBLIC_KEY,
    WGPEER_A_ALLOWEDIPS, WGPEER_A_ENDPOINT, WGPEER_A_LAST_HANDSHAKE_TIME,
    WGPEER_A_PERSISTENT_KEEPALIVE_INTERVAL, WGPEER_A_PRESHARED_KEY, WGPEER_A_PROTOCOL_VERSION,
    WGPEER_A_PUBLIC_KEY, WGPEER_A_RX_BYTES, WGPEER_A_TX_BYTES,
};

/// Parses a device from the attribute payloads of a dump response.
///
/// The kernel splits large peer lists across several messages. The first
/// message is the device snapshot; peers from every later message are merged
/// into it with [`merge_devices`].
pub fn parse_device<B: AsRef<[u8]>>(msgs: &[B]) -> Result<Device> {
    let (first, rest) = msgs
        .split_first()
        .ok_or_else(|| WgError::decode("empty device dump"))?;

    let mut target = parse_device_message(first.as_ref())?;
    for msg in rest {
        let fragment = parse_device_message(msg.as_ref())?;
        merge_devices(&mut target, fragment);
    }
    Ok(target)
}

/// Parses the attributes of a single dump message.
pub fn parse_device_message(data: &[u8]) -> Result<Device> {
    let mut d = Device {
        device_type: DeviceType::LinuxKernel,
        ..Device::default()
    };

    for attr in Attributes::new(data) {
        let attr = attr?;
        match attr.kind {
            WGDEVICE_A_IFNAME => d.name = attr.string()?,
            WGDEVICE_A_PRIVATE_KEY => d.private_key = attr.key()?,
            WGDEVICE_A_PUBLIC_KEY => d.public_key = attr.key()?,
            WGDEVICE_A_LISTEN_PORT => d.listen_port = attr.u16()?,
            WGDEVICE_A_FWMARK => d.firewall_mark = attr.u32()?,
            WGDEVICE_A_PEERS => d.peers = parse_peers(&attr)?,
            _ => {}
        }
    }

    Ok(d)
}

/// Merges the peers of `fragment` into `target`.
///
/// A peer already present in `target` gets the fragment's allowed IPs
/// appended; an unknown peer is appended whole. First-seen peer order is
/// kept, and allowed IPs follow message arrival order.
pub fn merge_devices(target: &mut Device, fragment: Device) {
    let mut known: HashMap<Key, usize> = target
        .peers
        .iter()
        .enumerate()
        .map(|(i, p)| (p.public_key, i))
        .collect();

    for peer in fragment.peers {
        if let Some(&i) = known.get(&peer.public_key) {
            target.peers[i].allowed_ips.extend(peer.allowed_ips);
            continue;
        }

        known.insert(peer.public_key, target.peers.len());
        target.peers.push(peer);
    }
}

fn parse_peers(attr: &Attribute<'_>) -> Result<Vec<Peer>> {
    // A netlink "array": every child is itself a block of peer attributes.
    let mut peers = Vec::new();
    for entry in attr.nested_attrs() {
        peers.push(parse_peer(&entry?)?);
    }
    Ok(peers)
}

fn parse_peer(entry: &Attribute<'_>) -> Result<Peer> {
    let mut p = Peer::default();
    for attr in entry.nested_attrs() {
        let attr = attr?;
        match attr.kind {
            WGPEER_A_PUBLIC_KEY => p.public_key = attr.key()?,
            WGPEER_A_PRESHARED_KEY => p.preshared_key = attr.key()?,
            WGPEER_A_ENDPOINT => p.endpoint = Some(parse_sockaddr(attr.data)?),
            WGPEER_A_PERSISTENT_KEEPALIVE_INTERVAL => {
                p.persistent_keepalive_interval = Duration::from_secs(u64::from(attr.u16()?));
            }
            WGPEER_A_LAST_HANDSHAKE_TIME => p.last_handshake_time = parse_timespec(attr.data)?,
            WGPEER_A_RX_BYTES => p.receive_bytes = attr.u64()?,
            WGPEER_A_TX_BYTES => p.transmit_bytes = attr.u64()?,
            WGPEER_A_ALLOWEDIPS => {
                for ip in attr.nested_attrs() {
                    p.allowed_ips.push(parse_allowed_ip(&ip?)?);
                }
            }
            WGPEER_A_PROTOCOL_VERSION => p.protocol_version = attr.u32()?,
            _ => {}
        }
    }
    Ok(p)
}

fn parse_allowed_ip(entry: &Attribute<'_>) -> Result<IpNet> {
    let mut family = None;
    let mut addr = None;
    let mut mask = None;

    for attr in entry.nested_attrs() {
        let attr = attr?;
        match attr.kind {
            WGALLOWEDIP_A_FAMILY => family = Some(attr.u16()?),
            WGALLOWEDIP_A_IPADDR => addr = Some(attr.ip_addr()?),
            WGALLOWEDIP_A_CIDR_MASK => mask = Some(attr.u8()?),
            _ => {}
        }
    }

    let addr = addr.ok_or_else(|| WgError::decode("allowed IP without address"))?;
    match (family, addr.is_ipv4()) {
        (None, _) | (Some(AF_INET), true) | (Some(AF_INET6), false) => {}
        (Some(f), _) => {
            return Err(WgError::decode(format!(
                "allowed IP family {f} does not match address {addr}"
            )));
        }
    }

    let full = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, mask.unwrap_or(full))
        .map_err(|e| WgError::decode(format!("allowed IP {addr}: {e}")))
}

/// Parses a raw `sockaddr_in` or `sockaddr_in6`, dispatching on length.
pub fn parse_sockaddr(b: &[u8]) -> Result<SocketAddr> {
    match b.len() {
        SOCKADDR_IN_LEN => {
            let port = u16::from_be_bytes([b[2], b[3]]);
            let ip = Ipv4Addr::new(b[4], b[5], b[6], b[7]);
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        SOCKADDR_IN6_LEN => {
            let port = u16::from_be_bytes([b[2], b[3]]);
            let flowinfo = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&b[8..24]);
            let scope_id = u32::from_ne_bytes([b[24], b[25], b[26], b[27]]);
            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                flowinfo,
                scope_id,
            )))
        }
        n => Err(WgError::decode(format!("unexpected sockaddr size: {n}"))),
    }
}

/// Parses a `timespec`, accepting both 32-bit and 64-bit field layouts.
///
/// An all-zero value means no handshake has happened and yields `None`.
pub fn parse_timespec(b: &[u8]) -> Result<Option<SystemTime>> {
    let (sec, nsec) = match b.len() {
        8 => (
            i64::from(i32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
            i64::from(i32::from_ne_bytes([b[4], b[5], b[6], b[7]])),
        ),
        16 => {
            let mut sec = [0u8; 8];
            let mut nsec = [0u8; 8];
            sec.copy_from_slice(&b[..8]);
            nsec.copy_from_slice(&b[8..]);
            (i64::from_ne_bytes(sec), i64::from_ne_bytes(nsec))
        }
        n => return Err(WgError::decode(format!("unexpected timespec size: {n}"))),
    };

    let sec = u64::try_from(sec).map_err(|_| WgError::decode(format!("negative timespec seconds: {sec}")))?;
    let nsec = u64::try_from(nsec)
        .map_err(|_| WgError::decode(format!("negative timespec nanoseconds: {nsec}")))?;

    handshake_time(sec, nsec)
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use super::*;
    use crate::attr::AttributeEncoder;
    use crate::consts::WGDEVICE_A_IFINDEX;
    use test_case::test_case;

    fn net(s: &str) -> IpNet {
        s.parse().expect("valid cidr")
    }

    fn key(b: u8) -> Key {
        Key::from_array([b; 32])
    }

    fn allowed_ip(ae: &mut AttributeEncoder, i: u16, ip: IpNet) -> Result<()> {
        ae.nested(i, |e| {
            let (family, raw) = match ip {
                IpNet::V4(n) => (AF_INET, n.addr().octets().to_vec()),
                IpNet::V6(n) => (AF_INET6, n.addr().octets().to_vec()),
            };
            e.u16(WGALLOWEDIP_A_FAMILY, family)?;
            e.bytes(WGALLOWEDIP_A_IPADDR, &raw)?;
            e.u8(WGALLOWEDIP_A_CIDR_MASK, ip.prefix_len())
        })
    }

    fn dump_message(name: Option<&str>, peers: &[(Key, &[&str])]) -> Vec<u8> {
        let mut ae = AttributeEncoder::new();
        if let Some(name) = name {
            ae.string(WGDEVICE_A_IFNAME, name).expect("name");
            ae.u16(WGDEVICE_A_LISTEN_PORT, 51820).expect("port");
        }
        ae.nested(WGDEVICE_A_PEERS, |pe| {
            for (i, (k, ips)) in peers.iter().enumerate() {
                pe.nested(i as u16, |p| {
                    p.bytes(WGPEER_A_PUBLIC_KEY, k.as_bytes())?;
                    p.nested(WGPEER_A_ALLOWEDIPS, |a| {
                        for (j, ip) in ips.iter().enumerate() {
                            allowed_ip(a, j as u16, net(ip))?;
                        }
                        Ok(())
                    })
                })?;
            }
            Ok(())
        })
        .expect("peers");
        ae.finish()
    }

    #[test]
    fn parses_device_fields() {
        let mut ae = AttributeEncoder::new();
        ae.u32(WGDEVICE_A_IFINDEX, 4).expect("ifindex");
        ae.string(WGDEVICE_A_IFNAME, "wg0").expect("name");
        ae.bytes(WGDEVICE_A_PRIVATE_KEY, key(1).as_bytes()).expect("private");
        ae.bytes(WGDEVICE_A_PUBLIC_KEY, key(2).as_bytes()).expect("public");
        ae.u16(WGDEVICE_A_LISTEN_PORT, 5555).expect("port");
        ae.u32(WGDEVICE_A_FWMARK, 0xff).expect("fwmark");

        let d = parse_device(&[ae.finish()]).expect("device");
        assert_eq!(d.name, "wg0");
        assert_eq!(d.device_type, DeviceType::LinuxKernel);
        assert_eq!(d.private_key, key(1));
        assert_eq!(d.public_key, key(2));
        assert_eq!(d.listen_port, 5555);
        assert_eq!(d.firewall_mark, 0xff);
        assert!(d.peers.is_empty());
    }

    #[test]
    fn parses_peer_fields() {
        let mut ae = AttributeEncoder::new();
        ae.nested(WGDEVICE_A_PEERS, |pe| {
            pe.nested(0, |p| {
                p.bytes(WGPEER_A_PUBLIC_KEY, key(3).as_bytes())?;
                p.bytes(WGPEER_A_PRESHARED_KEY, key(4).as_bytes())?;
                let mut sa = vec![0u8; SOCKADDR_IN_LEN];
                sa[..2].copy_from_slice(&AF_INET.to_ne_bytes());
                sa[2..4].copy_from_slice(&51820u16.to_be_bytes());
                sa[4..8].copy_from_slice(&[192, 168, 1, 1]);
                p.bytes(WGPEER_A_ENDPOINT, &sa)?;
                p.u16(WGPEER_A_PERSISTENT_KEEPALIVE_INTERVAL, 25)?;
                let mut ts = 10i64.to_ne_bytes().to_vec();
                ts.extend(20i64.to_ne_bytes());
                p.bytes(WGPEER_A_LAST_HANDSHAKE_TIME, &ts)?;
                p.u64(WGPEER_A_RX_BYTES, 100)?;
                p.u64(WGPEER_A_TX_BYTES, 200)?;
                p.u32(WGPEER_A_PROTOCOL_VERSION, 1)?;
                p.nested(WGPEER_A_ALLOWEDIPS, |a| {
                    allowed_ip(a, 0, net("10.0.0.0/24"))?;
                    allowed_ip(a, 1, net("fd00::1/128"))
                })
            })
        })
        .expect("peers");

        let d = parse_device(&[ae.finish()]).expect("device");
        let p = &d.peers[0];
        assert_eq!(p.public_key, key(3));
        assert_eq!(p.preshared_key, key(4));
        assert_eq!(p.endpoint, Some("192.168.1.1:51820".parse().expect("addr")));
        assert_eq!(p.persistent_keepalive_interval, Duration::from_secs(25));
        assert_eq!(
            p.last_handshake_time,
            Some(UNIX_EPOCH + Duration::new(10, 20))
        );
        assert_eq!(p.receive_bytes, 100);
        assert_eq!(p.transmit_bytes, 200);
        assert_eq!(p.protocol_version, 1);
        assert_eq!(p.allowed_ips, vec![net("10.0.0.0/24"), net("fd00::1/128")]);
    }

    #[test]
    fn merges_peers_across_messages() {
        let a = key(0xa);
        let b = key(0xb);
        let msgs = vec![
            dump_message(Some("wg0"), &[(a, &["10.0.0.1/32", "10.0.0.2/32"])]),
            dump_message(None, &[(a, &["10.0.0.3/32", "10.0.0.4/32"]), (b, &["10.0.0.5/32"])]),
        ];

        let d = parse_device(&msgs).expect("device");
        assert_eq!(d.name, "wg0");
        assert_eq!(d.listen_port, 51820);
        assert_eq!(d.peers.len(), 2);
        assert_eq!(d.peers[0].public_key, a);
        assert_eq!(
            d.peers[0].allowed_ips,
            ["10.0.0.1/32", "10.0.0.2/32", "10.0.0.3/32", "10.0.0.4/32"].map(net).to_vec()
        );
        assert_eq!(d.peers[1].public_key, b);
        assert_eq!(d.peers[1].allowed_ips, vec![net("10.0.0.5/32")]);
    }

    #[test]
    fn merge_recognises_peers_added_by_earlier_fragments() {
        let a = key(1);
        let b = key(2);
        let msgs = vec![
            dump_message(Some("wg0"), &[(a, &["10.0.0.1/32"])]),
            dump_message(None, &[(b, &["10.0.1.1/32"])]),
            dump_message(None, &[(b, &["10.0.1.2/32"])]),
        ];

        let d = parse_device(&msgs).expect("device");
        assert_eq!(d.peers.len(), 2);
        assert_eq!(d.peers[1].allowed_ips, vec![net("10.0.1.1/32"), net("10.0.1.2/32")]);
    }

    #[test]
    fn merge_into_device_without_peers() {
        let a = key(1);
        let msgs = vec![
            dump_message(Some("wg0"), &[]),
            dump_message(None, &[(a, &["10.0.0.1/32"])]),
        ];

        let d = parse_device(&msgs).expect("device");
        assert_eq!(d.peers.len(), 1);
    }

    #[test]
    fn decode_error_discards_partial_device() {
        let mut bad = AttributeEncoder::new();
        bad.u32(WGDEVICE_A_LISTEN_PORT, 1).expect("wrong width");
        let msgs = vec![dump_message(Some("wg0"), &[]), bad.finish()];
        assert!(matches!(parse_device(&msgs), Err(WgError::Decode(_))));
    }

    #[test]
    fn empty_dump_is_error() {
        let msgs: Vec<Vec<u8>> = Vec::new();
        assert!(parse_device(&msgs).is_err());
    }

    #[test]
    fn sockaddr_v4() {
        let mut b = [0u8; SOCKADDR_IN_LEN];
        b[..2].copy_from_slice(&AF_INET.to_ne_bytes());
        b[2..4].copy_from_slice(&[0x1f, 0x90]);
        b[4..8].copy_from_slice(&[10, 1, 2, 3]);
        assert_eq!(parse_sockaddr(&b).expect("v4"), "10.1.2.3:8080".parse::<SocketAddr>().expect("addr"));
    }

    #[test]
    fn sockaddr_v6() {
        let mut b = [0u8; SOCKADDR_IN6_LEN];
        b[..2].copy_from_slice(&AF_INET6.to_ne_bytes());
        b[2..4].copy_from_slice(&51820u16.to_be_bytes());
        b[8..24].copy_from_slice(&"fd00::2".parse::<Ipv6Addr>().expect("ip").octets());
        assert_eq!(
            parse_sockaddr(&b).expect("v6"),
            "[fd00::2]:51820".parse::<SocketAddr>().expect("addr")
        );
    }

    #[test_case(0; "empty")]
    #[test_case(15; "short v4")]
    #[test_case(17; "long v4")]
    #[test_case(27; "short v6")]
    fn sockaddr_bad_length(len: usize) {
        assert!(matches!(parse_sockaddr(&vec![0u8; len]), Err(WgError::Decode(_))));
    }

    #[test]
    fn timespec_widths() {
        let mut b32 = 5i32.to_ne_bytes().to_vec();
        b32.extend(6i32.to_ne_bytes());
        assert_eq!(parse_timespec(&b32).expect("32"), Some(UNIX_EPOCH + Duration::new(5, 6)));

        let mut b64 = 5i64.to_ne_bytes().to_vec();
        b64.extend(0i64.to_ne_bytes());
        assert_eq!(parse_timespec(&b64).expect("64"), Some(UNIX_EPOCH + Duration::from_secs(5)));

        assert_eq!(parse_timespec(&[0u8; 16]).expect("zero"), None);
        assert_eq!(parse_timespec(&[0u8; 8]).expect("zero"), None);
        assert!(parse_timespec(&[0u8; 12]).is_err());
    }

    #[test_case(i64::MAX, 999_999_999_999; "seconds and nanoseconds overflow")]
    #[test_case(1, 1_000_000_000; "nanoseconds out of range")]
    #[test_case(-1, 0; "negative seconds")]
    fn timespec_out_of_range(sec: i64, nsec: i64) {
        let mut b = sec.to_ne_bytes().to_vec();
        b.extend(nsec.to_ne_bytes());
        assert!(matches!(parse_timespec(&b), Err(WgError::Decode(_))));
    }

    #[test]
    fn allowed_ip_family_mismatch() {
        let mut ae = AttributeEncoder::new();
        ae.nested(0, |e| {
            e.u16(WGALLOWEDIP_A_FAMILY, AF_INET6)?;
            e.bytes(WGALLOWEDIP_A_IPADDR, &[10, 0, 0, 1])?;
            e.u8(WGALLOWEDIP_A_CIDR_MASK, 32)
        })
        .expect("encode");
        let buf = ae.finish();
        let entry = Attributes::new(&buf).next().expect("one").expect("valid");
        assert!(parse_allowed_ip(&entry).is_err());
    }

    #[test]
    fn allowed_ip_mask_too_long() {
        let mut ae = AttributeEncoder::new();
        ae.nested(0, |e| {
            e.u16(WGALLOWEDIP_A_FAMILY, AF_INET)?;
            e.bytes(WGALLOWEDIP_A_IPADDR, &[10, 0, 0, 1])?;
            e.u8(WGALLOWEDIP_A_CIDR_MASK, 33)
        })
        .expect("encode");
        let buf = ae.finish();
        let entry = Attributes::new(&buf).next().expect("one").expect("valid");
        assert!(parse_allowed_ip(&entry).is_err());
    }
}
