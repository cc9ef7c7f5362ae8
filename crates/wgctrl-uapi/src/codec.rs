//! The UAPI `key=value` text protocol.
//!
//! Requests are `get=1` or `set=1` followed by configuration lines and a
//! blank line. Every response ends with `errno=N` and a blank line.

use std::fmt::Display;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::time::Duration;

use ipnet::IpNet;
use wgctrl_types::{Config, Device, DeviceType, Key, Peer, Result, WgError, handshake_time};

/// The complete `get` request.
pub const GET_REQUEST: &str = "get=1\n\n";

fn line(out: &mut String, key: &str, value: impl Display) {
    out.push_str(key);
    out.push('=');
    out.push_str(&value.to_string());
    out.push('\n');
}

/// Encodes a `set` request applying the present fields of `cfg`.
#[must_use]
pub fn set_request(cfg: &Config) -> String {
    let mut out = String::from("set=1\n");

    if let Some(key) = &cfg.private_key {
        line(&mut out, "private_key", key.to_hex());
    }
    if let Some(port) = cfg.listen_port {
        line(&mut out, "listen_port", port);
    }
    if let Some(mark) = cfg.firewall_mark {
        line(&mut out, "fwmark", mark);
    }
    if cfg.replace_peers {
        line(&mut out, "replace_peers", true);
    }

    for p in &cfg.peers {
        line(&mut out, "public_key", p.public_key.to_hex());

        if p.remove {
            line(&mut out, "remove", true);
        }
        if p.update_only {
            line(&mut out, "update_only", true);
        }
        if let Some(key) = &p.preshared_key {
            line(&mut out, "preshared_key", key.to_hex());
        }
        if let Some(endpoint) = p.endpoint {
            line(&mut out, "endpoint", endpoint);
        }
        if let Some(interval) = p.persistent_keepalive_interval {
            line(&mut out, "persistent_keepalive_interval", interval.as_secs());
        }
        if p.replace_allowed_ips {
            line(&mut out, "replace_allowed_ips", true);
        }
        for ip in &p.allowed_ips {
            line(&mut out, "allowed_ip", ip);
        }
    }

    out.push('\n');
    out
}

/// Splits a response into `(key, value)` pairs, stopping at the first blank
/// line. `errno` must be the last pair.
fn pairs(response: &str) -> impl Iterator<Item = Result<(&str, &str)>> {
    let mut seen_errno = false;
    response
        .lines()
        .take_while(|l| !l.is_empty())
        .map(move |l| {
            if seen_errno {
                return Err(WgError::decode(format!("line after errno: {l:?}")));
            }
            let mut parts = l.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(k), Some(v), None) => {
                    seen_errno = k == "errno";
                    Ok((k, v))
                }
                _ => Err(WgError::decode(format!("malformed line: {l:?}"))),
            }
        })
}

fn errno(op: &'static str, value: Option<i32>) -> Result<()> {
    match value {
        Some(0) => Ok(()),
        Some(errno) => Err(WgError::Errno { op, errno }),
        None => Err(WgError::decode("response missing errno")),
    }
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| WgError::decode(format!("{key}={value}: {e}")))
}

fn key(name: &str, value: &str) -> Result<Key> {
    Key::from_hex(value).map_err(|e| WgError::decode(format!("{name}: {e}")))
}

/// Checks the status of a `set` response.
pub fn parse_set_response(response: &str) -> Result<()> {
    let mut code = None;
    for pair in pairs(response) {
        let (k, v) = pair?;
        if k == "errno" {
            code = Some(number(k, v)?);
        }
    }
    errno("set", code)
}

#[derive(Default)]
struct PendingPeer {
    peer: Peer,
    handshake_sec: u64,
    handshake_nsec: u64,
}

impl PendingPeer {
    fn finish(self) -> Result<Peer> {
        let mut peer = self.peer;
        peer.last_handshake_time = handshake_time(self.handshake_sec, self.handshake_nsec)?;
        Ok(peer)
    }

    fn apply(&mut self, k: &str, v: &str) -> Result<()> {
        let p = &mut self.peer;
        match k {
            "preshared_key" => p.preshared_key = key(k, v)?,
            "endpoint" => p.endpoint = Some(parse_endpoint(v)?),
            "persistent_keepalive_interval" => {
                p.persistent_keepalive_interval = Duration::from_secs(number(k, v)?);
            }
            "last_handshake_time_sec" => self.handshake_sec = number(k, v)?,
            "last_handshake_time_nsec" => self.handshake_nsec = number(k, v)?,
            "tx_bytes" => p.transmit_bytes = number(k, v)?,
            "rx_bytes" => p.receive_bytes = number(k, v)?,
            "allowed_ip" => {
                let ip: IpNet = v
                    .parse()
                    .map_err(|e| WgError::decode(format!("allowed_ip={v}: {e}")))?;
                p.allowed_ips.push(ip);
            }
            "protocol_version" => p.protocol_version = number(k, v)?,
            _ => {}
        }
        Ok(())
    }
}

/// Decodes a `get` response into a device called `name`.
///
/// The device public key is derived from its private key.
pub fn parse_get_response(name: &str, response: &str) -> Result<Device> {
    let mut device = Device {
        name: name.to_owned(),
        device_type: DeviceType::Userspace,
        ..Device::default()
    };
    let mut current: Option<PendingPeer> = None;
    let mut code = None;

    for pair in pairs(response) {
        let (k, v) = pair?;

        match k {
            "errno" => {
                code = Some(number(k, v)?);
                continue;
            }
            "public_key" => {
                if let Some(done) = current.take() {
                    device.peers.push(done.finish()?);
                }
                current = Some(PendingPeer {
                    peer: Peer::new(key(k, v)?),
                    ..PendingPeer::default()
                });
                continue;
            }
            _ => {}
        }

        match current.as_mut() {
            Some(peer) => peer.apply(k, v)?,
            None => match k {
                "private_key" => device.private_key = key(k, v)?,
                "listen_port" => device.listen_port = number(k, v)?,
                "fwmark" => device.firewall_mark = number(k, v)?,
                _ => {}
            },
        }
    }

    if let Some(done) = current {
        device.peers.push(done.finish()?);
    }

    errno("get", code)?;

    if !device.private_key.is_zero() {
        device.public_key = device.private_key.public_key();
    }
    Ok(device)
}

/// Parses `a.b.c.d:port` or `[v6%zone]:port`.
///
/// A numeric zone becomes the scope ID; named zones are dropped.
pub fn parse_endpoint(s: &str) -> Result<SocketAddr> {
    let bad = || WgError::decode(format!("invalid endpoint: {s}"));

    if let Some(rest) = s.strip_prefix('[') {
        let (host, port) = rest.split_once("]:").ok_or_else(bad)?;
        let (addr, zone) = host.split_once('%').unwrap_or((host, ""));
        let ip: Ipv6Addr = addr.parse().map_err(|_| bad())?;
        let port: u16 = port.parse().map_err(|_| bad())?;
        let scope = zone.parse().unwrap_or(0);
        return Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, scope)));
    }

    s.parse().map_err(|_| bad())
}
