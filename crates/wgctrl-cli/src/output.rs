//! Output formatting for CLI commands.
//!
//! Devices print either in the layout of `wg show` or as JSON. Private and
//! preshared keys are replaced by `(hidden)` unless asked for.

use std::io::Write;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ipnet::IpNet;
use serde::Serialize;
use wgctrl::{Device, DeviceType, Key, Peer};

use crate::cli::Format;
use crate::error::CliError;

const HIDDEN: &str = "(hidden)";

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a value in the selected format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }
}

/// Types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value in human-readable form.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// A device as printed.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    /// Interface name.
    pub name: String,
    /// Implementation behind the device.
    pub device_type: DeviceType,
    /// Public key, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Private key, or `(hidden)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// UDP listen port.
    pub listen_port: u16,
    /// Firewall mark; zero when unset.
    pub firewall_mark: u32,
    /// Peers in backend order.
    pub peers: Vec<PeerView>,
}

/// A peer as printed.
#[derive(Debug, Clone, Serialize)]
pub struct PeerView {
    /// Public key.
    pub public_key: String,
    /// Preshared key, or `(hidden)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,
    /// Last known endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<SocketAddr>,
    /// Allowed IP prefixes.
    pub allowed_ips: Vec<IpNet>,
    /// Seconds since the epoch of the latest handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_handshake: Option<u64>,
    /// Bytes received.
    pub receive_bytes: u64,
    /// Bytes sent.
    pub transmit_bytes: u64,
    /// Keepalive interval in seconds; zero when off.
    pub persistent_keepalive: u64,
    /// Protocol version.
    pub protocol_version: u32,
}

fn secret(key: &Key, show: bool) -> Option<String> {
    match (key.is_zero(), show) {
        (true, _) => None,
        (false, true) => Some(key.to_base64()),
        (false, false) => Some(HIDDEN.to_owned()),
    }
}

impl DeviceView {
    /// Builds the printable form of `device`.
    #[must_use]
    pub fn new(device: &Device, show_keys: bool) -> Self {
        Self {
            name: device.name.clone(),
            device_type: device.device_type,
            public_key: (!device.public_key.is_zero()).then(|| device.public_key.to_base64()),
            private_key: secret(&device.private_key, show_keys),
            listen_port: device.listen_port,
            firewall_mark: device.firewall_mark,
            peers: device.peers.iter().map(|p| PeerView::new(p, show_keys)).collect(),
        }
    }
}

impl PeerView {
    /// Builds the printable form of `peer`.
    #[must_use]
    pub fn new(peer: &Peer, show_keys: bool) -> Self {
        Self {
            public_key: peer.public_key.to_base64(),
            preshared_key: secret(&peer.preshared_key, show_keys),
            endpoint: peer.endpoint,
            allowed_ips: peer.allowed_ips.clone(),
            latest_handshake: peer
                .last_handshake_time
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            receive_bytes: peer.receive_bytes,
            transmit_bytes: peer.transmit_bytes,
            persistent_keepalive: peer.persistent_keepalive_interval.as_secs(),
            protocol_version: peer.protocol_version,
        }
    }
}

impl TableDisplay for DeviceView {
    fn write_table<W: Write>(&self, w: &mut W) -> Result<(), CliError> {
        writeln!(w, "interface: {}", self.name)?;
        if let Some(key) = &self.public_key {
            writeln!(w, "  public key: {key}")?;
        }
        if let Some(key) = &self.private_key {
            writeln!(w, "  private key: {key}")?;
        }
        if self.listen_port != 0 {
            writeln!(w, "  listening port: {}", self.listen_port)?;
        }
        if self.firewall_mark != 0 {
            writeln!(w, "  fwmark: {:#x}", self.firewall_mark)?;
        }
        for peer in &self.peers {
            writeln!(w)?;
            peer.write_table(w)?;
        }
        Ok(())
    }
}

impl TableDisplay for PeerView {
    fn write_table<W: Write>(&self, w: &mut W) -> Result<(), CliError> {
        writeln!(w, "peer: {}", self.public_key)?;
        if let Some(key) = &self.preshared_key {
            writeln!(w, "  preshared key: {key}")?;
        }
        if let Some(endpoint) = self.endpoint {
            writeln!(w, "  endpoint: {endpoint}")?;
        }

        let ips: Vec<String> = self.allowed_ips.iter().map(ToString::to_string).collect();
        if ips.is_empty() {
            writeln!(w, "  allowed ips: (none)")?;
        } else {
            writeln!(w, "  allowed ips: {}", ips.join(", "))?;
        }

        if let Some(secs) = self.latest_handshake {
            let at = UNIX_EPOCH + Duration::from_secs(secs);
            let since = SystemTime::now().duration_since(at).unwrap_or_default();
            writeln!(w, "  latest handshake: {}", ago(since))?;
        }
        if self.receive_bytes != 0 || self.transmit_bytes != 0 {
            writeln!(
                w,
                "  transfer: {} received, {} sent",
                bytes(self.receive_bytes),
                bytes(self.transmit_bytes)
            )?;
        }
        if self.persistent_keepalive != 0 {
            writeln!(w, "  persistent keepalive: every {}", duration(self.persistent_keepalive))?;
        }
        Ok(())
    }
}

impl<T: TableDisplay> TableDisplay for Vec<T> {
    fn write_table<W: Write>(&self, w: &mut W) -> Result<(), CliError> {
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                writeln!(w)?;
            }
            item.write_table(w)?;
        }
        Ok(())
    }
}

/// "1 hour, 2 seconds", largest unit first, zero units left out.
fn duration(mut secs: u64) -> String {
    const UNITS: [(u64, &str); 5] = [
        (365 * 24 * 3600, "year"),
        (24 * 3600, "day"),
        (3600, "hour"),
        (60, "minute"),
        (1, "second"),
    ];

    let mut parts = Vec::new();
    for (size, unit) in UNITS {
        let n = secs / size;
        secs %= size;
        if n > 0 {
            parts.push(format!("{n} {unit}{}", if n == 1 { "" } else { "s" }));
        }
    }
    parts.join(", ")
}

fn ago(since: Duration) -> String {
    match since.as_secs() {
        0 => "Now".to_owned(),
        secs => format!("{} ago", duration(secs)),
    }
}

fn bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = UNITS[0];
    for &next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.2} {unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        let private = Key::from_array([1; 32]).clamped();
        Device {
            name: "wg0".into(),
            device_type: DeviceType::Userspace,
            private_key: private,
            public_key: private.public_key(),
            listen_port: 51820,
            firewall_mark: 0,
            peers: vec![Peer {
                public_key: Key::from_array([2; 32]),
                preshared_key: Key::from_array([3; 32]),
                endpoint: Some("192.0.2.1:51820".parse().expect("addr")),
                persistent_keepalive_interval: Duration::from_secs(25),
                receive_bytes: 2048,
                transmit_bytes: 100,
                allowed_ips: vec!["10.0.0.0/24".parse().expect("cidr")],
                ..Peer::default()
            }],
        }
    }

    fn render(value: &impl TableDisplay) -> String {
        let mut buf = Vec::new();
        value.write_table(&mut buf).expect("write");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn table_hides_secrets() {
        let out = render(&DeviceView::new(&device(), false));
        assert!(out.starts_with("interface: wg0\n"));
        assert!(out.contains("  private key: (hidden)\n"));
        assert!(out.contains("  preshared key: (hidden)\n"));
        assert!(out.contains("  listening port: 51820\n"));
        assert!(!out.contains("fwmark"));
        assert!(out.contains("  endpoint: 192.0.2.1:51820\n"));
        assert!(out.contains("  allowed ips: 10.0.0.0/24\n"));
        assert!(out.contains("  transfer: 2.00 KiB received, 100 B sent\n"));
        assert!(out.contains("  persistent keepalive: every 25 seconds\n"));
        assert!(!out.contains("latest handshake"));
    }

    #[test]
    fn show_keys_reveals_secrets() {
        let d = device();
        let view = DeviceView::new(&d, true);
        assert_eq!(view.private_key, Some(d.private_key.to_base64()));
        assert_eq!(view.peers[0].preshared_key, Some(d.peers[0].preshared_key.to_base64()));
    }

    #[test]
    fn json_omits_unset_keys() {
        let d = Device {
            name: "wg1".into(),
            ..Device::default()
        };
        let mut buf = Vec::new();
        OutputFormat::new(Format::Json)
            .write(&mut buf, &vec![DeviceView::new(&d, false)])
            .expect("write");
        let json: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(json[0]["name"], "wg1");
        assert!(json[0].get("private_key").is_none());
        assert!(json[0].get("public_key").is_none());
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(duration(1), "1 second");
        assert_eq!(duration(3661), "1 hour, 1 minute, 1 second");
        assert_eq!(duration(2 * 86_400 + 120), "2 days, 2 minutes");
        assert_eq!(ago(Duration::ZERO), "Now");
        assert_eq!(ago(Duration::from_secs(5)), "5 seconds ago");
    }

    #[test]
    fn byte_units() {
        assert_eq!(bytes(0), "0 B");
        assert_eq!(bytes(1536), "1.50 KiB");
        assert_eq!(bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(bytes(3 << 40), "3.00 TiB");
    }

    #[test]
    fn devices_separated_by_blank_line() {
        let a = DeviceView::new(&Device { name: "wg0".into(), ..Device::default() }, false);
        let b = DeviceView::new(&Device { name: "wg1".into(), ..Device::default() }, false);
        assert_eq!(render(&vec![a, b]), "interface: wg0\n\ninterface: wg1\n");
    }
}
