//! Listing WireGuard interfaces through an rtnetlink link dump.

use wgctrl_types::{Result, WgError};

use crate::attr::Attributes;
use crate::consts::{IFINFOMSG_LEN, IFLA_IFNAME, IFLA_INFO_KIND, IFLA_LINKINFO, WG_KIND};

/// Payload of an `RTM_GETLINK` dump request: a zeroed `ifinfomsg` matching
/// every link.
#[must_use]
pub fn link_dump_request() -> Vec<u8> {
    vec![0u8; IFINFOMSG_LEN]
}

/// Extracts the interface name from an `RTM_NEWLINK` payload if the link is
/// a WireGuard device.
pub fn wireguard_link_name(payload: &[u8]) -> Result<Option<String>> {
    let attrs = payload.get(IFINFOMSG_LEN..).ok_or_else(|| {
        WgError::decode(format!("ifinfomsg truncated: {} bytes", payload.len()))
    })?;

    let mut name = None;
    let mut is_wireguard = false;

    for attr in Attributes::new(attrs) {
        let attr = attr?;
        match attr.kind {
            IFLA_IFNAME => name = Some(attr.string()?),
            IFLA_LINKINFO => {
                for info in attr.nested_attrs() {
                    let info = info?;
                    if info.kind == IFLA_INFO_KIND && info.string()? == WG_KIND {
                        is_wireguard = true;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(name.filter(|_| is_wireguard))
}
