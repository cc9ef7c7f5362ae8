//! The generic netlink WireGuard backend.

use tracing::{debug, trace};
use wgctrl_types::{Backend, Config, Device, Result, WgError};

use crate::attr::{AttributeEncoder, Attributes};
use crate::configure::{build_batches, config_attrs};
use crate::consts::{
    CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_CMD_GETFAMILY, CTRL_VERSION, ENODEV, ENOENT,
    EOPNOTSUPP, GENL_ID_CTRL, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, RTM_GETLINK, RTM_NEWLINK,
    WG_CMD_GET_DEVICE, WG_CMD_SET_DEVICE, WG_GENL_NAME, WG_GENL_VERSION, WGDEVICE_A_IFNAME,
};
use crate::message::{GenlMessage, Message};
use crate::parse::parse_device;
use crate::rtnl::{link_dump_request, wireguard_link_name};

/// A request/response channel speaking one netlink protocol.
pub trait Transport: Send {
    /// Sends one request with message type `kind` and returns every data
    /// message of the reply. `flags` must include `NLM_F_REQUEST`.
    fn execute(&mut self, kind: u16, flags: u16, payload: Vec<u8>) -> Result<Vec<Message>>;

    /// Releases the channel. Later calls fail.
    fn close(&mut self) -> Result<()>;
}

/// Controls Linux kernel WireGuard devices over generic netlink.
///
/// Interfaces are discovered with an rtnetlink link dump on a second
/// channel, since the WireGuard family can only be queried by name.
#[derive(Debug)]
pub struct NetlinkClient<T> {
    genl: T,
    rtnl: T,
    family: u16,
}

impl<T: Transport> NetlinkClient<T> {
    /// Builds a client over existing channels, resolving the WireGuard
    /// family ID.
    ///
    /// Returns `Ok(None)` when the kernel has no WireGuard family registered.
    pub fn with_transports(mut genl: T, rtnl: T) -> Result<Option<Self>> {
        match resolve_family(&mut genl, WG_GENL_NAME) {
            Ok(family) => {
                debug!(family, "resolved WireGuard generic netlink family");
                Ok(Some(Self { genl, rtnl, family }))
            }
            Err(e) if is_errno(&e, ENOENT) => {
                debug!("WireGuard generic netlink family not registered");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// The resolved generic netlink family ID.
    #[must_use]
    pub fn family(&self) -> u16 {
        self.family
    }

    fn interfaces(&mut self) -> Result<Vec<String>> {
        let msgs = self.rtnl.execute(
            RTM_GETLINK,
            NLM_F_REQUEST | NLM_F_DUMP,
            link_dump_request(),
        )?;

        let mut names = Vec::new();
        for msg in msgs.iter().filter(|m| m.header.kind == RTM_NEWLINK) {
            if let Some(name) = wireguard_link_name(&msg.payload)? {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn execute(&mut self, command: u8, flags: u16, data: Vec<u8>) -> Result<Vec<Message>> {
        let req = GenlMessage {
            command,
            version: WG_GENL_VERSION,
            data,
        };
        self.genl
            .execute(self.family, flags, req.encode())
            .map_err(not_exist)
    }
}

#[cfg(target_os = "linux")]
impl NetlinkClient<crate::conn::Conn> {
    /// Opens netlink sockets and resolves the WireGuard family.
    ///
    /// Returns `Ok(None)` when the running kernel has no WireGuard support.
    pub fn open() -> Result<Option<Self>> {
        let genl = crate::conn::Conn::open(libc::NETLINK_GENERIC)?;
        let rtnl = crate::conn::Conn::open(libc::NETLINK_ROUTE)?;
        Self::with_transports(genl, rtnl)
    }
}

impl<T: Transport> Backend for NetlinkClient<T> {
    fn name(&self) -> &'static str {
        "netlink"
    }

    fn devices(&mut self) -> Result<Vec<Device>> {
        let names = self.interfaces()?;
        let mut devices = Vec::with_capacity(names.len());
        for name in names {
            match self.device(&name) {
                Ok(d) => devices.push(d),
                // Removed between the link dump and the query.
                Err(WgError::NotExist) => debug!(device = %name, "device vanished during listing"),
                Err(e) => return Err(e),
            }
        }
        Ok(devices)
    }

    fn device(&mut self, name: &str) -> Result<Device> {
        if name.is_empty() {
            return Err(WgError::NotExist);
        }

        let mut ae = AttributeEncoder::new();
        ae.string(WGDEVICE_A_IFNAME, name)?;

        let msgs = self.execute(WG_CMD_GET_DEVICE, NLM_F_REQUEST | NLM_F_DUMP, ae.finish())?;
        if msgs.is_empty() {
            return Err(WgError::NotExist);
        }

        let payloads = msgs
            .iter()
            .map(|m| GenlMessage::decode(&m.payload).map(|g| g.data))
            .collect::<Result<Vec<_>>>()?;

        trace!(device = %name, messages = payloads.len(), "decoding device dump");
        parse_device(&payloads)
    }

    fn configure_device(&mut self, name: &str, cfg: &Config) -> Result<()> {
        let batches = build_batches(cfg);
        debug!(device = %name, batches = batches.len(), "configuring device");

        // No rollback: a failure leaves earlier batches applied.
        for (i, batch) in batches.iter().enumerate() {
            let attrs = config_attrs(name, batch)?;
            self.execute(WG_CMD_SET_DEVICE, NLM_F_REQUEST | NLM_F_ACK, attrs)?;
            trace!(device = %name, batch = i, "batch acknowledged");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let genl = self.genl.close();
        let rtnl = self.rtnl.close();
        genl.and(rtnl)
    }
}

fn resolve_family<T: Transport>(genl: &mut T, name: &str) -> Result<u16> {
    let mut ae = AttributeEncoder::new();
    ae.string(CTRL_ATTR_FAMILY_NAME, name)?;
    let req = GenlMessage {
        command: CTRL_CMD_GETFAMILY,
        version: CTRL_VERSION,
        data: ae.finish(),
    };

    for msg in genl.execute(GENL_ID_CTRL, NLM_F_REQUEST, req.encode())? {
        let reply = GenlMessage::decode(&msg.payload)?;
        for attr in Attributes::new(&reply.data) {
            let attr = attr?;
            if attr.kind == CTRL_ATTR_FAMILY_ID {
                return attr.u16();
            }
        }
    }

    Err(WgError::decode(format!("family {name}: reply carries no ID")))
}

fn is_errno(err: &WgError, code: i32) -> bool {
    matches!(err, WgError::Io(e) if e.raw_os_error() == Some(code))
}

/// "No such device" and "not a WireGuard device" both mean another backend
/// may own the name.
fn not_exist(err: WgError) -> WgError {
    if is_errno(&err, ENODEV) || is_errno(&err, EOPNOTSUPP) {
        WgError::NotExist
    } else {
        err
    }
}
