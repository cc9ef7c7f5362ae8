//! Netlink and generic netlink message framing.

use std::io;

use wgctrl_types::{Result, WgError};

use crate::consts::{
    GENL_HDRLEN, NLA_ALIGNTO, NLM_F_ACK, NLM_F_MULTI, NLMSG_DONE, NLMSG_ERROR, NLMSG_HDRLEN,
    NLMSG_NOOP,
};

const fn align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// The fixed `nlmsghdr` preceding every netlink message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Message type: a family ID or one of the `NLMSG_*` control types.
    pub kind: u16,
    /// `NLM_F_*` flags.
    pub flags: u16,
    /// Sequence number echoed back by the kernel.
    pub sequence: u32,
    /// Port ID of the sender.
    pub pid: u32,
}

/// A netlink message: header plus unparsed payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    /// Message header; the length is derived from the payload.
    pub header: Header,
    /// Payload following the header.
    pub payload: Vec<u8>,
}

impl Message {
    /// Serializes the message, computing `nlmsg_len`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = u32::try_from(NLMSG_HDRLEN + self.payload.len())
            .map_err(|_| WgError::InvalidArgument("netlink message too large".into()))?;

        let mut buf = Vec::with_capacity(align(len as usize));
        buf.extend_from_slice(&len.to_ne_bytes());
        buf.extend_from_slice(&self.header.kind.to_ne_bytes());
        buf.extend_from_slice(&self.header.flags.to_ne_bytes());
        buf.extend_from_slice(&self.header.sequence.to_ne_bytes());
        buf.extend_from_slice(&self.header.pid.to_ne_bytes());
        buf.extend_from_slice(&self.payload);
        buf.resize(align(buf.len()), 0);
        Ok(buf)
    }

    /// Splits a datagram into the messages it contains.
    pub fn decode_all(mut buf: &[u8]) -> Result<Vec<Self>> {
        let mut msgs = Vec::new();
        while !buf.is_empty() {
            if buf.len() < NLMSG_HDRLEN {
                return Err(WgError::decode(format!(
                    "netlink header truncated: {} bytes",
                    buf.len()
                )));
            }

            let word = |at: usize| u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
            let len = word(0) as usize;
            if len < NLMSG_HDRLEN || len > buf.len() {
                return Err(WgError::decode(format!(
                    "netlink message length {len} out of range ({} bytes left)",
                    buf.len()
                )));
            }

            msgs.push(Self {
                header: Header {
                    kind: u16::from_ne_bytes([buf[4], buf[5]]),
                    flags: u16::from_ne_bytes([buf[6], buf[7]]),
                    sequence: word(8),
                    pid: word(12),
                },
                payload: buf[NLMSG_HDRLEN..len].to_vec(),
            });

            buf = &buf[align(len).min(buf.len())..];
        }
        Ok(msgs)
    }

    /// Reads the signed error code leading an `NLMSG_ERROR` or `NLMSG_DONE`
    /// payload. A missing code is treated as success.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self.payload.get(..4) {
            Some(b) => i32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
            None => 0,
        }
    }
}

/// A generic netlink message: command, version and attribute payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenlMessage {
    /// Family-specific command.
    pub command: u8,
    /// Family version.
    pub version: u8,
    /// Attribute stream.
    pub data: Vec<u8>,
}

impl GenlMessage {
    /// Serializes the `genlmsghdr` and attributes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(GENL_HDRLEN + self.data.len());
        buf.push(self.command);
        buf.push(self.version);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parses a netlink payload as a generic netlink message.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < GENL_HDRLEN {
            return Err(WgError::decode(format!(
                "generic netlink header truncated: {} bytes",
                payload.len()
            )));
        }
        Ok(Self {
            command: payload[0],
            version: payload[1],
            data: payload[GENL_HDRLEN..].to_vec(),
        })
    }
}

/// Collects the replies to one request until the exchange is complete.
///
/// An exchange ends on an acknowledgement, on `NLMSG_DONE`, or after a
/// single non-multipart reply when no acknowledgement was requested.
/// Messages with a foreign sequence number are ignored.
#[derive(Debug)]
pub struct Replies {
    sequence: u32,
    ack: bool,
    msgs: Vec<Message>,
}

impl Replies {
    /// Starts collecting replies for a request sent with `sequence` and
    /// header `flags`.
    #[must_use]
    pub fn new(sequence: u32, flags: u16) -> Self {
        Self {
            sequence,
            ack: flags & NLM_F_ACK != 0,
            msgs: Vec::new(),
        }
    }

    /// Feeds one received datagram, returning `true` once the exchange is
    /// complete. A kernel error code ends the exchange with an error.
    pub fn feed(&mut self, datagram: &[u8]) -> Result<bool> {
        let mut complete = false;
        for msg in Message::decode_all(datagram)? {
            if msg.header.sequence != self.sequence {
                continue;
            }

            match msg.header.kind {
                NLMSG_NOOP => {}
                // An error message with code zero is an acknowledgement.
                NLMSG_ERROR => match msg.error_code() {
                    0 => return Ok(true),
                    code => return Err(errno(code)),
                },
                NLMSG_DONE => match msg.error_code() {
                    code if code < 0 => return Err(errno(code)),
                    _ => return Ok(true),
                },
                _ => {
                    let multi = msg.header.flags & NLM_F_MULTI != 0;
                    self.msgs.push(msg);
                    if !multi && !self.ack {
                        complete = true;
                    }
                }
            }
        }
        Ok(complete)
    }

    /// Returns the data messages collected so far.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.msgs
    }
}

fn errno(code: i32) -> WgError {
    io::Error::from_raw_os_error(code.saturating_abs()).into()
}
