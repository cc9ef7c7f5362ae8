//! Netlink attribute (TLV) encoding and decoding.
//!
//! Each attribute is a native-endian `u16` length (header included), a
//! native-endian `u16` type, the payload, then padding up to a 4 byte
//! boundary. Nested attributes carry another attribute stream as payload;
//! WireGuard uses nesting with index-typed children to express arrays.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use wgctrl_types::{Key, Result, WgError};

use crate::consts::{NLA_ALIGNTO, NLA_F_NESTED, NLA_HDRLEN, NLA_TYPE_MASK};

const fn align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// A single decoded attribute borrowing from the message buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attribute<'a> {
    /// Attribute type with the nested and byte-order flags stripped.
    pub kind: u16,
    /// Whether the sender flagged the payload as nested attributes.
    pub nested: bool,
    /// Raw payload, padding excluded.
    pub data: &'a [u8],
}

impl<'a> Attribute<'a> {
    fn fixed<const N: usize>(&self, what: &str) -> Result<[u8; N]> {
        self.data.try_into().map_err(|_| {
            WgError::decode(format!(
                "attribute {}: expected {N} byte {what}, got {} bytes",
                self.kind,
                self.data.len()
            ))
        })
    }

    /// Decodes a `u8` payload.
    pub fn u8(&self) -> Result<u8> {
        Ok(u8::from_ne_bytes(self.fixed("u8")?))
    }

    /// Decodes a native-endian `u16` payload.
    pub fn u16(&self) -> Result<u16> {
        Ok(u16::from_ne_bytes(self.fixed("u16")?))
    }

    /// Decodes a native-endian `u32` payload.
    pub fn u32(&self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.fixed("u32")?))
    }

    /// Decodes a native-endian `u64` payload.
    pub fn u64(&self) -> Result<u64> {
        Ok(u64::from_ne_bytes(self.fixed("u64")?))
    }

    /// Decodes a NUL-terminated string payload.
    pub fn string(&self) -> Result<String> {
        let raw = self.data.split(|&b| b == 0).next().unwrap_or_default();
        String::from_utf8(raw.to_vec())
            .map_err(|e| WgError::decode(format!("attribute {}: invalid string: {e}", self.kind)))
    }

    /// Decodes a 32 byte key payload.
    pub fn key(&self) -> Result<Key> {
        Ok(Key::from_array(self.fixed("key")?))
    }

    /// Decodes a raw `in_addr` or `in6_addr` payload.
    pub fn ip_addr(&self) -> Result<IpAddr> {
        match self.data.len() {
            4 => Ok(IpAddr::V4(Ipv4Addr::from(self.fixed::<4>("in_addr")?))),
            16 => Ok(IpAddr::V6(Ipv6Addr::from(self.fixed::<16>("in6_addr")?))),
            n => Err(WgError::decode(format!("unexpected IP address size: {n}"))),
        }
    }

    /// Iterates over the attributes nested in this payload.
    pub fn nested_attrs(&self) -> Attributes<'a> {
        Attributes::new(self.data)
    }
}

/// Iterator over an attribute stream.
///
/// Yields an error and then stops if the stream is truncated or a header
/// reports an impossible length.
#[derive(Clone, Debug)]
pub struct Attributes<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> Attributes<'a> {
    /// Creates an iterator over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Result<Attribute<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }

        if self.buf.len() < NLA_HDRLEN {
            self.failed = true;
            return Some(Err(WgError::decode(format!(
                "attribute header truncated: {} bytes left",
                self.buf.len()
            ))));
        }

        let len = usize::from(u16::from_ne_bytes([self.buf[0], self.buf[1]]));
        let raw_kind = u16::from_ne_bytes([self.buf[2], self.buf[3]]);

        if len < NLA_HDRLEN || len > self.buf.len() {
            self.failed = true;
            return Some(Err(WgError::decode(format!(
                "attribute length {len} out of range ({} bytes left)",
                self.buf.len()
            ))));
        }

        let attr = Attribute {
            kind: raw_kind & NLA_TYPE_MASK,
            nested: raw_kind & NLA_F_NESTED != 0,
            data: &self.buf[NLA_HDRLEN..len],
        };

        // The final attribute may omit its trailing padding.
        self.buf = &self.buf[align(len).min(self.buf.len())..];
        Some(Ok(attr))
    }
}

/// Builds an attribute stream.
#[derive(Clone, Debug, Default)]
pub struct AttributeEncoder {
    buf: Vec<u8>,
}

impl AttributeEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: u16, data: &[u8]) -> Result<()> {
        let len = u16::try_from(NLA_HDRLEN + data.len()).map_err(|_| {
            WgError::InvalidArgument(format!(
                "attribute {} payload of {} bytes exceeds netlink limit",
                kind & NLA_TYPE_MASK,
                data.len()
            ))
        })?;

        self.buf.extend_from_slice(&len.to_ne_bytes());
        self.buf.extend_from_slice(&kind.to_ne_bytes());
        self.buf.extend_from_slice(data);
        self.buf.resize(align(self.buf.len()), 0);
        Ok(())
    }

    /// Appends a raw byte payload.
    pub fn bytes(&mut self, kind: u16, data: &[u8]) -> Result<()> {
        self.push(kind, data)
    }

    /// Appends a NUL-terminated string.
    pub fn string(&mut self, kind: u16, s: &str) -> Result<()> {
        let mut data = Vec::with_capacity(s.len() + 1);
        data.extend_from_slice(s.as_bytes());
        data.push(0);
        self.push(kind, &data)
    }

    /// Appends a `u8`.
    pub fn u8(&mut self, kind: u16, v: u8) -> Result<()> {
        self.push(kind, &[v])
    }

    /// Appends a native-endian `u16`.
    pub fn u16(&mut self, kind: u16, v: u16) -> Result<()> {
        self.push(kind, &v.to_ne_bytes())
    }

    /// Appends a native-endian `u32`.
    pub fn u32(&mut self, kind: u16, v: u32) -> Result<()> {
        self.push(kind, &v.to_ne_bytes())
    }

    /// Appends a native-endian `u64`.
    pub fn u64(&mut self, kind: u16, v: u64) -> Result<()> {
        self.push(kind, &v.to_ne_bytes())
    }

    /// Appends a nested attribute whose children are written by `f`.
    pub fn nested<F>(&mut self, kind: u16, f: F) -> Result<()>
    where
        F: FnOnce(&mut AttributeEncoder) -> Result<()>,
    {
        let mut child = Self::new();
        f(&mut child)?;
        self.push(kind | NLA_F_NESTED, &child.buf)
    }

    /// Number of bytes encoded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Reports whether nothing has been encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the encoded stream.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn collect(buf: &[u8]) -> Vec<Attribute<'_>> {
        Attributes::new(buf)
            .collect::<Result<Vec<_>>>()
            .expect("valid attributes")
    }

    #[test]
    fn encodes_with_padding() {
        let mut ae = AttributeEncoder::new();
        ae.u8(1, 7).expect("u8");
        ae.u16(2, 0xabcd).expect("u16");

        let buf = ae.finish();
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[..2], &5u16.to_ne_bytes());
        assert_eq!(&buf[5..8], &[0, 0, 0]);

        let attrs = collect(&buf);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].u8().expect("u8"), 7);
        assert_eq!(attrs[1].u16().expect("u16"), 0xabcd);
    }

    #[test]
    fn string_is_nul_terminated() {
        let mut ae = AttributeEncoder::new();
        ae.string(2, "wg0").expect("string");
        let buf = ae.finish();

        let attrs = collect(&buf);
        assert_eq!(attrs[0].data, b"wg0\0");
        assert_eq!(attrs[0].string().expect("string"), "wg0");
    }

    #[test]
    fn nested_sets_flag_and_round_trips() {
        let mut ae = AttributeEncoder::new();
        ae.nested(8, |peers| {
            peers.nested(0, |peer| peer.u32(3, 1))?;
            peers.nested(1, |peer| peer.u32(3, 2))
        })
        .expect("nested");
        let buf = ae.finish();

        let outer = collect(&buf);
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].kind, 8);
        assert!(outer[0].nested);

        let children: Vec<_> = outer[0]
            .nested_attrs()
            .collect::<Result<Vec<_>>>()
            .expect("children");
        assert_eq!(children.iter().map(|a| a.kind).collect::<Vec<_>>(), vec![0, 1]);

        let flags: Vec<u32> = children
            .iter()
            .map(|c| {
                let inner = c.nested_attrs().next().expect("one").expect("valid");
                inner.u32().expect("u32")
            })
            .collect();
        assert_eq!(flags, vec![1, 2]);
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut ae = AttributeEncoder::new();
        let big = vec![0u8; usize::from(u16::MAX)];
        assert!(matches!(ae.bytes(1, &big), Err(WgError::InvalidArgument(_))));
    }

    #[test]
    fn last_attribute_padding_optional() {
        // len=5, type=1, one payload byte, no padding.
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u16.to_ne_bytes());
        buf.extend_from_slice(&1u16.to_ne_bytes());
        buf.push(9);

        let attrs = collect(&buf);
        assert_eq!(attrs[0].u8().expect("u8"), 9);
    }

    #[test_case(&[1, 0]; "short header")]
    #[test_case(&[2, 0, 1, 0]; "length below header")]
    #[test_case(&[9, 0, 1, 0, 0]; "length past end")]
    fn malformed_streams_fail(buf: &[u8]) {
        let mut it = Attributes::new(buf);
        assert!(matches!(it.next(), Some(Err(WgError::Decode(_)))));
        assert!(it.next().is_none());
    }

    #[test_case(2, "u8")]
    #[test_case(3, "u16")]
    #[test_case(5, "u32")]
    #[test_case(7, "u64")]
    #[test_case(31, "key")]
    fn wrong_width_is_decode_error(len: usize, accessor: &str) {
        let data = vec![0u8; len];
        let attr = Attribute {
            kind: 1,
            nested: false,
            data: &data,
        };
        let err = match accessor {
            "u8" => attr.u8().map(|_| ()),
            "u16" => attr.u16().map(|_| ()),
            "u32" => attr.u32().map(|_| ()),
            "u64" => attr.u64().map(|_| ()),
            _ => attr.key().map(|_| ()),
        };
        assert!(matches!(err, Err(WgError::Decode(_))));
    }

    #[test]
    fn ip_addr_dispatches_on_length() {
        let v4 = [192, 168, 1, 1];
        let attr = Attribute {
            kind: 2,
            nested: false,
            data: &v4,
        };
        assert_eq!(attr.ip_addr().expect("v4"), IpAddr::from(v4));

        let bad = [0u8; 5];
        let attr = Attribute {
            kind: 2,
            nested: false,
            data: &bad,
        };
        assert!(attr.ip_addr().is_err());
    }
}
