//! Physical endpoint addresses and their wire encoding.
//!
//! An endpoint is one reachable IP/port of a cluster member or end-peer.
//! The wire form is a family tag (0 = nil, 4 = IPv4, 6 = IPv6) followed by
//! the raw address bytes and a big-endian port. Nil endpoints are legal on
//! the wire and decode to `None`.

use crate::error::WireError;
use crate::wire::{Reader, Writer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Wire tag for a nil (absent) endpoint.
pub const TAG_NIL: u8 = 0;
/// Wire tag for an IPv4 endpoint.
pub const TAG_IPV4: u8 = 4;
/// Wire tag for an IPv6 endpoint.
pub const TAG_IPV6: u8 = 6;

/// A reachable address of a cluster member or end-peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Wrap a socket address.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// The underlying socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// The IP part.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    /// The port part.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// True for IPv4 endpoints.
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        self.0.is_ipv4()
    }

    /// True for IPv6 endpoints.
    #[must_use]
    pub fn is_ipv6(&self) -> bool {
        self.0.is_ipv6()
    }

    /// True when both endpoints are in the same address family.
    ///
    /// Redirection only hands out endpoints the peer can actually reach
    /// from the family it connected over.
    #[must_use]
    pub fn same_family(&self, other: &Endpoint) -> bool {
        self.is_ipv4() == other.is_ipv4()
    }

    /// Append the wire encoding.
    pub fn write(&self, w: &mut Writer<'_>) {
        match self.0.ip() {
            IpAddr::V4(ip) => {
                w.put_u8(TAG_IPV4);
                w.put_bytes(&ip.octets());
            }
            IpAddr::V6(ip) => {
                w.put_u8(TAG_IPV6);
                w.put_bytes(&ip.octets());
            }
        }
        w.put_u16(self.0.port());
    }

    /// Append the wire encoding of an absent endpoint.
    pub fn write_nil(w: &mut Writer<'_>) {
        w.put_u8(TAG_NIL);
    }

    /// Decode one endpoint; `None` for the nil tag.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` on a short buffer,
    /// `WireError::InvalidEndpointTag` on an unknown family tag.
    pub fn read(r: &mut Reader<'_>) -> Result<Option<Self>, WireError> {
        match r.read_u8()? {
            TAG_NIL => Ok(None),
            TAG_IPV4 => {
                let b = r.read_bytes(4)?;
                let ip = Ipv4Addr::new(b[0], b[1], b[2], b[3]);
                let port = r.read_u16()?;
                Ok(Some(Self(SocketAddr::from((ip, port)))))
            }
            TAG_IPV6 => {
                let b = r.read_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                let ip = Ipv6Addr::from(octets);
                let port = r.read_u16()?;
                Ok(Some(Self(SocketAddr::from((ip, port)))))
            }
            tag => Err(WireError::InvalidEndpointTag(tag)),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> Endpoint {
        s.parse::<SocketAddr>().unwrap().into()
    }

    #[test]
    fn test_ipv4_roundtrip() {
        let e = ep("1.2.3.4:9993");
        let mut buf = Vec::new();
        e.write(&mut Writer::new(&mut buf));
        assert_eq!(buf.len(), 1 + 4 + 2);
        assert_eq!(buf[0], TAG_IPV4);

        let mut r = Reader::new(&buf);
        assert_eq!(Endpoint::read(&mut r).unwrap(), Some(e));
        assert!(r.is_empty());
    }

    #[test]
    fn test_ipv6_roundtrip() {
        let e = ep("[fd00::1]:443");
        let mut buf = Vec::new();
        e.write(&mut Writer::new(&mut buf));
        assert_eq!(buf.len(), 1 + 16 + 2);

        let mut r = Reader::new(&buf);
        assert_eq!(Endpoint::read(&mut r).unwrap(), Some(e));
    }

    #[test]
    fn test_nil_decodes_to_none() {
        let mut buf = Vec::new();
        Endpoint::write_nil(&mut Writer::new(&mut buf));
        let mut r = Reader::new(&buf);
        assert_eq!(Endpoint::read(&mut r).unwrap(), None);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut r = Reader::new(&[9u8]);
        assert_eq!(
            Endpoint::read(&mut r),
            Err(WireError::InvalidEndpointTag(9))
        );
    }

    #[test]
    fn test_truncated_address_rejected() {
        let mut r = Reader::new(&[TAG_IPV6, 0, 0, 0]);
        assert!(matches!(
            Endpoint::read(&mut r),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_family_matching() {
        let v4 = ep("10.0.0.1:1");
        let v6 = ep("[fd00::1]:1");
        assert!(v4.same_family(&ep("9.9.9.9:9")));
        assert!(v6.same_family(&ep("[fd00::2]:2")));
        assert!(!v4.same_family(&v6));
    }
}
