//! Cluster state-message types and payload codecs.
//!
//! A decrypted frame body is `<u16 from><u16 to>` followed by sub-messages
//! of the form `<u16 length-including-type><u8 type><payload>`. Types are a
//! closed enumeration; unknown discriminants are skipped using the length
//! prefix. All payload layouts here are fixed big-endian structures.

use crate::endpoint::Endpoint;
use crate::error::WireError;
use crate::identity::{PeerAddr, PeerIdentity};
use crate::wire::{Reader, Writer};
use std::fmt;
use std::net::IpAddr;

/// Sub-message types carried between cluster members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateMessageType {
    /// Member heartbeat: location, load, and reachable endpoints
    Alive = 1,
    /// "I own end-peer P" affinity announcement
    HavePeer = 2,
    /// Multicast subscription replication
    MulticastLike = 3,
    /// Network membership credential (reserved, skipped on receipt)
    Com = 4,
    /// NAT hole-punch coordination request
    ProxyUnite = 5,
    /// "Send this end-peer packet on my behalf"
    ProxySend = 6,
}

impl StateMessageType {
    /// Decode a discriminant; `None` means "skip this sub-message".
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Alive),
            2 => Some(Self::HavePeer),
            3 => Some(Self::MulticastLike),
            4 => Some(Self::Com),
            5 => Some(Self::ProxyUnite),
            6 => Some(Self::ProxySend),
            _ => None,
        }
    }
}

/// End-peer packet verb, passed through opaquely except for RENDEZVOUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Verb(pub u8);

impl Verb {
    /// NAT-traversal hint verb.
    pub const RENDEZVOUS: Verb = Verb(0x05);
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// A fully formed packet bound for an end-peer, handed to the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    /// Destination end-peer.
    pub dest: PeerAddr,
    /// Source address (the shared cluster identity).
    pub source: PeerAddr,
    /// Packet verb.
    pub verb: Verb,
    /// Verb-specific payload.
    pub payload: Vec<u8>,
}

/// A layer-2 multicast group within a virtual network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulticastGroup {
    /// Group MAC address.
    pub mac: [u8; 6],
    /// Additional distinguishing information (e.g. IP for broadcast-like
    /// groups).
    pub adi: u32,
}

impl fmt::Display for MulticastGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.mac;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}/{:08x}",
            m[0], m[1], m[2], m[3], m[4], m[5], self.adi
        )
    }
}

/// ALIVE heartbeat payload.
///
/// Wire form: 7 reserved version bytes, `<i32 x><i32 y><i32 z>`, 8-byte
/// sender clock (unused), `<u64 load>`, 8-byte flags (unused), then
/// `<u8 n>` endpoints. Nil endpoints in the list are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Alive {
    /// Reported X coordinate (0 with y=z=0 means unknown).
    pub x: i32,
    /// Reported Y coordinate.
    pub y: i32,
    /// Reported Z coordinate.
    pub z: i32,
    /// Opaque load metric.
    pub load: u64,
    /// Endpoints peers can be redirected to.
    pub endpoints: Vec<Endpoint>,
}

impl Alive {
    /// Append the wire form.
    ///
    /// The endpoint list is truncated at 255 entries to fit the count
    /// byte.
    pub fn write(&self, now_ms: u64, w: &mut Writer<'_>) {
        w.put_u16(crate::VERSION_MAJOR);
        w.put_u16(crate::VERSION_MINOR);
        w.put_u16(crate::VERSION_REVISION);
        w.put_u8(crate::PROTOCOL_VERSION);
        w.put_i32(self.x);
        w.put_i32(self.y);
        w.put_i32(self.z);
        w.put_u64(now_ms);
        w.put_u64(self.load);
        w.put_u64(0); // reserved flags
        let endpoints = &self.endpoints[..self.endpoints.len().min(255)];
        w.put_u8(endpoints.len() as u8);
        for ep in endpoints {
            ep.write(w);
        }
    }

    /// Decode a heartbeat, skipping the reserved fields.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] from a truncated or malformed payload.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        r.skip(7)?; // version preamble
        let x = r.read_i32()?;
        let y = r.read_i32()?;
        let z = r.read_i32()?;
        r.skip(8)?; // sender clock, unused
        let load = r.read_u64()?;
        r.skip(8)?; // flags, unused
        let n = r.read_u8()?;
        let mut endpoints = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            if let Some(ep) = Endpoint::read(r)? {
                endpoints.push(ep);
            }
        }
        Ok(Self {
            x,
            y,
            z,
            load,
            endpoints,
        })
    }
}

/// HAVE_PEER payload: a peer identity and the endpoint it was seen at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HavePeer {
    /// The announced peer.
    pub identity: PeerIdentity,
    /// Where the announcing member reaches it (may be nil on the wire).
    pub endpoint: Option<Endpoint>,
}

impl HavePeer {
    /// Append the wire form.
    pub fn write(&self, w: &mut Writer<'_>) {
        self.identity.write(w);
        match &self.endpoint {
            Some(ep) => ep.write(w),
            None => Endpoint::write_nil(w),
        }
    }

    /// Decode the payload.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] from a truncated or malformed payload.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let identity = PeerIdentity::read(r)?;
        let endpoint = Endpoint::read(r)?;
        Ok(Self { identity, endpoint })
    }
}

/// MULTICAST_LIKE payload: a subscription to replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastLike {
    /// Virtual network ID.
    pub nwid: u64,
    /// Subscribing end-peer.
    pub peer: PeerAddr,
    /// The group subscribed to.
    pub group: MulticastGroup,
}

impl MulticastLike {
    /// Append the wire form.
    pub fn write(&self, w: &mut Writer<'_>) {
        w.put_u64(self.nwid);
        self.peer.write(w);
        w.put_bytes(&self.group.mac);
        w.put_u32(self.group.adi);
    }

    /// Decode the payload.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] from a truncated payload.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let nwid = r.read_u64()?;
        let peer = PeerAddr::read(r)?;
        let mac_bytes = r.read_bytes(6)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(mac_bytes);
        let adi = r.read_u32()?;
        Ok(Self {
            nwid,
            peer,
            group: MulticastGroup { mac, adi },
        })
    }
}

/// PROXY_UNITE payload: "help end-peers talk directly".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyUnite {
    /// The peer homed on the receiving member.
    pub local_peer: PeerAddr,
    /// The peer homed on the requesting member.
    pub remote_peer: PeerAddr,
    /// Candidate endpoints for the remote peer (at most 255).
    pub endpoints: Vec<Endpoint>,
}

impl ProxyUnite {
    /// Append the wire form.
    pub fn write(&self, w: &mut Writer<'_>) {
        self.local_peer.write(w);
        self.remote_peer.write(w);
        let endpoints = &self.endpoints[..self.endpoints.len().min(255)];
        w.put_u8(endpoints.len() as u8);
        for ep in endpoints {
            ep.write(w);
        }
    }

    /// Decode the payload.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] from a truncated or malformed payload.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let local_peer = PeerAddr::read(r)?;
        let remote_peer = PeerAddr::read(r)?;
        let n = r.read_u8()?;
        let mut endpoints = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            if let Some(ep) = Endpoint::read(r)? {
                endpoints.push(ep);
            }
        }
        Ok(Self {
            local_peer,
            remote_peer,
            endpoints,
        })
    }
}

/// PROXY_SEND payload: an end-peer packet to emit from the shared
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySend {
    /// Destination end-peer.
    pub recipient: PeerAddr,
    /// Packet verb.
    pub verb: Verb,
    /// Verb payload.
    pub payload: Vec<u8>,
}

impl ProxySend {
    /// Append the wire form.
    pub fn write(&self, w: &mut Writer<'_>) {
        self.recipient.write(w);
        w.put_u8(self.verb.0);
        w.put_u16(self.payload.len() as u16);
        w.put_bytes(&self.payload);
    }

    /// Decode the payload.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] from a truncated payload.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let recipient = PeerAddr::read(r)?;
        let verb = Verb(r.read_u8()?);
        let len = r.read_u16()?;
        let payload = r.read_bytes(usize::from(len))?.to_vec();
        Ok(Self {
            recipient,
            verb,
            payload,
        })
    }
}

/// RENDEZVOUS packet payload: tells one end-peer where to find another.
///
/// Wire form: `<u8 flags=0><5B peer><u16 port><u8 addr-len><addr>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendezvous {
    /// The peer to rendezvous with.
    pub peer: PeerAddr,
    /// That peer's reachable IP.
    pub ip: IpAddr,
    /// That peer's reachable port.
    pub port: u16,
}

impl Rendezvous {
    /// Build a rendezvous hint toward `endpoint`.
    #[must_use]
    pub fn new(peer: PeerAddr, endpoint: &Endpoint) -> Self {
        Self {
            peer,
            ip: endpoint.ip(),
            port: endpoint.port(),
        }
    }

    /// Append the wire form.
    pub fn write(&self, w: &mut Writer<'_>) {
        w.put_u8(0); // flags
        self.peer.write(w);
        w.put_u16(self.port);
        match self.ip {
            IpAddr::V4(ip) => {
                w.put_u8(4);
                w.put_bytes(&ip.octets());
            }
            IpAddr::V6(ip) => {
                w.put_u8(16);
                w.put_bytes(&ip.octets());
            }
        }
    }

    /// Decode the payload.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] from a truncated payload or an address length
    /// other than 4 or 16.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        r.skip(1)?; // flags
        let peer = PeerAddr::read(r)?;
        let port = r.read_u16()?;
        let addr_len = r.read_u8()?;
        let ip = match addr_len {
            4 => {
                let b = r.read_bytes(4)?;
                IpAddr::from([b[0], b[1], b[2], b[3]])
            }
            16 => {
                let b = r.read_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                IpAddr::from(octets)
            }
            other => return Err(WireError::InvalidEndpointTag(other)),
        };
        Ok(Self { peer, ip, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn ep(s: &str) -> Endpoint {
        s.parse::<SocketAddr>().unwrap().into()
    }

    #[test]
    fn test_type_discriminants_are_closed() {
        for v in 0u8..=255 {
            match StateMessageType::from_u8(v) {
                Some(t) => assert_eq!(t as u8, v),
                None => assert!(!(1..=6).contains(&v)),
            }
        }
    }

    #[test]
    fn test_alive_roundtrip() {
        let alive = Alive {
            x: 10,
            y: -20,
            z: 30,
            load: 0x1122_3344_5566_7788,
            endpoints: vec![ep("1.2.3.4:9993"), ep("[fd00::1]:9993")],
        };
        let mut buf = Vec::new();
        alive.write(1_000_000, &mut Writer::new(&mut buf));

        let mut r = Reader::new(&buf);
        assert_eq!(Alive::read(&mut r).unwrap(), alive);
        assert!(r.is_empty());
    }

    #[test]
    fn test_alive_skips_nil_endpoints() {
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf);
            Alive {
                endpoints: vec![],
                ..Alive::default()
            }
            .write(0, &mut w);
        }
        // Rewrite the count and append one nil and one real endpoint.
        let count_at = buf.len() - 1;
        buf[count_at] = 2;
        {
            let mut w = Writer::new(&mut buf);
            Endpoint::write_nil(&mut w);
            ep("5.6.7.8:1").write(&mut w);
        }

        let parsed = Alive::read(&mut Reader::new(&buf)).unwrap();
        assert_eq!(parsed.endpoints, vec![ep("5.6.7.8:1")]);
    }

    #[test]
    fn test_have_peer_roundtrip() {
        let hp = HavePeer {
            identity: PeerIdentity::new(PeerAddr::from_u64(0xabcdef0102), [9u8; 32]),
            endpoint: Some(ep("5.6.7.8:9993")),
        };
        let mut buf = Vec::new();
        hp.write(&mut Writer::new(&mut buf));
        assert_eq!(HavePeer::read(&mut Reader::new(&buf)).unwrap(), hp);
    }

    #[test]
    fn test_multicast_like_roundtrip() {
        let ml = MulticastLike {
            nwid: 0x8056_c2e2_1c00_0001,
            peer: PeerAddr::from_u64(0x99),
            group: MulticastGroup {
                mac: [0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
                adi: 0x0a00_0001,
            },
        };
        let mut buf = Vec::new();
        ml.write(&mut Writer::new(&mut buf));
        assert_eq!(buf.len(), 8 + 5 + 6 + 4);
        assert_eq!(MulticastLike::read(&mut Reader::new(&buf)).unwrap(), ml);
    }

    #[test]
    fn test_proxy_unite_roundtrip() {
        let pu = ProxyUnite {
            local_peer: PeerAddr::from_u64(1),
            remote_peer: PeerAddr::from_u64(2),
            endpoints: vec![ep("[fd00::2]:2"), ep("9.9.9.9:9")],
        };
        let mut buf = Vec::new();
        pu.write(&mut Writer::new(&mut buf));
        assert_eq!(ProxyUnite::read(&mut Reader::new(&buf)).unwrap(), pu);
    }

    #[test]
    fn test_proxy_send_roundtrip() {
        let ps = ProxySend {
            recipient: PeerAddr::from_u64(0x42),
            verb: Verb::RENDEZVOUS,
            payload: b"hole punch hint".to_vec(),
        };
        let mut buf = Vec::new();
        ps.write(&mut Writer::new(&mut buf));
        assert_eq!(ProxySend::read(&mut Reader::new(&buf)).unwrap(), ps);
    }

    #[test]
    fn test_rendezvous_roundtrip_v4_and_v6() {
        for s in ["9.9.9.9:9", "[fd00::2]:2"] {
            let endpoint = ep(s);
            let rv = Rendezvous::new(PeerAddr::from_u64(7), &endpoint);
            let mut buf = Vec::new();
            rv.write(&mut Writer::new(&mut buf));
            let parsed = Rendezvous::read(&mut Reader::new(&buf)).unwrap();
            assert_eq!(parsed, rv);
            assert_eq!(parsed.ip, endpoint.ip());
            assert_eq!(parsed.port, endpoint.port());
        }
    }

    #[test]
    fn test_truncated_payloads_error() {
        assert!(Alive::read(&mut Reader::new(&[0u8; 10])).is_err());
        assert!(HavePeer::read(&mut Reader::new(&[0u8; 4])).is_err());
        assert!(MulticastLike::read(&mut Reader::new(&[0u8; 12])).is_err());
        assert!(ProxyUnite::read(&mut Reader::new(&[0u8; 9])).is_err());
        assert!(ProxySend::read(&mut Reader::new(&[0u8; 5])).is_err());
        assert!(Rendezvous::read(&mut Reader::new(&[0u8; 7])).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_alive_read_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
                let _ = Alive::read(&mut Reader::new(&data));
            }

            #[test]
            fn prop_unite_read_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
                let _ = ProxyUnite::read(&mut Reader::new(&data));
            }
        }
    }
}
