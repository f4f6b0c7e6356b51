//! External collaborator interfaces.
//!
//! The cluster core never owns I/O, peer state, or a clock; it reaches
//! every surrounding subsystem through the traits here, handed in at
//! construction. This also breaks the cycle with the switch and topology,
//! which call back into the cluster: both sides hold trait handles, not
//! each other.
//!
//! All callbacks are invoked synchronously, sometimes while a member lock
//! is held (noted per trait); implementations must not block and must not
//! re-enter the cluster in a way that re-acquires a held member lock.

use crate::endpoint::Endpoint;
use crate::identity::{PeerAddr, PeerIdentity};
use crate::member::MemberId;
use crate::message::{MulticastGroup, OutboundPacket};
use std::sync::Arc;

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    /// Current monotonic time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Delivers sealed frames to other cluster members.
///
/// The transport between members (UDP, TCP, a queue) is the host's
/// business; the core only hands over finished frames.
pub trait FrameSender: Send + Sync {
    /// Ship one sealed frame to `to`.
    ///
    /// Called with that member's lock held; must not block.
    fn send_frame(&self, to: MemberId, frame: &[u8]);
}

/// The packet switch that talks to end-peers.
pub trait Switch: Send + Sync {
    /// Emit a fully formed end-peer packet.
    ///
    /// May be called with a member lock held; must not block.
    fn send(&self, packet: OutboundPacket);
}

/// A peer's best active direct endpoints, one per address family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveEndpoints {
    /// Best active IPv4 endpoint, if any.
    pub v4: Option<Endpoint>,
    /// Best active IPv6 endpoint, if any.
    pub v6: Option<Endpoint>,
}

/// The topology/peer database.
pub trait Topology: Send + Sync {
    /// Best active endpoints for a locally known peer; `None` when the
    /// peer is unknown here.
    fn peer_endpoints(&self, peer: PeerAddr, now_ms: u64) -> Option<ActiveEndpoints>;

    /// Drop any locally known path to `peer` at `endpoint` (another
    /// member is now authoritative for it).
    fn forget_path(&self, peer: PeerAddr, endpoint: &Endpoint);

    /// Persist a peer identity learned from another member.
    fn save_identity(&self, identity: &PeerIdentity);

    /// Visit every peer that currently has a direct path, with that
    /// path's address.
    fn for_each_direct_peer(&self, f: &mut dyn FnMut(&PeerIdentity, &Endpoint));

    /// Number of active local peers, for status reporting.
    fn active_peer_count(&self) -> u32;
}

/// Multicast group membership tracking.
pub trait MulticastDirectory: Send + Sync {
    /// Record that `peer` subscribed to `group` on network `nwid`.
    fn add_subscription(&self, now_ms: u64, nwid: u64, group: &MulticastGroup, peer: PeerAddr);
}

/// Raw wire output toward end-peers, bypassing the member queues.
///
/// Used by the relay path: the datagram is already a sealed end-peer
/// packet and goes out the peer-facing transport, not the cluster one.
pub trait WireOutput: Send + Sync {
    /// Send `data` to `to` on the peer-facing transport.
    fn put_packet(&self, to: &Endpoint, data: &[u8]);
}

/// Maps a physical address to integer Cartesian coordinates.
///
/// Lookups may be lazy: `None` means "no data yet", and the core will
/// simply ask again on a later connection attempt.
pub trait Geolocator: Send + Sync {
    /// Locate `endpoint`, if data is available.
    fn locate(&self, endpoint: &Endpoint) -> Option<(i32, i32, i32)>;
}

/// Bundle of collaborator handles handed to the cluster at construction.
#[derive(Clone)]
pub struct ClusterEnv {
    /// Monotonic clock.
    pub clock: Arc<dyn Clock>,
    /// Inter-member frame transport.
    pub sender: Arc<dyn FrameSender>,
    /// End-peer packet switch.
    pub switch: Arc<dyn Switch>,
    /// Topology/peer database.
    pub topology: Arc<dyn Topology>,
    /// Multicast subscription tracking.
    pub multicast: Arc<dyn MulticastDirectory>,
    /// Peer-facing wire output for relayed datagrams.
    pub wire: Arc<dyn WireOutput>,
    /// Geolocation oracle; absent disables redirection and location
    /// announcements.
    pub geolocator: Option<Arc<dyn Geolocator>>,
}
