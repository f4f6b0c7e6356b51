//! The cluster coordination object.
//!
//! [`Cluster`] keeps every member informed of which end-peers each other
//! member currently handles, forwards traffic and NAT-traversal hints
//! between members, and steers connecting peers toward the geographically
//! closest member.
//!
//! There are no internal threads or timers. The host's switch and I/O
//! loops call [`Cluster::replicate_have_peer`],
//! [`Cluster::send_via_cluster`], and
//! [`Cluster::handle_incoming_state_message`]; the host's clock loop calls
//! [`Cluster::do_periodic_tasks`].
//!
//! ## Locking
//!
//! Three lock classes, acquired in this strict order:
//!
//! 1. the active-ID vector,
//! 2. one member record (holding the active-ID lock is permitted),
//! 3. the peer-affinity map (never held while acquiring the others).
//!
//! Outbound frames are sealed and handed to the
//! [`FrameSender`](crate::env::FrameSender) while the destination member's
//! lock is held; senders must not block.

use crate::affinity::PeerAffinities;
use crate::endpoint::Endpoint;
use crate::env::ClusterEnv;
use crate::error::WireError;
use crate::identity::{LocalIdentity, PeerAddr, PeerIdentity};
use crate::member::{MemberId, MemberState, MemberTable};
use crate::message::{
    Alive, HavePeer, MulticastGroup, MulticastLike, OutboundPacket, ProxySend, ProxyUnite,
    Rendezvous, StateMessageType, Verb,
};
use crate::status::{ClusterStatus, MemberStatus};
use crate::wire::{Reader, Writer};
use crate::{MAX_FRAME_LENGTH, MAX_MEMBERS, MAX_RELAY_PAYLOAD, QUEUE_PREFIX};
use meshgate_crypto::{frame, MasterSecret, MemberKey};
use std::sync::atomic::{AtomicU64, Ordering};

/// Baseline distance in offload mode: any qualifying member wins.
const OFFLOAD_BASELINE: f64 = 2_147_483_648.0;

/// Tunable timing parameters.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// A member whose last heartbeat is older than this is dead.
    pub cluster_timeout_ms: u64,
    /// Minimum interval between HAVE_PEER re-announcements of one peer.
    pub have_peer_announce_period_ms: u64,
    /// Affinity entries older than this no longer route relayed traffic.
    pub peer_activity_timeout_ms: u64,
    /// Endpoint-list cap in status snapshots.
    pub max_reported_endpoints: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_timeout_ms: 30_000,
            have_peer_announce_period_ms: 30_000,
            peer_activity_timeout_ms: 300_000,
            max_reported_endpoints: 16,
        }
    }
}

fn dist3d(a: (i32, i32, i32), b: (i32, i32, i32)) -> f64 {
    let dx = f64::from(b.0) - f64::from(a.0);
    let dy = f64::from(b.1) - f64::from(a.1);
    let dz = f64::from(b.2) - f64::from(a.2);
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Intra-cluster coordination core for one member.
///
/// Drops zeroize the master secret and every derived member key.
pub struct Cluster {
    env: ClusterEnv,
    config: ClusterConfig,
    id: MemberId,
    local_address: PeerAddr,
    endpoints: Vec<Endpoint>,
    location: (i32, i32, i32),
    master: MasterSecret,
    /// Our own inbound frame key, derived from our member ID.
    key: MemberKey,
    members: MemberTable,
    affinities: PeerAffinities,
    last_swept_affinities: AtomicU64,
    last_announced_peers: AtomicU64,
}

impl Cluster {
    /// Create the coordination core for member `id`.
    ///
    /// `endpoints` are this member's own reachable addresses, advertised
    /// in ALIVE announcements and handed to redirected peers. `location`
    /// is only announced when a geolocator is attached.
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside `[0, MAX_MEMBERS)`.
    #[must_use]
    pub fn new(
        env: ClusterEnv,
        config: ClusterConfig,
        identity: &LocalIdentity,
        id: MemberId,
        endpoints: Vec<Endpoint>,
        location: (i32, i32, i32),
    ) -> Self {
        assert!(usize::from(id) < MAX_MEMBERS, "member ID out of range");
        let master = identity.master_secret();
        let key = MemberKey::derive(&master, id);
        Self {
            env,
            config,
            id,
            local_address: identity.address(),
            endpoints,
            location,
            master,
            key,
            members: MemberTable::new(),
            affinities: PeerAffinities::new(),
            last_swept_affinities: AtomicU64::new(0),
            last_announced_peers: AtomicU64::new(0),
        }
    }

    /// This member's ID.
    #[must_use]
    pub fn id(&self) -> MemberId {
        self.id
    }

    // ------------------------------------------------------------------
    // Ingress
    // ------------------------------------------------------------------

    /// Decrypt, authenticate, and dispatch one frame from another member.
    ///
    /// Malformed or unauthenticated frames are traced and dropped; a bad
    /// sub-message is skipped via its length prefix and the rest of the
    /// frame still dispatches.
    pub fn handle_incoming_state_message(&self, msg: &[u8]) {
        if msg.len() < meshgate_crypto::FRAME_OVERHEAD || msg.len() > MAX_FRAME_LENGTH {
            tracing::trace!(len = msg.len(), "frame length out of bounds, discarding");
            return;
        }
        let body = match frame::open(&self.key, msg) {
            Ok(body) => body,
            Err(e) => {
                tracing::trace!(error = %e, "frame rejected");
                return;
            }
        };
        if body.len() < 4 {
            return;
        }
        let from = u16::from_be_bytes([body[0], body[1]]);
        let to = u16::from_be_bytes([body[2], body[3]]);
        if from == self.id {
            tracing::trace!("frame claims to be from ourselves, discarding");
            return;
        }
        if to != self.id {
            tracing::trace!(to, "frame not addressed to us, discarding");
            return;
        }
        if usize::from(from) >= MAX_MEMBERS || !self.members.is_active(from) {
            tracing::trace!(from, "frame from inactive member, discarding");
            return;
        }

        let now = self.env.clock.now_ms();
        let mut m = self.members.lock(from);
        let mut r = Reader::new(&body[4..]);
        while r.remaining() >= 2 {
            let Ok(mlen) = r.read_u16() else { break };
            let mlen = usize::from(mlen);
            if mlen > r.remaining() {
                tracing::trace!(from, "sub-message overruns frame, dropping remainder");
                break;
            }
            let Ok(sub) = r.read_bytes(mlen) else { break };
            if sub.is_empty() {
                continue;
            }
            let Some(mtype) = StateMessageType::from_u8(sub[0]) else {
                tracing::trace!(from, msg_type = sub[0], "unknown sub-message type, skipping");
                continue;
            };
            let result = match mtype {
                StateMessageType::Alive => self.handle_alive(&mut m, from, &sub[1..], now),
                StateMessageType::HavePeer => self.handle_have_peer(from, &sub[1..], now),
                StateMessageType::MulticastLike => {
                    self.handle_multicast_like(from, &sub[1..], now)
                }
                StateMessageType::Com => self.handle_com(from, &sub[1..]),
                StateMessageType::ProxyUnite => {
                    self.handle_proxy_unite(&mut m, from, &sub[1..], now)
                }
                StateMessageType::ProxySend => self.handle_proxy_send(from, &sub[1..]),
            };
            if let Err(e) = result {
                tracing::trace!(from, ?mtype, error = %e, "sub-message decode failed, skipping");
            }
        }
    }

    fn handle_alive(
        &self,
        m: &mut MemberState,
        from: MemberId,
        payload: &[u8],
        now: u64,
    ) -> Result<(), WireError> {
        let alive = Alive::read(&mut Reader::new(payload))?;
        tracing::trace!(from, "alive sender-clock and flags fields present, unused");
        let was_dead =
            now.saturating_sub(m.last_received_alive) >= self.config.cluster_timeout_ms;
        m.x = alive.x;
        m.y = alive.y;
        m.z = alive.z;
        m.load = alive.load;
        m.endpoints = alive.endpoints;
        m.last_received_alive = now;
        if was_dead {
            tracing::debug!(
                from,
                x = m.x,
                y = m.y,
                z = m.z,
                endpoints = ?m.endpoints,
                "member is alive, nearby peers can be redirected to it"
            );
        }
        Ok(())
    }

    fn handle_have_peer(
        &self,
        from: MemberId,
        payload: &[u8],
        now: u64,
    ) -> Result<(), WireError> {
        let hp = HavePeer::read(&mut Reader::new(payload))?;
        // The announcing member is now authoritative for this peer; drop
        // any path we hold to it at that address so members don't fight
        // over it.
        if let Some(ep) = &hp.endpoint {
            self.env.topology.forget_path(hp.identity.address(), ep);
        }
        self.env.topology.save_identity(&hp.identity);
        self.affinities.bind(hp.identity.address(), from, now);
        tracing::trace!(from, peer = %hp.identity.address(), "peer affinity rebound");
        Ok(())
    }

    fn handle_multicast_like(
        &self,
        from: MemberId,
        payload: &[u8],
        now: u64,
    ) -> Result<(), WireError> {
        let ml = MulticastLike::read(&mut Reader::new(payload))?;
        self.env
            .multicast
            .add_subscription(now, ml.nwid, &ml.group, ml.peer);
        tracing::trace!(from, peer = %ml.peer, group = %ml.group, nwid = ml.nwid, "multicast like");
        Ok(())
    }

    fn handle_com(&self, from: MemberId, _payload: &[u8]) -> Result<(), WireError> {
        // Reserved: replicated for forward compatibility, not decoded.
        tracing::trace!(from, "membership credential received, ignored");
        Ok(())
    }

    fn handle_proxy_unite(
        &self,
        m: &mut MemberState,
        from: MemberId,
        payload: &[u8],
        now: u64,
    ) -> Result<(), WireError> {
        let pu = ProxyUnite::read(&mut Reader::new(payload))?;
        tracing::trace!(
            from,
            local = %pu.local_peer,
            remote = %pu.remote_peer,
            "asked to unite local peer with remote peer"
        );
        if pu.endpoints.is_empty() {
            return Ok(());
        }
        let Some(local) = self.env.topology.peer_endpoints(pu.local_peer, now) else {
            return Ok(());
        };

        let remote_v4 = pu.endpoints.iter().find(|ep| ep.is_ipv4()).copied();
        let remote_v6 = pu.endpoints.iter().find(|ep| ep.is_ipv6()).copied();

        // Prefer an IPv6 pairing, fall back to IPv4, else give up.
        let (local_ep, remote_ep) = match (local.v6, remote_v6, local.v4, remote_v4) {
            (Some(l), Some(r), _, _) => (l, r),
            (_, _, Some(l), Some(r)) => (l, r),
            _ => return Ok(()),
        };

        // Tell the remote peer where our local peer is, relayed back
        // through the requesting member.
        let mut remote_hint = Vec::new();
        Rendezvous::new(pu.local_peer, &local_ep).write(&mut Writer::new(&mut remote_hint));
        let mut reply = Vec::new();
        ProxySend {
            recipient: pu.remote_peer,
            verb: Verb::RENDEZVOUS,
            payload: remote_hint,
        }
        .write(&mut Writer::new(&mut reply));
        self.enqueue(m, from, StateMessageType::ProxySend, &reply);
        // With port-restricted cone NATs success is timing-sensitive.
        self.flush_member(m, from);

        // Tell our local peer where the remote peer is, directly.
        let mut local_hint = Vec::new();
        Rendezvous::new(pu.remote_peer, &remote_ep).write(&mut Writer::new(&mut local_hint));
        self.env.switch.send(OutboundPacket {
            dest: pu.local_peer,
            source: self.local_address,
            verb: Verb::RENDEZVOUS,
            payload: local_hint,
        });
        Ok(())
    }

    fn handle_proxy_send(&self, from: MemberId, payload: &[u8]) -> Result<(), WireError> {
        let ps = ProxySend::read(&mut Reader::new(payload))?;
        tracing::trace!(
            from,
            recipient = %ps.recipient,
            verb = %ps.verb,
            len = ps.payload.len(),
            "proxy send"
        );
        self.env.switch.send(OutboundPacket {
            dest: ps.recipient,
            source: self.local_address,
            verb: ps.verb,
            payload: ps.payload,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Egress
    // ------------------------------------------------------------------

    /// Announce to the whole cluster that we now handle `identity`.
    ///
    /// Rate-limited per peer: a repeat announcement of a peer we already
    /// own within the announce period is a no-op. Taking a peer over from
    /// another member always announces.
    pub fn replicate_have_peer(&self, identity: &PeerIdentity, endpoint: &Endpoint) {
        let now = self.env.clock.now_ms();
        if !self.affinities.claim_local(
            identity.address(),
            self.id,
            now,
            self.config.have_peer_announce_period_ms,
        ) {
            return;
        }

        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf);
            identity.write(&mut w);
            endpoint.write(&mut w);
        }
        tracing::trace!(peer = %identity.address(), endpoint = %endpoint, "announcing peer");
        self.broadcast(StateMessageType::HavePeer, &buf);
    }

    /// Replicate a multicast subscription to every member.
    pub fn replicate_multicast_like(
        &self,
        nwid: u64,
        peer: PeerAddr,
        group: &MulticastGroup,
    ) {
        let mut buf = Vec::new();
        MulticastLike {
            nwid,
            peer,
            group: *group,
        }
        .write(&mut Writer::new(&mut buf));
        tracing::trace!(peer = %peer, group = %group, nwid, "replicating multicast like");
        self.broadcast(StateMessageType::MulticastLike, &buf);
    }

    /// Replicate a network membership credential to every member.
    ///
    /// The credential is opaque to the core; receivers skip it by length.
    pub fn replicate_certificate_of_network_membership(&self, com: &[u8]) {
        tracing::trace!(len = com.len(), "replicating membership credential");
        self.broadcast(StateMessageType::Com, com);
    }

    /// Relay a pre-formed end-peer datagram to whichever member handles
    /// `to`.
    ///
    /// Returns `true` iff another member has fresh affinity for `to`. If
    /// `unite` is set and `from` is known locally, the owning member is
    /// also asked to coordinate a direct NAT hole-punch between the two
    /// peers.
    pub fn send_via_cluster(
        &self,
        from: PeerAddr,
        to: PeerAddr,
        data: &[u8],
        unite: bool,
    ) -> bool {
        if data.len() > MAX_RELAY_PAYLOAD {
            return false;
        }
        let now = self.env.clock.now_ms();
        let owner = match self.affinities.get(to) {
            Some(pa)
                if pa.member != self.id
                    && usize::from(pa.member) < MAX_MEMBERS
                    && now.saturating_sub(pa.ts) < self.config.peer_activity_timeout_ms =>
            {
                pa.member
            }
            _ => {
                tracing::trace!(peer = %to, "no fresh remote affinity, cannot relay");
                return false;
            }
        };

        let mut unite_buf = Vec::new();
        if unite {
            if let Some(eps) = self.env.topology.peer_endpoints(from, now) {
                let count = u8::from(eps.v4.is_some()) + u8::from(eps.v6.is_some());
                if count > 0 {
                    let mut w = Writer::new(&mut unite_buf);
                    to.write(&mut w);
                    from.write(&mut w);
                    w.put_u8(count);
                    if let Some(ep) = eps.v4 {
                        ep.write(&mut w);
                    }
                    if let Some(ep) = eps.v6 {
                        ep.write(&mut w);
                    }
                }
            }
        }

        {
            let mut m = self.members.lock(owner);
            if !unite_buf.is_empty() {
                self.enqueue(&mut m, owner, StateMessageType::ProxyUnite, &unite_buf);
            }
            // The datagram is already a sealed end-peer packet: it goes
            // out the peer-facing wire, not the cluster transport.
            if let Some(ep) = m.endpoints.first() {
                self.env.wire.put_packet(ep, data);
            }
        }
        tracing::trace!(len = data.len(), from = %from, to = %to, via = owner, "relayed via cluster");
        true
    }

    // ------------------------------------------------------------------
    // Redirection
    // ------------------------------------------------------------------

    /// Find a geographically better member for a connecting peer.
    ///
    /// Returns an endpoint of the closest live, located member in the same
    /// address family as `peer_physical`, or `None` when no member beats
    /// us (or geolocation has no data yet). In `offload` mode any
    /// qualifying member wins regardless of our own distance.
    #[must_use]
    pub fn find_better_endpoint(
        &self,
        peer: PeerAddr,
        peer_physical: &Endpoint,
        offload: bool,
    ) -> Option<Endpoint> {
        let geolocator = self.env.geolocator.as_ref()?;
        let Some(peer_location) = geolocator.locate(peer_physical) else {
            // Lookups are lazy; this may succeed on a later attempt.
            tracing::trace!(endpoint = %peer_physical, "no geolocation data yet");
            return None;
        };

        let now = self.env.clock.now_ms();
        let current_distance = dist3d(self.location, peer_location);
        let mut best_distance = if offload {
            OFFLOAD_BASELINE
        } else {
            current_distance
        };
        let mut best_member = self.id;
        let mut best_endpoints: Vec<Endpoint> = Vec::new();
        {
            let active = self.members.active();
            for &mid in active.iter() {
                let m = self.members.lock(mid);
                let fresh = now.saturating_sub(m.last_received_alive)
                    < self.config.cluster_timeout_ms;
                if fresh && m.has_location() && !m.endpoints.is_empty() {
                    let d = dist3d((m.x, m.y, m.z), peer_location);
                    if d < best_distance {
                        best_distance = d;
                        best_member = mid;
                        best_endpoints = m.endpoints.clone();
                    }
                }
            }
        }

        let redirect = best_endpoints
            .iter()
            .find(|ep| ep.same_family(peer_physical))
            .copied();
        match &redirect {
            Some(ep) => tracing::debug!(
                peer = %peer,
                member = best_member,
                endpoint = %ep,
                current_distance,
                best_distance,
                "redirecting peer to closer member"
            ),
            None => tracing::trace!(peer = %peer, current_distance, "no better endpoint"),
        }
        redirect
    }

    // ------------------------------------------------------------------
    // Periodic tasks
    // ------------------------------------------------------------------

    /// Run housekeeping: affinity GC, the peer-announce sweep, ALIVE
    /// announcements, and queue flushing. Call on every host tick.
    pub fn do_periodic_tasks(&self) {
        let now = self.env.clock.now_ms();

        // Affinity GC, to bound the table.
        let gc_period = self.config.peer_activity_timeout_ms * 5;
        let last = self.last_swept_affinities.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= gc_period {
            self.last_swept_affinities.store(now, Ordering::Relaxed);
            let removed = self.affinities.sweep(now, gc_period);
            if removed > 0 {
                tracing::debug!(removed, "swept stale peer affinities");
            }
        }

        // Announce peers we hold direct paths to. Paths other members
        // claim were already forgotten on receipt, which keeps members
        // from flapping routes between each other.
        let announce_interval = self.config.have_peer_announce_period_ms / 4;
        let last = self.last_announced_peers.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= announce_interval {
            self.last_announced_peers.store(now, Ordering::Relaxed);
            self.env.topology.for_each_direct_peer(&mut |identity, endpoint| {
                self.replicate_have_peer(identity, endpoint);
            });
        }

        // ALIVE announcements and queue flushing, every tick.
        let alive_interval = (self.config.cluster_timeout_ms / 2).saturating_sub(1_000);
        let active = self.members.active();
        for &mid in active.iter() {
            let mut m = self.members.lock(mid);
            if now.saturating_sub(m.last_announced_alive_to) >= alive_interval {
                let (x, y, z) = if self.env.geolocator.is_some() {
                    self.location
                } else {
                    (0, 0, 0)
                };
                let alive = Alive {
                    x,
                    y,
                    z,
                    // TODO: report a real load average once the host exposes one
                    load: 0,
                    endpoints: self.endpoints.clone(),
                };
                let mut buf = Vec::new();
                alive.write(now, &mut Writer::new(&mut buf));
                self.enqueue(&mut m, mid, StateMessageType::Alive, &buf);
                m.last_announced_alive_to = now;
            }
            self.flush_member(&mut m, mid);
        }
    }

    // ------------------------------------------------------------------
    // Membership admin
    // ------------------------------------------------------------------

    /// Add a member, deriving its frame key and priming its queue.
    ///
    /// Out-of-range IDs, our own ID, and already-active IDs are ignored.
    pub fn add_member(&self, member_id: MemberId) {
        if usize::from(member_id) >= MAX_MEMBERS || member_id == self.id {
            return;
        }
        let mut active = self.members.active();
        if active.binary_search(&member_id).is_ok() {
            return;
        }
        {
            // Record fully re-primed before the ID becomes visible to the
            // fan-out paths.
            let mut m = self.members.lock(member_id);
            m.clear();
            m.key = MemberKey::derive(&self.master, member_id);
            m.prime_queue(self.id, member_id);
        }
        active.push(member_id);
        active.sort_unstable();
        tracing::debug!(member = member_id, "member added");
    }

    /// Remove a member from the active set.
    ///
    /// The slot's record is left dormant; the next `add_member` of the
    /// same ID reinitializes it.
    pub fn remove_member(&self, member_id: MemberId) {
        let mut active = self.members.active();
        active.retain(|&mid| mid != member_id);
        tracing::debug!(member = member_id, "member removed");
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Snapshot the cluster: ourselves first, then every active member.
    #[must_use]
    pub fn status(&self) -> ClusterStatus {
        let now = self.env.clock.now_ms();
        let cap = self.config.max_reported_endpoints;

        let mut members = Vec::with_capacity(1 + MAX_MEMBERS);
        members.push(MemberStatus {
            id: self.id,
            alive: true,
            ms_since_heartbeat: 0,
            x: self.location.0,
            y: self.location.1,
            z: self.location.2,
            load: 0,
            peers: self.env.topology.active_peer_count(),
            endpoints: self.endpoints.iter().take(cap).copied().collect(),
        });

        for mid in self.members.active_ids() {
            let m = self.members.lock(mid);
            let age = now.saturating_sub(m.last_received_alive);
            members.push(MemberStatus {
                id: mid,
                alive: age < self.config.cluster_timeout_ms,
                ms_since_heartbeat: age,
                x: m.x,
                y: m.y,
                z: m.z,
                load: m.load,
                peers: 0,
                endpoints: m.endpoints.iter().take(cap).copied().collect(),
            });
        }

        let counts = self.affinities.fresh_counts_by_member(
            now,
            self.config.peer_activity_timeout_ms,
            self.id,
        );
        for ms in members.iter_mut().skip(1) {
            ms.peers = counts[usize::from(ms.id)];
        }

        ClusterStatus {
            my_id: self.id,
            members,
        }
    }

    // ------------------------------------------------------------------
    // Outbound batching
    // ------------------------------------------------------------------

    /// Enqueue one sub-message to every active member.
    ///
    /// Takes the active-ID lock for the whole fan-out and each member's
    /// lock in turn, in that order.
    fn broadcast(&self, mtype: StateMessageType, payload: &[u8]) {
        let active = self.members.active();
        for &mid in active.iter() {
            let mut m = self.members.lock(mid);
            self.enqueue(&mut m, mid, mtype, payload);
        }
    }

    /// Append one sub-message to a member's queue, flushing first if it
    /// would not fit. Caller holds the member's lock.
    ///
    /// A sub-message too large for any frame is dropped; callers must
    /// size payloads.
    fn enqueue(
        &self,
        m: &mut MemberState,
        to: MemberId,
        mtype: StateMessageType,
        payload: &[u8],
    ) {
        if payload.len() + 3 > MAX_FRAME_LENGTH - QUEUE_PREFIX {
            tracing::trace!(to, ?mtype, len = payload.len(), "sub-message cannot fit a frame");
            return;
        }
        if m.q.len() < QUEUE_PREFIX && !m.prime_queue(self.id, to) {
            return;
        }
        if m.q.len() + payload.len() + 3 > MAX_FRAME_LENGTH {
            self.flush_member(m, to);
            if m.q.len() < QUEUE_PREFIX {
                return;
            }
        }
        m.q.extend_from_slice(&((payload.len() + 1) as u16).to_be_bytes());
        m.q.push(mtype as u8);
        m.q.extend_from_slice(payload);
    }

    /// Seal and ship a member's queue, then re-prime it. No-op when the
    /// queue holds nothing past the frame prefix. Caller holds the
    /// member's lock; the sender is invoked under it.
    fn flush_member(&self, m: &mut MemberState, to: MemberId) {
        if !m.queue_has_payload() {
            return;
        }
        match frame::seal_in_place(&m.key, &mut m.q) {
            Ok(()) => self.env.sender.send_frame(to, &m.q),
            Err(e) => tracing::warn!(to, error = %e, "failed to seal outbound frame"),
        }
        m.prime_queue(self.id, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ActiveEndpoints, Clock, FrameSender, Geolocator, MulticastDirectory,
        Switch, Topology, WireOutput};
    use std::sync::Arc;

    struct FixedClock(AtomicU64);
    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    struct NullSender;
    impl FrameSender for NullSender {
        fn send_frame(&self, _to: MemberId, _frame: &[u8]) {}
    }

    struct NullSwitch;
    impl Switch for NullSwitch {
        fn send(&self, _packet: OutboundPacket) {}
    }

    struct NullTopology;
    impl Topology for NullTopology {
        fn peer_endpoints(&self, _peer: PeerAddr, _now_ms: u64) -> Option<ActiveEndpoints> {
            None
        }
        fn forget_path(&self, _peer: PeerAddr, _endpoint: &Endpoint) {}
        fn save_identity(&self, _identity: &PeerIdentity) {}
        fn for_each_direct_peer(&self, _f: &mut dyn FnMut(&PeerIdentity, &Endpoint)) {}
        fn active_peer_count(&self) -> u32 {
            0
        }
    }

    struct NullMulticast;
    impl MulticastDirectory for NullMulticast {
        fn add_subscription(
            &self,
            _now_ms: u64,
            _nwid: u64,
            _group: &MulticastGroup,
            _peer: PeerAddr,
        ) {
        }
    }

    struct NullWire;
    impl WireOutput for NullWire {
        fn put_packet(&self, _to: &Endpoint, _data: &[u8]) {}
    }

    struct FixedGeo;
    impl Geolocator for FixedGeo {
        fn locate(&self, _endpoint: &Endpoint) -> Option<(i32, i32, i32)> {
            Some((0, 0, 0))
        }
    }

    fn test_cluster(id: MemberId) -> Cluster {
        let env = ClusterEnv {
            clock: Arc::new(FixedClock(AtomicU64::new(1_000_000))),
            sender: Arc::new(NullSender),
            switch: Arc::new(NullSwitch),
            topology: Arc::new(NullTopology),
            multicast: Arc::new(NullMulticast),
            wire: Arc::new(NullWire),
            geolocator: Some(Arc::new(FixedGeo)),
        };
        let identity = LocalIdentity::new(PeerAddr::from_u64(0xaabbccddee), [1u8; 32], [2u8; 32]);
        Cluster::new(env, ClusterConfig::default(), &identity, id, Vec::new(), (0, 0, 0))
    }

    #[test]
    fn test_add_member_keeps_ids_sorted() {
        let c = test_cluster(1);
        c.add_member(40);
        c.add_member(2);
        c.add_member(7);
        assert_eq!(c.members.active_ids(), vec![2, 7, 40]);

        let ids = c.members.active_ids();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_add_member_rejects_self_and_out_of_range() {
        let c = test_cluster(1);
        c.add_member(1);
        c.add_member(MAX_MEMBERS as u16);
        c.add_member(u16::MAX);
        assert!(c.members.active_ids().is_empty());
    }

    #[test]
    fn test_add_member_is_idempotent() {
        let c = test_cluster(1);
        c.add_member(2);
        c.add_member(2);
        assert_eq!(c.members.active_ids(), vec![2]);
    }

    #[test]
    fn test_remove_member() {
        let c = test_cluster(1);
        c.add_member(2);
        c.add_member(3);
        c.remove_member(2);
        assert_eq!(c.members.active_ids(), vec![3]);
        c.remove_member(9); // absent: no-op
        assert_eq!(c.members.active_ids(), vec![3]);
    }

    #[test]
    fn test_enqueue_appends_length_type_payload() {
        let c = test_cluster(1);
        c.add_member(2);
        let mut m = c.members.lock(2);
        c.enqueue(&mut m, 2, StateMessageType::Com, b"abc");
        assert_eq!(m.q.len(), QUEUE_PREFIX + 2 + 1 + 3);
        assert_eq!(&m.q[QUEUE_PREFIX..QUEUE_PREFIX + 2], &4u16.to_be_bytes());
        assert_eq!(m.q[QUEUE_PREFIX + 2], StateMessageType::Com as u8);
        assert_eq!(&m.q[QUEUE_PREFIX + 3..], b"abc");
    }

    #[test]
    fn test_enqueue_drops_oversized_submessage() {
        let c = test_cluster(1);
        c.add_member(2);
        let oversized = vec![0u8; MAX_FRAME_LENGTH];
        let mut m = c.members.lock(2);
        c.enqueue(&mut m, 2, StateMessageType::Com, &oversized);
        assert_eq!(m.q.len(), QUEUE_PREFIX);
    }

    #[test]
    fn test_replication_enqueues_to_every_member() {
        let c = test_cluster(1);
        c.add_member(2);
        c.add_member(3);
        c.replicate_certificate_of_network_membership(b"credential");
        assert!(c.members.lock(2).queue_has_payload());
        assert!(c.members.lock(3).queue_has_payload());
    }

    #[test]
    fn test_status_lists_self_first() {
        let c = test_cluster(1);
        c.add_member(2);
        let status = c.status();
        assert_eq!(status.my_id, 1);
        assert_eq!(status.members[0].id, 1);
        assert!(status.members[0].alive);
        assert_eq!(status.members[1].id, 2);
        assert!(!status.members[1].alive); // never heard from
    }

    #[test]
    fn test_dist3d() {
        assert_eq!(dist3d((0, 0, 0), (3, 4, 0)), 5.0);
        assert_eq!(dist3d((1, 1, 1), (1, 1, 1)), 0.0);
    }
}
