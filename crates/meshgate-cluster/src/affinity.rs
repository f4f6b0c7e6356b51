//! Peer-affinity tracking.
//!
//! The affinity map records which member most recently claimed each
//! end-peer and when. Entries are refreshed by HAVE_PEER announcements and
//! local adoption, consulted by the relay path, and garbage-collected by
//! the periodic sweep; the map itself is unbounded between sweeps.

use crate::identity::PeerAddr;
use crate::member::MemberId;
use crate::MAX_MEMBERS;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// One end-peer's current home: owning member and last-refresh time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affinity {
    /// Owning member ID.
    pub member: MemberId,
    /// Monotonic ms timestamp of the last refresh.
    pub ts: u64,
}

/// The peer-affinity map.
///
/// Last in the lock acquisition order: never held while taking the
/// active-ID or a member lock.
pub(crate) struct PeerAffinities {
    map: Mutex<HashMap<PeerAddr, Affinity>>,
}

impl PeerAffinities {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Current binding for `peer`, if any.
    pub fn get(&self, peer: PeerAddr) -> Option<Affinity> {
        self.map.lock().get(&peer).copied()
    }

    /// Bind `peer` to `member` at time `now` (remote announcement).
    pub fn bind(&self, peer: PeerAddr, member: MemberId, now: u64) {
        self.map.lock().insert(peer, Affinity { member, ts: now });
    }

    /// Claim `peer` for ourselves, returning whether an announcement
    /// should go out.
    ///
    /// A never-before-seen peer and a takeover from another member always
    /// announce. Re-claiming our own peer announces at most once per
    /// `announce_period`.
    pub fn claim_local(
        &self,
        peer: PeerAddr,
        self_id: MemberId,
        now: u64,
        announce_period: u64,
    ) -> bool {
        let mut map = self.map.lock();
        match map.entry(peer) {
            Entry::Vacant(e) => {
                e.insert(Affinity {
                    member: self_id,
                    ts: now,
                });
                true
            }
            Entry::Occupied(mut e) => {
                let pa = e.get_mut();
                if pa.member != self_id {
                    pa.member = self_id;
                    pa.ts = now;
                    true
                } else if now.saturating_sub(pa.ts) < announce_period {
                    false
                } else {
                    pa.ts = now;
                    true
                }
            }
        }
    }

    /// Drop every entry older than `max_age`, returning how many were
    /// removed.
    pub fn sweep(&self, now: u64, max_age: u64) -> usize {
        let mut map = self.map.lock();
        let before = map.len();
        map.retain(|_, pa| now.saturating_sub(pa.ts) < max_age);
        before - map.len()
    }

    /// Number of fresh entries owned by each member, indexed by ID.
    ///
    /// Entries owned by `exclude` (normally our own ID, whose peer count
    /// comes from the topology instead) are not counted.
    pub fn fresh_counts_by_member(
        &self,
        now: u64,
        max_age: u64,
        exclude: MemberId,
    ) -> Vec<u32> {
        let mut counts = vec![0u32; MAX_MEMBERS];
        for pa in self.map.lock().values() {
            if pa.member != exclude
                && usize::from(pa.member) < MAX_MEMBERS
                && now.saturating_sub(pa.ts) < max_age
            {
                counts[usize::from(pa.member)] += 1;
            }
        }
        counts
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }
}
