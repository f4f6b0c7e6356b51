//! Cluster member records and the active-member table.
//!
//! The table is a fixed array of 128 slots indexed by member ID, each
//! behind its own lock, plus a separately locked sorted vector of active
//! IDs. A slot is only consulted while its ID is in the active vector;
//! `remove_member` leaves the record dormant for the next `add_member` to
//! reinitialize.

use crate::endpoint::Endpoint;
use crate::{MAX_MEMBERS, QUEUE_PREFIX};
use meshgate_crypto::{FRAME_TAG_SIZE, MemberKey, random};
use parking_lot::{Mutex, MutexGuard};

/// Cluster member identifier, range `[0, 128)`.
pub type MemberId = u16;

/// Per-slot member record.
///
/// Guarded by the slot's lock; holds the member's frame key, the outbound
/// batching queue, and the last state it announced.
pub(crate) struct MemberState {
    /// Frame key for messages to this member.
    pub key: MemberKey,
    /// Outbound queue. When primed it always starts with the 24-byte
    /// sealed-frame prefix and the 4 sender/receiver ID bytes; length 0
    /// means priming failed and will be retried on the next enqueue.
    pub q: Vec<u8>,
    /// Last reported X coordinate (all-zero location means unknown).
    pub x: i32,
    /// Last reported Y coordinate.
    pub y: i32,
    /// Last reported Z coordinate.
    pub z: i32,
    /// Last reported load metric (opaque to the core).
    pub load: u64,
    /// Endpoints the member last advertised, in preference order.
    pub endpoints: Vec<Endpoint>,
    /// Monotonic ms timestamp of the last ALIVE received from the member.
    pub last_received_alive: u64,
    /// Monotonic ms timestamp of the last ALIVE we enqueued toward it.
    pub last_announced_alive_to: u64,
}

impl MemberState {
    fn vacant() -> Self {
        Self {
            key: MemberKey::vacant(),
            q: Vec::new(),
            x: 0,
            y: 0,
            z: 0,
            load: 0,
            endpoints: Vec::new(),
            last_received_alive: 0,
            last_announced_alive_to: 0,
        }
    }

    /// Reset everything but the queue buffer's allocation.
    pub fn clear(&mut self) {
        self.key = MemberKey::vacant();
        self.q.clear();
        self.x = 0;
        self.y = 0;
        self.z = 0;
        self.load = 0;
        self.endpoints.clear();
        self.last_received_alive = 0;
        self.last_announced_alive_to = 0;
    }

    /// Location is known once any coordinate is nonzero.
    pub fn has_location(&self) -> bool {
        self.x != 0 || self.y != 0 || self.z != 0
    }

    /// Reset the queue to a fresh frame prefix: 16-byte random IV, 8
    /// reserved tag bytes, then the sender and receiver member IDs.
    ///
    /// Returns `false` if the CSPRNG failed; the queue is left empty and
    /// priming is retried on the next enqueue rather than sending with a
    /// predictable IV.
    pub fn prime_queue(&mut self, self_id: MemberId, member_id: MemberId) -> bool {
        self.q.clear();
        let iv = match random::random_16() {
            Ok(iv) => iv,
            Err(_) => {
                tracing::warn!(member = member_id, "CSPRNG failure, queue left unprimed");
                return false;
            }
        };
        self.q.reserve(crate::MAX_FRAME_LENGTH);
        self.q.extend_from_slice(&iv);
        self.q.extend_from_slice(&[0u8; FRAME_TAG_SIZE]);
        self.q.extend_from_slice(&self_id.to_be_bytes());
        self.q.extend_from_slice(&member_id.to_be_bytes());
        true
    }

    /// True when the queue holds sub-messages beyond the frame prefix.
    pub fn queue_has_payload(&self) -> bool {
        self.q.len() > QUEUE_PREFIX
    }
}

/// Fixed-capacity member table plus the sorted active-ID vector.
pub(crate) struct MemberTable {
    slots: Vec<Mutex<MemberState>>,
    active: Mutex<Vec<MemberId>>,
}

impl MemberTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_MEMBERS).map(|_| Mutex::new(MemberState::vacant())).collect(),
            active: Mutex::new(Vec::new()),
        }
    }

    /// Lock one slot. Caller must ensure `id < MAX_MEMBERS`.
    pub fn lock(&self, id: MemberId) -> MutexGuard<'_, MemberState> {
        self.slots[usize::from(id)].lock()
    }

    /// Lock the active-ID vector (first in the acquisition order).
    pub fn active(&self) -> MutexGuard<'_, Vec<MemberId>> {
        self.active.lock()
    }

    /// Snapshot of the active IDs, sorted ascending.
    pub fn active_ids(&self) -> Vec<MemberId> {
        self.active.lock().clone()
    }

    /// Whether `id` is currently active.
    pub fn is_active(&self, id: MemberId) -> bool {
        self.active.lock().binary_search(&id).is_ok()
    }
}
