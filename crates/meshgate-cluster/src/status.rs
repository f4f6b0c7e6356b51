//! Read-only cluster status snapshot.

use crate::endpoint::Endpoint;
use crate::member::MemberId;

/// Observable state of one member at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    /// Member ID.
    pub id: MemberId,
    /// Whether the member's heartbeat is within the cluster timeout.
    /// Always true for the local member.
    pub alive: bool,
    /// Milliseconds since the last heartbeat (0 for the local member).
    pub ms_since_heartbeat: u64,
    /// Last reported X coordinate.
    pub x: i32,
    /// Last reported Y coordinate.
    pub y: i32,
    /// Last reported Z coordinate.
    pub z: i32,
    /// Last reported load metric.
    pub load: u64,
    /// End-peers currently homed on this member (fresh affinity entries;
    /// the local member reports its topology's active peer count).
    pub peers: u32,
    /// Advertised physical endpoints, capped at the configured maximum.
    pub endpoints: Vec<Endpoint>,
}

/// Snapshot of the whole cluster as seen from the local member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    /// The local member's ID.
    pub my_id: MemberId,
    /// All members, local member first, then active members by ascending
    /// ID.
    pub members: Vec<MemberStatus>,
}
