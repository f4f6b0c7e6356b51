//! # Meshgate Cluster
//!
//! Intra-cluster coordination core for the meshgate virtual-network
//! service. A cluster is a small group of front-end nodes that share one
//! external identity and collectively route traffic for a much larger
//! population of end-peers.
//!
//! This crate provides:
//! - Authenticated inter-member message framing and batching
//! - The member table and alive/announce protocol
//! - The peer-affinity map (which member currently handles which end-peer)
//! - Cross-member rendezvous and relay (NAT hole-punch coordination)
//! - Geolocation-based redirection of connecting end-peers
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Cluster                               │
//! │  replicate_* / send_via_cluster      handle_incoming_state_msg │
//! ├────────────────────────────────────────────────────────────────┤
//! │   member table + outbound queues     peer-affinity map         │
//! ├────────────────────────────────────────────────────────────────┤
//! │   sealed frames (meshgate-crypto)    collaborator traits       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything outside this coordination layer (the packet switch, the
//! topology database, multicast tracking, the inter-member transport, and
//! geolocation) is reached through the traits in [`env`]. The core has no
//! internal threads or timers: all entry points are driven by the host's
//! I/O, switch, and clock loops, and the host calls
//! [`Cluster::do_periodic_tasks`](cluster::Cluster::do_periodic_tasks) on
//! its tick.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod affinity;
pub mod cluster;
pub mod endpoint;
pub mod env;
pub mod error;
pub mod identity;
pub mod member;
pub mod message;
pub mod status;
pub mod wire;

pub use cluster::{Cluster, ClusterConfig};
pub use endpoint::Endpoint;
pub use error::{ClusterError, WireError};
pub use identity::{LocalIdentity, PeerAddr, PeerIdentity};
pub use member::MemberId;
pub use status::{ClusterStatus, MemberStatus};

/// Maximum number of members in one cluster; member IDs are `[0, 128)`.
pub const MAX_MEMBERS: usize = 128;

/// Largest member-to-member frame, sealed overhead included.
pub const MAX_FRAME_LENGTH: usize = meshgate_crypto::MAX_FRAME_LENGTH;

/// Bytes every primed outbound queue starts with: the 24-byte sealed-frame
/// prefix plus the 2-byte sender and 2-byte receiver member IDs.
pub const QUEUE_PREFIX: usize = meshgate_crypto::FRAME_OVERHEAD + 4;

/// Largest end-peer datagram `send_via_cluster` will relay.
pub const MAX_RELAY_PAYLOAD: usize = 16_384;

/// Software version advertised in ALIVE announcements.
pub const VERSION_MAJOR: u16 = 1;
/// Minor version advertised in ALIVE announcements.
pub const VERSION_MINOR: u16 = 0;
/// Revision advertised in ALIVE announcements.
pub const VERSION_REVISION: u16 = 0;
/// Cluster protocol version advertised in ALIVE announcements.
pub const PROTOCOL_VERSION: u8 = 1;
