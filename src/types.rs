//! Core data types and protocol constants.
//!
//! Contains the structures shared across the engine components:
//! - Protocol-wide capacity constants (path, neighbor table, queues)
//! - GPS location value type
//! - Node state enum and the per-node state machine with its transition graph
//!
//! All capacities are fixed at compile time; the components that use them
//! allocate nothing after construction.

use serde::{Deserialize, Serialize};

/// Reserved invalid node identifier. A valid node id is any nonzero `u32`.
pub const INVALID_NODE_ID: u32 = 0;

/// Maximum number of hops a frame's path (and an election frame's PDSF
/// history) may record.
pub const MAX_PATH_HOPS: usize = 50;

/// Maximum number of neighbor records per node. Overflow is rejected; an
/// existing neighbor is never evicted to make room for a new one.
pub const MAX_NEIGHBORS: usize = 150;

/// Capacity of the forward queue.
pub const FORWARD_QUEUE_CAPACITY: usize = 100;

/// Capacity of the seen cache used for deduplication.
pub const SEEN_CACHE_CAPACITY: usize = 200;

/// Capacity of the RSSI sample window used by the crowding estimator.
pub const RSSI_WINDOW_CAPACITY: usize = 100;

/// Maximum number of member nodes a clusterhead coordinates.
pub const MAX_CLUSTER_SIZE: u32 = 150;

/// A 3-D GPS position with a validity flag.
///
/// Coordinates are opaque Cartesian meters; distance between two locations
/// is plain Euclidean. An invalid location carries no information and is
/// skipped by every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub valid: bool,
}

impl GpsLocation {
    /// A valid location at the given coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            valid: true,
        }
    }

    /// The invalid location (all zeros, `valid == false`).
    pub const fn invalid() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            valid: false,
        }
    }
}

impl Default for GpsLocation {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Lifecycle state of a node in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Freshly constructed, not yet participating.
    Init,
    /// Emitting and forwarding discovery traffic.
    Discovery,
    /// Sparsely connected node at the edge of the mesh.
    Edge,
    /// Announcing candidacy for clusterhead.
    ClusterheadCandidate,
    /// Elected coordinator of a cluster.
    Clusterhead,
    /// Member of a cluster, pointing at its head.
    ClusterMember,
}

impl NodeState {
    /// Whether `self -> to` is an edge of the allowed transition graph.
    ///
    /// Self-loops are allowed from every state. Any other pair not listed
    /// here is rejected by [`StateMachine::transition`].
    pub fn can_transition_to(self, to: NodeState) -> bool {
        use NodeState::*;
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Init, Discovery)
                | (Discovery, Edge)
                | (Discovery, ClusterheadCandidate)
                | (Edge, ClusterheadCandidate)
                | (Edge, ClusterMember)
                | (ClusterheadCandidate, Clusterhead)
                | (ClusterheadCandidate, ClusterMember)
                | (ClusterheadCandidate, Edge)
                | (Clusterhead, ClusterheadCandidate)
                | (ClusterMember, ClusterheadCandidate)
                | (ClusterMember, Edge)
        )
    }
}

/// Per-node state machine.
///
/// Tracks the current and previous state, the cycle at which the current
/// state was entered, and the cluster bookkeeping fields that only apply
/// in some states (`clusterhead_id` for members, `cluster_class` for
/// heads). Illegal transitions leave everything untouched.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: NodeState,
    prev_state: NodeState,
    state_entry_cycle: u32,
    /// Head followed by this node while in `ClusterMember`. Zero when unset.
    pub clusterhead_id: u32,
    /// Class announced by this node while in `Clusterhead`.
    pub cluster_class: u16,
}

impl StateMachine {
    /// A machine in `Init` with no history.
    pub fn new() -> Self {
        Self {
            state: NodeState::Init,
            prev_state: NodeState::Init,
            state_entry_cycle: 0,
            clusterhead_id: INVALID_NODE_ID,
            cluster_class: 0,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn prev_state(&self) -> NodeState {
        self.prev_state
    }

    /// Cycle count at which the current state was entered.
    pub fn state_entry_cycle(&self) -> u32 {
        self.state_entry_cycle
    }

    /// Attempt a transition to `to` at the given cycle.
    ///
    /// Returns `true` and updates `prev_state`/`state_entry_cycle` when the
    /// transition is an edge of the allowed graph. Returns `false` on any
    /// other target; the machine is unchanged, including `prev_state`.
    /// A self-loop succeeds but does not touch the history fields.
    pub fn transition(&mut self, to: NodeState, cycle: u32) -> bool {
        if !self.state.can_transition_to(to) {
            return false;
        }
        if to != self.state {
            self.prev_state = self.state;
            self.state = to;
            self.state_entry_cycle = cycle;
        }
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
