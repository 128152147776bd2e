//! # HiveLink Engine
//!
//! A per-node protocol engine for scalable Bluetooth-Low-Energy mesh
//! discovery and clusterhead election, designed to scale to thousands of
//! devices.
//!
//! ## Purpose
//!
//! Each device runs one [`Engine`]: a slotted discovery state machine, a
//! bounded forwarding queue with deduplication and loop detection, a
//! picky/GPS-proximity forwarding filter, an RSSI-derived crowding
//! estimator, a clusterhead candidacy evaluator and a byte-exact wire
//! codec for the two frame types (discovery, election announcement).
//!
//! The engine is a library with no I/O of its own. The radio, the GPS
//! source, the clock and any simulator or hardware glue live outside and
//! talk to the engine through three seams:
//!
//! - the caller drives time by calling [`Engine::tick`] once per slot and
//!   [`Engine::receive`] per incoming frame, always passing the current
//!   monotonic millisecond;
//! - the engine hands outgoing frames, log events and metric snapshots to
//!   the embedder through the [`Host`] trait;
//! - configuration arrives once, at construction, as an [`EngineConfig`].
//!
//! ## Architecture Overview
//!
//! Data flow per tick: the discovery cycle advances one slot; slot 0
//! builds this node's own frame (discovery, or an election announcement
//! while a candidate or head) and emits it unless the broadcast schedule
//! calls a listen slot; slots 1 to 3 each drain one queued frame,
//! decrement its TTL, append this node to the path and re-broadcast. On
//! the receive side, every parsed frame feeds the RSSI window and the
//! neighbor table before the forwarding filter and queue see it.
//!
//! ## Module Organization
//!
//! - `types`: shared data types, capacities, node state machine
//! - `wire`: the big-endian frame codec
//! - `neighbors`: bounded neighbor table
//! - `cycle`: the four-slot discovery rotation
//! - `timing`: noisy/stochastic broadcast schedules and retry accounting
//! - `crowding`: RSSI sample window and crowding factor
//! - `filter`: forwarding admission (TTL, picky, GPS proximity)
//! - `queue`: forward queue and seen cache
//! - `election`: connectivity metrics, candidacy score, PDSF accumulator
//! - `engine`: the per-node orchestration loop and `Host` seam
//! - `config`, `error`, `logging`, `geometry`, `rng`: ambient support
//!
//! ## Determinism
//!
//! A single engine is strictly single-threaded and consults no clock or
//! global RNG. Seed it with [`Engine::seed_random`] and feed it the same
//! tick/receive sequence, and it reproduces the same decisions bit for
//! bit, which the protocol tests rely on.

pub mod config;
pub mod crowding;
pub mod cycle;
pub mod election;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod logging;
pub mod neighbors;
pub mod queue;
pub mod rng;
pub mod timing;
pub mod types;
pub mod wire;

mod engine;

pub use config::EngineConfig;
pub use election::{CandidacyThresholds, ConnectivityMetrics, ScoreWeights};
pub use engine::{
    CANDIDACY_COOLDOWN_CYCLES, Engine, EngineCounters, Host, NodeView, ReceiveOutcome, SendError,
};
pub use error::Error;
pub use filter::FilterReject;
pub use logging::LogLevel;
pub use types::{GpsLocation, NodeState};
pub use wire::{DiscoveryFrame, ElectionFrame, Frame, HopPath, MAX_FRAME_LEN, PdsfHistory};
