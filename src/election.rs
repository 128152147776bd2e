//! Clusterhead candidacy evaluation.
//!
//! Derives connectivity metrics from the neighbor table and crowding
//! estimate, combines them into a weighted candidacy score, applies the
//! candidacy threshold predicate, and maintains the PDSF accumulator
//! carried by election announcements.
//!
//! All score inputs are normalized into `[0, 1]` before weighting:
//!
//! ```text
//! score = w_direct * min(1, direct/30)
//!       + w_cn     * min(1, cn_ratio/10)
//!       + w_geo    * geographic_distribution
//!       + w_fwd    * forwarding_success_rate
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::geometry::{centroid, distance};
use crate::neighbors::NeighborTable;
use crate::wire::ElectionFrame;

/// Fixed normalizer for the geographic-distribution metric, in meters.
///
/// The standard deviation of neighbor distances from their centroid is
/// divided by this constant and clamped to `[0, 1]`. It is a tuning
/// constant, never derived dynamically.
pub const GEO_DISTRIBUTION_NORMALIZER_M: f64 = 100.0;

/// Direct-connection count at which that score term saturates.
pub const DIRECT_SCORE_NORMALIZER: f64 = 30.0;

/// CN ratio at which that score term saturates.
pub const CN_RATIO_SCORE_NORMALIZER: f64 = 10.0;

/// Largest direct-neighbor count at which a node still counts as sitting
/// at the network edge.
pub const EDGE_MAX_DIRECT_CONNECTIONS: u32 = 2;

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET_BASIS: u32 = 2166136261;
/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 16777619;

/// Weights of the four candidacy score terms. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub direct: f64,
    pub cn_ratio: f64,
    pub geographic: f64,
    pub forwarding: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            direct: 0.35,
            cn_ratio: 0.30,
            geographic: 0.20,
            forwarding: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.direct + self.cn_ratio + self.geographic + self.forwarding
    }
}

/// Minimums a node must meet to announce candidacy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidacyThresholds {
    /// Minimum direct-neighbor count.
    pub min_neighbors: u32,
    /// Minimum connection-to-noise ratio.
    pub min_cn_ratio: f64,
    /// Minimum geographic distribution, applied only when at least two
    /// neighbors are known.
    pub min_geo_dist: f64,
}

impl Default for CandidacyThresholds {
    fn default() -> Self {
        Self {
            min_neighbors: 10,
            min_cn_ratio: 5.0,
            min_geo_dist: 0.3,
        }
    }
}

/// Snapshot of the derived connectivity metrics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectivityMetrics {
    pub neighbor_count: usize,
    pub direct_connections: u32,
    pub crowding_factor: f64,
    /// `direct_connections / (1 + crowding_factor)`.
    pub connection_noise_ratio: f64,
    /// Normalized spread of neighbor positions, `[0, 1]`.
    pub geographic_distribution: f64,
    /// `messages_forwarded / messages_received`, 0 when nothing received.
    pub forwarding_success_rate: f64,
}

/// Candidacy evaluator state.
#[derive(Debug)]
pub struct ElectionEvaluator {
    weights: ScoreWeights,
    thresholds: CandidacyThresholds,
    pub messages_forwarded: u64,
    pub messages_received: u64,
    is_candidate: bool,
    candidacy_score: f64,
}

impl ElectionEvaluator {
    pub fn new(weights: ScoreWeights, thresholds: CandidacyThresholds) -> Self {
        Self {
            weights,
            thresholds,
            messages_forwarded: 0,
            messages_received: 0,
            is_candidate: false,
            candidacy_score: 0.0,
        }
    }

    pub fn is_candidate(&self) -> bool {
        self.is_candidate
    }

    /// Most recently computed candidacy score.
    pub fn candidacy_score(&self) -> f64 {
        self.candidacy_score
    }

    /// Withdraw candidacy (state fell back to member or edge).
    pub fn clear_candidacy(&mut self) {
        self.is_candidate = false;
    }

    /// Recompute all derived metrics from the current neighbor table and
    /// crowding factor.
    pub fn compute_metrics(
        &self,
        neighbors: &NeighborTable,
        crowding_factor: f64,
    ) -> ConnectivityMetrics {
        let direct = neighbors.direct_count();
        let cn_ratio = f64::from(direct) / (1.0 + crowding_factor);
        let forwarding_success_rate = if self.messages_received == 0 {
            0.0
        } else {
            self.messages_forwarded as f64 / self.messages_received as f64
        };
        ConnectivityMetrics {
            neighbor_count: neighbors.len(),
            direct_connections: direct,
            crowding_factor,
            connection_noise_ratio: cn_ratio,
            geographic_distribution: geographic_distribution(neighbors),
            forwarding_success_rate,
        }
    }

    /// Weighted candidacy score for the given metrics, clamped to `[0, 1]`.
    pub fn score(&self, m: &ConnectivityMetrics) -> f64 {
        let w = &self.weights;
        let direct_term = (f64::from(m.direct_connections) / DIRECT_SCORE_NORMALIZER).min(1.0);
        let cn_term = (m.connection_noise_ratio / CN_RATIO_SCORE_NORMALIZER).min(1.0);
        let raw = w.direct * direct_term
            + w.cn_ratio * cn_term
            + w.geographic * m.geographic_distribution
            + w.forwarding * m.forwarding_success_rate;
        raw.clamp(0.0, 1.0)
    }

    /// Candidacy predicate.
    ///
    /// Passes when direct connections and CN ratio meet their thresholds,
    /// and (with at least two known neighbors) the geographic distribution
    /// does too. All comparisons are inclusive: sitting exactly on every
    /// threshold qualifies. On success the evaluator marks itself a
    /// candidate and refreshes the stored score.
    pub fn should_become_candidate(&mut self, m: &ConnectivityMetrics) -> bool {
        let t = &self.thresholds;
        let qualified = m.direct_connections >= t.min_neighbors
            && m.connection_noise_ratio >= t.min_cn_ratio
            && (m.neighbor_count < 2 || m.geographic_distribution >= t.min_geo_dist);
        if qualified {
            self.is_candidate = true;
            self.candidacy_score = self.score(m);
        }
        qualified
    }

    /// Whether this node belongs at the network edge: too few direct
    /// links to matter for clustering.
    pub fn should_become_edge(&self, m: &ConnectivityMetrics) -> bool {
        m.direct_connections <= EDGE_MAX_DIRECT_CONNECTIONS
    }

    /// Refresh the stored score without touching candidacy.
    pub fn update_score(&mut self, m: &ConnectivityMetrics) {
        self.candidacy_score = self.score(m);
    }
}

/// Normalized spread of valid neighbor positions.
///
/// Fewer than two neighbors with valid GPS yields 0. Otherwise: centroid
/// of the valid positions, sample variance of the distances from the
/// centroid, standard deviation, divided by
/// [`GEO_DISTRIBUTION_NORMALIZER_M`] and clamped to `[0, 1]`.
pub fn geographic_distribution(neighbors: &NeighborTable) -> f64 {
    let valid_count = neighbors.iter().filter(|n| n.gps.valid).count();
    if valid_count < 2 {
        return 0.0;
    }
    let center = match centroid(neighbors.iter().map(|n| &n.gps)) {
        Some(c) => c,
        None => return 0.0,
    };

    let mean_dist: f64 = neighbors
        .iter()
        .filter(|n| n.gps.valid)
        .map(|n| distance(&n.gps, &center))
        .sum::<f64>()
        / valid_count as f64;
    let variance: f64 = neighbors
        .iter()
        .filter(|n| n.gps.valid)
        .map(|n| {
            let d = distance(&n.gps, &center) - mean_dist;
            d * d
        })
        .sum::<f64>()
        / (valid_count - 1) as f64;

    (variance.sqrt() / GEO_DISTRIBUTION_NORMALIZER_M).clamp(0.0, 1.0)
}

/// Slot-assignment hash: FNV-1a over the four little-endian bytes of the
/// node id. Deterministic tie-break value, not a security primitive.
pub fn election_hash(node_id: u32) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in node_id.to_le_bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Apply one forwarding hop's contribution to an election frame's PDSF.
///
/// The hop observes `direct` neighbors, `already_reached` of which were
/// counted by prior hops (clamped to `direct`). Its contribution is
/// `unique = direct - already_reached`. The aggregate follows the running
/// product-of-sums discipline: the hop's product term is the product of
/// all prior history entries (seeded 1) times `unique`, and the PDSF grows
/// by that term. Product and sum both saturate at `u32::MAX`.
///
/// `unique` is appended to the frame's history; a full history (50 hops)
/// fails with [`Error::Overflow`].
pub fn apply_pdsf_hop(
    frame: &mut ElectionFrame,
    direct: u32,
    already_reached: u32,
) -> Result<(), Error> {
    let unique = direct - already_reached.min(direct);
    let prev_pi = frame
        .pdsf_history
        .iter()
        .fold(1u32, |acc, &u| acc.saturating_mul(u));
    let pi = prev_pi.saturating_mul(unique);
    frame.pdsf = frame.pdsf.saturating_add(pi);
    frame
        .pdsf_history
        .push(unique)
        .map_err(|_| Error::Overflow)?;
    Ok(())
}
