//! Forwarding admission: TTL gate, picky probability, GPS proximity.
//!
//! A received frame is admitted for forwarding only when every gate
//! passes:
//!
//! 1. TTL is still positive.
//! 2. The path has room for one more hop (a full 50-entry path can never
//!    be re-broadcast, whatever its TTL).
//! 3. The picky draw passes. Picky forwarding throttles re-broadcasts
//!    under crowding: the forward probability collapses from 1.0 toward
//!    `min(1, 2/n)` as the crowding factor crosses the 0.1 to 0.9 band.
//! 4. The GPS proximity test passes: the last hop must be strictly
//!    farther away than the proximity threshold. Skipped when either side
//!    lacks a valid position.
//!
//! Rejections are verdicts, not errors; the engine counts them by reason.

use crate::geometry::distance2;
use crate::rng::Lcg;
use crate::types::{GpsLocation, MAX_PATH_HOPS};
use crate::wire::Frame;

/// Crowding below which picky forwarding never drops.
pub const PICKY_CROWDING_LOWER: f64 = 0.1;
/// Crowding above which picky forwarding is fully collapsed to its base.
pub const PICKY_CROWDING_UPPER: f64 = 0.9;

/// Default GPS proximity threshold, in meters.
pub const DEFAULT_PROXIMITY_THRESHOLD_M: f64 = 10.0;

/// Why a frame was refused for forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReject {
    /// TTL already exhausted on arrival.
    TtlExpired,
    /// Path already holds the maximum number of hops.
    PathFull,
    /// Lost the picky draw under crowding.
    PickyDrop,
    /// Last hop is within the proximity threshold.
    ProximityTooClose,
}

/// Forward probability for the picky gate.
///
/// With crowding `c` (clamped to `[0, 1]`) and `n` observed direct
/// neighbors (floored at 1): `base = min(1, 2/n)`; probability is 1.0 up
/// to `c = 0.1`, `base` from `c = 0.9`, and linear in between.
pub fn picky_probability(crowding: f64, direct_neighbors: u32) -> f64 {
    let c = crowding.clamp(0.0, 1.0);
    let n = direct_neighbors.max(1) as f64;
    let base = (2.0 / n).min(1.0);
    if c <= PICKY_CROWDING_LOWER {
        1.0
    } else if c >= PICKY_CROWDING_UPPER {
        base
    } else {
        let t = (c - PICKY_CROWDING_LOWER) / (PICKY_CROWDING_UPPER - PICKY_CROWDING_LOWER);
        1.0 + (base - 1.0) * t
    }
}

/// Queue priority for a frame with the given TTL.
///
/// `255 - ttl`: fresher frames (higher TTL) get lower values, and lower
/// value means higher priority. A TTL of zero maps to 255, the lowest
/// possible priority.
pub fn forward_priority(ttl: u8) -> u8 {
    255 - ttl
}

/// The picky + proximity + TTL admission gate.
#[derive(Debug)]
pub struct ForwardingFilter {
    proximity_threshold_m: f64,
}

impl ForwardingFilter {
    pub fn new(proximity_threshold_m: f64) -> Self {
        Self {
            proximity_threshold_m,
        }
    }

    /// Decide whether `frame` may be queued for forwarding.
    ///
    /// `self_gps` is this node's position, `crowding` the current crowding
    /// factor, `direct_neighbors` the observed direct-neighbor count. The
    /// picky draw comes from `rng`, which the engine owns so that decisions
    /// are reproducible under a fixed seed.
    pub fn admit(
        &self,
        frame: &Frame,
        self_gps: &GpsLocation,
        crowding: f64,
        direct_neighbors: u32,
        rng: &mut Lcg,
    ) -> Result<(), FilterReject> {
        let d = frame.discovery();
        if d.ttl == 0 {
            return Err(FilterReject::TtlExpired);
        }
        if d.path.len() >= MAX_PATH_HOPS {
            return Err(FilterReject::PathFull);
        }

        let p = picky_probability(crowding, direct_neighbors);
        if rng.next_unit() >= p {
            return Err(FilterReject::PickyDrop);
        }

        // Proximity applies only when both positions are known. The last
        // hop must be strictly farther than the threshold; an equal
        // distance does not pass.
        if self_gps.valid && d.gps.valid {
            let threshold2 = self.proximity_threshold_m * self.proximity_threshold_m;
            if distance2(&d.gps, self_gps) <= threshold2 {
                return Err(FilterReject::ProximityTooClose);
            }
        }

        Ok(())
    }
}
