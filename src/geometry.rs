//! Geometry helpers for GPS proximity and distribution metrics.
//!
//! Contains:
//! - Squared Euclidean distance (avoids a sqrt in hot paths)
//! - Full 3-D Euclidean distance
//! - Centroid of a set of valid locations
//!
//! Locations are treated as opaque Cartesian coordinates in meters; callers
//! are responsible for only passing locations whose `valid` flag is set.

use crate::types::GpsLocation;

/// Squared Euclidean distance between two locations in meters².
///
/// Using squared distance is the usual optimization when comparing
/// distances: d1² vs d2² orders the same as d1 vs d2 without the square
/// root. The proximity filter compares against a squared threshold for
/// exactly this reason.
pub fn distance2(a: &GpsLocation, b: &GpsLocation) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    dx * dx + dy * dy + dz * dz
}

/// Convert a squared distance back to meters.
pub fn distance_from_d2(d2: f64) -> f64 {
    d2.sqrt()
}

/// Euclidean distance between two locations in meters.
pub fn distance(a: &GpsLocation, b: &GpsLocation) -> f64 {
    distance_from_d2(distance2(a, b))
}

/// Centroid of the valid locations in `points`.
///
/// Invalid locations are skipped. Returns `None` when no valid location is
/// present.
pub fn centroid<'a, I>(points: I) -> Option<GpsLocation>
where
    I: IntoIterator<Item = &'a GpsLocation>,
{
    let mut n = 0usize;
    let (mut sx, mut sy, mut sz) = (0.0f64, 0.0f64, 0.0f64);
    for p in points {
        if !p.valid {
            continue;
        }
        n += 1;
        sx += p.x;
        sy += p.y;
        sz += p.z;
    }
    if n == 0 {
        return None;
    }
    let inv = 1.0 / n as f64;
    Some(GpsLocation::new(sx * inv, sy * inv, sz * inv))
}
