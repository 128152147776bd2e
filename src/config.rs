//! Engine configuration.
//!
//! `EngineConfig` carries every tunable of the engine. All fields except
//! the node id have defaults, so a TOML document only needs to name what
//! it changes:
//!
//! ```toml
//! node_id = 17
//! slot_duration_ms = 50
//! proximity_threshold_m = 25.0
//!
//! [thresholds]
//! min_neighbors = 6
//! ```
//!
//! Validation runs once, at engine construction, and rejects a bad
//! configuration with a descriptive message. This is the only fatal error
//! path in the crate.

use serde::{Deserialize, Serialize};

use crate::crowding::DEFAULT_RSSI_MAX_AGE_MS;
use crate::cycle::DEFAULT_SLOT_DURATION_MS;
use crate::election::{CandidacyThresholds, ScoreWeights};
use crate::error::Error;
use crate::filter::DEFAULT_PROXIMITY_THRESHOLD_M;
use crate::timing::DEFAULT_MAX_RETRIES;
use crate::types::INVALID_NODE_ID;

/// Default TTL stamped on frames this node originates.
pub const DEFAULT_INITIAL_TTL: u8 = 10;

/// Default RSSI at or above which a neighbor counts as direct, in dBm.
pub const DEFAULT_DIRECT_RSSI_THRESHOLD_DBM: i8 = -70;

/// Default neighbor staleness horizon, in milliseconds.
pub const DEFAULT_NEIGHBOR_MAX_AGE_MS: u64 = 30_000;

/// Default seen-cache entry lifetime, in milliseconds.
pub const DEFAULT_SEEN_MAX_AGE_MS: u64 = 30_000;

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// This node's identifier. Must be nonzero.
    pub node_id: u32,
    /// Expected wall-clock duration of one discovery slot.
    pub slot_duration_ms: u32,
    /// TTL stamped on frames this node originates.
    pub initial_ttl: u8,
    /// Minimum last-hop distance for GPS-proximity forwarding, in meters.
    pub proximity_threshold_m: f64,
    /// RSSI at or above which a neighbor counts as direct, in dBm.
    pub direct_rssi_threshold_dbm: i8,
    /// Maximum age of RSSI samples inside a noisy window.
    pub rssi_max_age_ms: u64,
    /// Staleness horizon for neighbor records.
    pub neighbor_max_age_ms: u64,
    /// Lifetime of seen-cache entries.
    pub seen_max_age_ms: u64,
    /// Bound on send retries after a callback failure.
    pub max_retries: u8,
    /// Cluster class announced when this node becomes a head.
    pub class_id: u16,
    pub weights: ScoreWeights,
    pub thresholds: CandidacyThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: INVALID_NODE_ID,
            slot_duration_ms: DEFAULT_SLOT_DURATION_MS,
            initial_ttl: DEFAULT_INITIAL_TTL,
            proximity_threshold_m: DEFAULT_PROXIMITY_THRESHOLD_M,
            direct_rssi_threshold_dbm: DEFAULT_DIRECT_RSSI_THRESHOLD_DBM,
            rssi_max_age_ms: DEFAULT_RSSI_MAX_AGE_MS,
            neighbor_max_age_ms: DEFAULT_NEIGHBOR_MAX_AGE_MS,
            seen_max_age_ms: DEFAULT_SEEN_MAX_AGE_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            class_id: 0,
            weights: ScoreWeights::default(),
            thresholds: CandidacyThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// A default configuration for the given node id.
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    /// Parse a configuration from a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field for consistency.
    ///
    /// Returns a descriptive [`Error::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.node_id == INVALID_NODE_ID {
            return Err(Error::InvalidConfig(
                "node_id must be nonzero".to_string(),
            ));
        }
        if self.slot_duration_ms == 0 {
            return Err(Error::InvalidConfig(
                "slot_duration_ms must be positive".to_string(),
            ));
        }
        if self.initial_ttl == 0 {
            return Err(Error::InvalidConfig(
                "initial_ttl must be at least 1".to_string(),
            ));
        }
        if !self.proximity_threshold_m.is_finite() || self.proximity_threshold_m < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "proximity_threshold_m {} must be finite and non-negative",
                self.proximity_threshold_m
            )));
        }

        let w = &self.weights;
        for (name, value) in [
            ("weights.direct", w.direct),
            ("weights.cn_ratio", w.cn_ratio),
            ("weights.geographic", w.geographic),
            ("weights.forwarding", w.forwarding),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "{name} {value} outside [0, 1]"
                )));
            }
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidConfig(format!(
                "score weights sum to {}, must sum to 1.0",
                w.sum()
            )));
        }

        let t = &self.thresholds;
        if !t.min_cn_ratio.is_finite() || t.min_cn_ratio < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "thresholds.min_cn_ratio {} must be finite and non-negative",
                t.min_cn_ratio
            )));
        }
        if !(0.0..=1.0).contains(&t.min_geo_dist) {
            return Err(Error::InvalidConfig(format!(
                "thresholds.min_geo_dist {} outside [0, 1]",
                t.min_geo_dist
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let c = EngineConfig::new(1);
        assert_eq!(c.slot_duration_ms, 100);
        assert_eq!(c.initial_ttl, 10);
        assert_eq!(c.proximity_threshold_m, 10.0);
        assert_eq!(c.direct_rssi_threshold_dbm, -70);
        assert_eq!(c.rssi_max_age_ms, 10_000);
        assert_eq!(c.max_retries, 3);
        assert!((c.weights.sum() - 1.0).abs() < 1e-12);
        assert_eq!(c.thresholds.min_neighbors, 10);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_node_id_is_rejected() {
        let c = EngineConfig::default();
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_ttl_and_zero_slot_duration_are_rejected() {
        let mut c = EngineConfig::new(1);
        c.initial_ttl = 0;
        assert!(c.validate().is_err());

        let mut c = EngineConfig::new(1);
        c.slot_duration_ms = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn negative_proximity_threshold_is_rejected() {
        let mut c = EngineConfig::new(1);
        c.proximity_threshold_m = -1.0;
        assert!(c.validate().is_err());
        c.proximity_threshold_m = f64::NAN;
        assert!(c.validate().is_err());
        c.proximity_threshold_m = 0.0;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut c = EngineConfig::new(1);
        c.weights.direct = 0.5; // sum now 1.15
        let err = c.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("sum")));
    }

    #[test]
    fn toml_round_trip_with_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            node_id = 17
            slot_duration_ms = 50

            [thresholds]
            min_neighbors = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.node_id, 17);
        assert_eq!(config.slot_duration_ms, 50);
        assert_eq!(config.thresholds.min_neighbors, 6);
        // Untouched fields keep their defaults.
        assert_eq!(config.initial_ttl, DEFAULT_INITIAL_TTL);
    }

    #[test]
    fn toml_without_node_id_fails_validation() {
        let err = EngineConfig::from_toml_str("slot_duration_ms = 50").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("node_id")));
    }

    #[test]
    fn malformed_toml_is_reported_as_invalid_config() {
        let err = EngineConfig::from_toml_str("node_id = ").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
