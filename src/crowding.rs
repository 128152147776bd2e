//! RSSI-derived crowding estimation.
//!
//! The crowding factor is a scalar in `[0, 1]` summarizing local channel
//! occupancy. It is measured over explicit "noisy windows": intervals
//! during which every received frame contributes one timestamped RSSI
//! sample to a bounded circular buffer. When the window closes (manually
//! or when the engine's tick notices the interval has elapsed) the mean of
//! the surviving samples is frozen as the crowding factor through a
//! piecewise-linear map:
//!
//! ```text
//! mean <= -90 dBm -> 0.0
//! mean >= -40 dBm -> 1.0
//! linear in between
//! ```
//!
//! Outside an active window new samples are ignored and the last frozen
//! value is reported. Samples older than the configured max age are
//! evicted on insertion, so a long window does not average in ancient
//! history.

use crate::types::RSSI_WINDOW_CAPACITY;

/// RSSI at or below which the channel counts as empty.
pub const CROWDING_RSSI_FLOOR_DBM: f64 = -90.0;
/// RSSI at or above which the channel counts as fully crowded.
pub const CROWDING_RSSI_CEIL_DBM: f64 = -40.0;

/// Default maximum sample age, in milliseconds.
pub const DEFAULT_RSSI_MAX_AGE_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
struct RssiSample {
    rssi_dbm: i8,
    sampled_at_ms: u64,
}

/// Time-windowed RSSI sampler producing a crowding factor.
#[derive(Debug)]
pub struct CrowdingEstimator {
    /// Circular buffer: `head` indexes the oldest sample.
    samples: [Option<RssiSample>; RSSI_WINDOW_CAPACITY],
    head: usize,
    len: usize,
    window_start_ms: u64,
    window_duration_ms: u64,
    window_active: bool,
    rssi_max_age_ms: u64,
    last_crowding_factor: f64,
}

/// Map a mean RSSI to a crowding factor in `[0, 1]`.
///
/// Linear between the floor and ceiling constants, clamped outside.
pub fn map_rssi_to_crowding(mean_rssi_dbm: f64) -> f64 {
    let span = CROWDING_RSSI_CEIL_DBM - CROWDING_RSSI_FLOOR_DBM;
    ((mean_rssi_dbm - CROWDING_RSSI_FLOOR_DBM) / span).clamp(0.0, 1.0)
}

impl CrowdingEstimator {
    pub fn new(rssi_max_age_ms: u64) -> Self {
        Self {
            samples: [None; RSSI_WINDOW_CAPACITY],
            head: 0,
            len: 0,
            window_start_ms: 0,
            window_duration_ms: 0,
            window_active: false,
            rssi_max_age_ms,
            last_crowding_factor: 0.0,
        }
    }

    pub fn window_active(&self) -> bool {
        self.window_active
    }

    /// Number of samples currently held.
    pub fn sample_count(&self) -> usize {
        self.len
    }

    /// Open a noisy window `[now, now + duration]`, discarding any samples
    /// from a previous window.
    pub fn begin_window(&mut self, now_ms: u64, duration_ms: u64) {
        self.samples = [None; RSSI_WINDOW_CAPACITY];
        self.head = 0;
        self.len = 0;
        self.window_start_ms = now_ms;
        self.window_duration_ms = duration_ms;
        self.window_active = true;
    }

    /// Record one RSSI sample. Ignored outside an active window.
    ///
    /// Stale samples are evicted first; when the buffer is still full the
    /// oldest sample is overwritten.
    pub fn add_sample(&mut self, rssi_dbm: i8, now_ms: u64) {
        if !self.window_active {
            return;
        }
        self.evict_stale(now_ms);

        let tail = (self.head + self.len) % RSSI_WINDOW_CAPACITY;
        let sample = RssiSample {
            rssi_dbm,
            sampled_at_ms: now_ms,
        };
        if self.len == RSSI_WINDOW_CAPACITY {
            // Overwrite the oldest sample.
            self.samples[self.head] = Some(sample);
            self.head = (self.head + 1) % RSSI_WINDOW_CAPACITY;
        } else {
            self.samples[tail] = Some(sample);
            self.len += 1;
        }
    }

    fn evict_stale(&mut self, now_ms: u64) {
        while self.len > 0 {
            let Some(oldest) = self.samples[self.head] else {
                break;
            };
            if now_ms.saturating_sub(oldest.sampled_at_ms) <= self.rssi_max_age_ms {
                break;
            }
            self.samples[self.head] = None;
            self.head = (self.head + 1) % RSSI_WINDOW_CAPACITY;
            self.len -= 1;
        }
    }

    /// Close the window if its interval has elapsed. Returns whether a
    /// close happened on this call.
    pub fn check_window(&mut self, now_ms: u64) -> bool {
        if self.window_active
            && now_ms.saturating_sub(self.window_start_ms) >= self.window_duration_ms
        {
            self.close_window();
            return true;
        }
        false
    }

    /// Close the window now, freezing the mean of the surviving samples as
    /// the crowding factor. An empty window leaves the previous value.
    pub fn close_window(&mut self) {
        if let Some(mean) = self.mean_rssi() {
            self.last_crowding_factor = map_rssi_to_crowding(mean);
        }
        self.window_active = false;
    }

    /// Current crowding factor.
    ///
    /// While a window is active and holds samples this is the live mean
    /// mapped to `[0, 1]`; otherwise the last frozen value (0.0 if no
    /// window ever completed with samples).
    pub fn calculate_crowding(&self) -> f64 {
        if self.window_active {
            if let Some(mean) = self.mean_rssi() {
                return map_rssi_to_crowding(mean);
            }
        }
        self.last_crowding_factor
    }

    /// Override the crowding factor directly, clamped to `[0, 1]`.
    ///
    /// Used by embedders that measure channel occupancy out of band.
    pub fn set_crowding(&mut self, factor: f64) {
        self.last_crowding_factor = factor.clamp(0.0, 1.0);
    }

    fn mean_rssi(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        let sum: f64 = self
            .samples
            .iter()
            .flatten()
            .map(|s| f64::from(s.rssi_dbm))
            .sum();
        Some(sum / self.len as f64)
    }
}
