// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Runtime-tunable knobs for the time-tag integrator (spec.md §4.4.1).
*/

use crate::types::Correction;

pub const NUM_CHANNELS: usize = 20;
pub const MAX_NUM_SHOTS: usize = 201;
pub const MAX_RX_PER_SHOT: usize = 1000;
pub const GRANULE_HIST_SIZE: usize = 2000;
pub const MIN_FINE_TIME_CAL_NS: f64 = 0.1;
pub const MAX_FINE_TIME_CAL_NS: f64 = 0.3;
pub const DETECTOR_DEAD_TIME_NS: f64 = 1.0;
pub const MAX_NUM_DLBS: usize = 4;
/// Fine-time counts in `[0, MAX_FINE_COUNT)` are valid; spec.md §4.4.2
/// "Return" rejects `fine >= 75` as a format error.
pub const MAX_FINE_COUNT: usize = 75;

#[derive(Debug, Clone)]
pub struct TimeTagConfig {
    pub remove_duplicates: bool,
    pub true_ruler_clk_period_ns: f64,
    pub auto_set_ruler_clk: bool,
    pub signal_width_ns: f64,
    pub correction: Correction,
    pub full_column_integration: bool,
    pub gps_accuracy_tolerance_s: f64,
    pub tep_location_ns: f64,
    pub tep_width_ns: f64,
    pub block_tep: bool,
    pub loopback_location_ns: f64,
    pub loopback_width_ns: f64,
    pub time_tag_bin_size_m: f64,
    pub time_tag_zoom_offset_ns: f64,
    pub channel_disable: [bool; NUM_CHANNELS],
    /// `{off|mfc}` per spec.md §6: `None` disables the diagnostic, `Some(mfc)`
    /// requests an intermediate histogram emission the moment a segment
    /// carrying that MFC is processed, without ending the period.
    pub build_up_mfc: Option<u64>,
}

/// Stock bin size: `1.5 * 3/20` meters, the default TDC-tick-to-meters
/// scaling spec.md §4.4.1 calls out explicitly.
pub const DEFAULT_TIME_TAG_BIN_SIZE_M: f64 = 1.5 * 3.0 / 20.0;

impl Default for TimeTagConfig {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            true_ruler_clk_period_ns: 10.0,
            auto_set_ruler_clk: false,
            signal_width_ns: 0.0,
            correction: Correction::default(),
            full_column_integration: false,
            gps_accuracy_tolerance_s: 1e-5,
            tep_location_ns: 18.0,
            tep_width_ns: 5.0,
            block_tep: true,
            loopback_location_ns: 75.0,
            loopback_width_ns: 100.0,
            time_tag_bin_size_m: DEFAULT_TIME_TAG_BIN_SIZE_M,
            time_tag_zoom_offset_ns: 0.0,
            channel_disable: [false; NUM_CHANNELS],
            build_up_mfc: None,
        }
    }
}

impl TimeTagConfig {
    pub fn channel_enabled(&self, channel: u8) -> bool {
        !self.channel_disable[channel as usize - 1]
    }

    /// `true` when `time_tag_bin_size_m` is below the default, meaning
    /// range is expressed relative to `rws + zoomOffset` rather than just
    /// `rws` (spec.md §4.4.2 "Binning").
    pub fn is_zoom_mode(&self) -> bool {
        self.time_tag_bin_size_m < DEFAULT_TIME_TAG_BIN_SIZE_M
    }
}
