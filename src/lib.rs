// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Ground-processing core for the ATLAS laser-altimeter time-tag integration
pipeline: per-PCE segment reassembly and tag decoding (component C4), the
shared major-frame diagnostic cache (C2) and AMET→GPS timekeeping
correlator (C3), histogram records (C1), running statistics (C5), and a
CSV report writer facade (C6).

CCSDS framing/segment reassembly, command dispatch, the GUI/HSTVS
simulator, GeoRaster sampling, and the altimetric histogram parser are all
out of scope — this crate consumes already-reassembled segment buffers and
produces histograms, statistics, and CSV rows.
*/

#[macro_use]
extern crate lazy_static;

pub mod error;
pub mod histogram;
pub mod major_frame;
pub mod misc;
pub mod report;
pub mod statistics;
pub mod time_tag;
pub mod timekeeping;
pub mod types;

pub use error::AtlasError;
pub use histogram::Histogram;
pub use major_frame::{MajorFrameCache, MajorFrameSnapshot};
pub use time_tag::{TimeTagConfig, TimeTagIntegrator};
pub use timekeeping::TimekeepingCorrelator;

use std::sync::Mutex;

use time_tag::GRANULE_HIST_SIZE;

lazy_static! {
    /// Process-wide ruler-clock period (ns), single-writer (C3) /
    /// multi-reader (C4) per spec.md §9. Readers snapshot it once per
    /// integration period via [`ruler_clk_period`].
    static ref RULER_CLK_PERIOD_NS: Mutex<f64> = Mutex::new(10.0);

    /// Process-wide cross-period "signalRange - range" granule histogram,
    /// shared across every PCE/spot (spec.md §4.4.3, SPEC_FULL.md §F.3).
    /// Indexed `[spot][GRANULE_HIST_SIZE/2 + bin]`.
    static ref GRANULE_HISTOGRAM: Mutex<[[i64; GRANULE_HIST_SIZE]; 2]> =
        Mutex::new([[0; GRANULE_HIST_SIZE]; 2]);
}

/// Snapshots the current process-wide ruler-clock period (ns). Called by
/// `TimeTagIntegrator` at the start of each integration period when
/// `autoSetRulerClk` is enabled.
pub fn ruler_clk_period_ns() -> f64 {
    *RULER_CLK_PERIOD_NS.lock().expect("ruler clock mutex poisoned")
}

/// Overwrites the process-wide ruler-clock period (ns). Called by the
/// timekeeping correlator whenever it derives a new stable USO measurement.
pub fn set_ruler_clk_period_ns(period_ns: f64) {
    *RULER_CLK_PERIOD_NS.lock().expect("ruler clock mutex poisoned") = period_ns;
}

/// Locks and returns a clone of the shared granule histogram for `spot`
/// (spot index 0 = strong, 1 = weak).
pub fn granule_histogram_snapshot(spot_index: usize) -> Vec<i64> {
    GRANULE_HISTOGRAM.lock().expect("granule histogram mutex poisoned")[spot_index].to_vec()
}

/// Increments one bin of the shared granule histogram under its mutex
/// (spec.md §5 "Granule histogram": "per-mutex; writers atomic-increment
/// at integer-rounded bin indices").
pub fn granule_histogram_inc(spot_index: usize, bin_index: usize) {
    let mut hist = GRANULE_HISTOGRAM.lock().expect("granule histogram mutex poisoned");
    if let Some(slot) = hist[spot_index].get_mut(bin_index) {
        *slot += 1;
    }
}
