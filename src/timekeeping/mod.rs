// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Converts the instrument's AMET counter to GPS time by correlating two
independent 1PPS strobes, and derives the ruler-clock period consumed by
the time-tag integrator (spec.md §4.3, component C3).
*/

pub mod error;

#[cfg(test)]
mod test;

pub use error::TimekeepingError;

use crate::types::{Pce, NUM_PCES};
use log::warn;

/// Depth of every per-source ring buffer.
pub const SAMPLE_HISTORY: usize = 16;

/// 100 MHz ruler-clock domain the AMET counter runs in.
pub const USO_CNTS_PER_SEC: f64 = 100_000_000.0;

/// Divisor that turns a packet's 32-bit GPS sub-second field into a
/// fraction of a second.
const TIME_32BIT_FLOAT_MAX_VALUE: f64 = 4_294_967_296.0;

const DEFAULT_RULER_CLK_PERIOD_NS: f64 = 10.0;

/// Which spacecraft 1PPS source is currently selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sc1ppsSource {
    A,
    B,
}

/// A fixed-size circular buffer of the last [`SAMPLE_HISTORY`] samples.
#[derive(Debug, Clone)]
struct RingBuffer<T> {
    samples: [T; SAMPLE_HISTORY],
    index: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    fn new() -> Self {
        Self {
            samples: [T::default(); SAMPLE_HISTORY],
            index: 0,
        }
    }

    fn push(&mut self, value: T) {
        self.samples[self.index] = value;
        self.index = (self.index + 1) % SAMPLE_HISTORY;
    }

    /// Most recently written sample.
    fn current(&self) -> T {
        let prev = (self.index + SAMPLE_HISTORY - 1) % SAMPLE_HISTORY;
        self.samples[prev]
    }

    /// The sample one step behind `current` (used by the TQ/per-PCE
    /// consecutive-sample frequency calculations).
    fn previous(&self) -> T {
        let prev2 = (self.index + SAMPLE_HISTORY - 2) % SAMPLE_HISTORY;
        self.samples[prev2]
    }

    /// The sample about to be overwritten by the next push: once the
    /// buffer has wrapped at least once, this is the oldest entry,
    /// `SAMPLE_HISTORY - 1` steps behind `current` (used by the
    /// full-buffer USO frequency calculation).
    fn oldest(&self) -> T {
        self.samples[self.index]
    }
}

/// The AMET-to-GPS mapping C4 consumes at the start of each integration
/// period (spec.md §4.3 "Contract to C4").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmetToGpsMapping {
    pub asc_1pps_gps: f64,
    pub asc_1pps_amet: u64,
    pub true_ruler_clk_period_ns: f64,
    pub uso_freq_calc_valid: bool,
}

/// Maintains the sliding correlation windows and the latest AMET/GPS
/// mapping. One instance runs process-wide, fed by the SIM/SXP
/// housekeeping and per-PCE timekeeping packet streams.
pub struct TimekeepingCorrelator {
    sc_1pps_amets: RingBuffer<u64>,
    sc_1pps_gps: RingBuffer<f64>,
    sc_1pps_count: u32,
    sc_1pps_amet: u64,

    asc_1pps_amets: RingBuffer<u64>,
    asc_1pps_gps: RingBuffer<f64>,
    asc_1pps_count: u32,
    asc_1pps_amet: u64,

    sc_to_asc_1pps_amet_delta: i64,

    tq_gps: RingBuffer<f64>,
    tq_count: u32,
    tq_freq: f64,

    mf_gps: [RingBuffer<f64>; NUM_PCES],
    mf_ids: [RingBuffer<u32>; NUM_PCES],
    mf_count: [u32; NUM_PCES],
    mf_freq: [f64; NUM_PCES],

    sc_1pps_source: Sc1ppsSource,
    uso_freq: f64,
    uso_freq_calc: bool,
    true_ruler_clk_period_ns: f64,

    pub statcnt: u32,
    pub errorcnt: u32,
}

impl TimekeepingCorrelator {
    pub fn new() -> Self {
        Self {
            sc_1pps_amets: RingBuffer::new(),
            sc_1pps_gps: RingBuffer::new(),
            sc_1pps_count: 0,
            sc_1pps_amet: 0,
            asc_1pps_amets: RingBuffer::new(),
            asc_1pps_gps: RingBuffer::new(),
            asc_1pps_count: 0,
            asc_1pps_amet: 0,
            sc_to_asc_1pps_amet_delta: 0,
            tq_gps: RingBuffer::new(),
            tq_count: 0,
            tq_freq: 0.0,
            mf_gps: [RingBuffer::new(), RingBuffer::new(), RingBuffer::new()],
            mf_ids: [RingBuffer::new(), RingBuffer::new(), RingBuffer::new()],
            mf_count: [0; NUM_PCES],
            mf_freq: [0.0; NUM_PCES],
            sc_1pps_source: Sc1ppsSource::A,
            uso_freq: USO_CNTS_PER_SEC,
            uso_freq_calc: false,
            true_ruler_clk_period_ns: DEFAULT_RULER_CLK_PERIOD_NS,
            statcnt: 0,
            errorcnt: 0,
        }
    }

    /// Reconstructs a 32-bit 1PPS AMET sample against the current 64-bit
    /// AMET so the result lies in the past relative to `curr_amet`
    /// (spec.md §4.3: "SC 1PPS AMET is reconstructed ... so that it lies
    /// in the past relative to current AMET").
    fn reconstruct_1pps_amet(pps_amet_low: u32, curr_amet: u64) -> u64 {
        let curr_lo = curr_amet & 0xFFFF_FFFF;
        let curr_hi = curr_amet >> 32;
        let pps = pps_amet_low as u64;
        if pps < curr_lo {
            pps + (curr_hi << 32)
        } else {
            pps + (curr_hi.saturating_sub(1) << 32)
        }
    }

    /// Ingests one spacecraft/ground simulator housekeeping sample
    /// (original_source's `parseSimHkPkt`). `curr_amet` is the
    /// instrument's current 64-bit AMET carried in the same packet.
    #[allow(clippy::too_many_arguments)]
    pub fn ingest_spacecraft_1pps(
        &mut self,
        curr_amet: u64,
        asc_1pps_amet_raw: u32,
        sc_a_1pps_amet_raw: u32,
        sc_b_1pps_amet_raw: u32,
        asc_1pps_gps_sec: u32,
        asc_1pps_gps_sub: u32,
        sc_1pps_gps_sec: u32,
        sc_1pps_gps_sub: u32,
        sc_1pps_source: Sc1ppsSource,
    ) -> Result<(), TimekeepingError> {
        if curr_amet == 0 {
            self.errorcnt += 1;
            warn!("timekeeping: rejecting spacecraft 1PPS sample, current AMET is zero");
            return Err(TimekeepingError::ZeroedMandatoryField { field: "curr_amet" });
        }
        if asc_1pps_amet_raw == 0 {
            self.errorcnt += 1;
            warn!("timekeeping: rejecting spacecraft 1PPS sample, ASC 1PPS AMET is zero");
            return Err(TimekeepingError::ZeroedMandatoryField {
                field: "asc_1pps_amet",
            });
        }
        if sc_a_1pps_amet_raw == 0 && sc_b_1pps_amet_raw == 0 {
            self.errorcnt += 1;
            warn!("timekeeping: rejecting spacecraft 1PPS sample, both SC 1PPS AMETs are zero");
            return Err(TimekeepingError::ZeroedMandatoryField { field: "sc_1pps_amet" });
        }
        if asc_1pps_gps_sec == 0 && asc_1pps_gps_sub == 0 {
            self.errorcnt += 1;
            warn!("timekeeping: rejecting spacecraft 1PPS sample, ASC 1PPS GPS time is zero");
            return Err(TimekeepingError::ZeroedMandatoryField {
                field: "asc_1pps_gps",
            });
        }
        if sc_1pps_gps_sec == 0 && sc_1pps_gps_sub == 0 {
            self.errorcnt += 1;
            warn!("timekeeping: rejecting spacecraft 1PPS sample, SC 1PPS GPS time is zero");
            return Err(TimekeepingError::ZeroedMandatoryField { field: "sc_1pps_gps" });
        }

        self.sc_1pps_source = sc_1pps_source;

        let sc_1pps_gps_time =
            sc_1pps_gps_sec as f64 + sc_1pps_gps_sub as f64 / TIME_32BIT_FLOAT_MAX_VALUE;
        self.sc_1pps_gps.push(sc_1pps_gps_time);

        let sc_raw = match sc_1pps_source {
            Sc1ppsSource::A => sc_a_1pps_amet_raw,
            Sc1ppsSource::B => sc_b_1pps_amet_raw,
        };
        self.sc_1pps_amet = Self::reconstruct_1pps_amet(sc_raw, curr_amet);
        self.sc_1pps_amets.push(self.sc_1pps_amet);

        let asc_1pps_gps_time =
            asc_1pps_gps_sec as f64 + asc_1pps_gps_sub as f64 / TIME_32BIT_FLOAT_MAX_VALUE;
        self.asc_1pps_gps.push(asc_1pps_gps_time);
        self.asc_1pps_amet = Self::reconstruct_1pps_amet(asc_1pps_amet_raw, curr_amet);
        self.asc_1pps_amets.push(self.asc_1pps_amet);

        self.sc_to_asc_1pps_amet_delta = self.asc_1pps_amet as i64 - self.sc_1pps_amet as i64;

        self.sc_1pps_count += 1;
        self.asc_1pps_count += 1;

        if self.sc_1pps_count > SAMPLE_HISTORY as u32 {
            let asc_amet_delta = self.asc_1pps_amets.current() as f64 - self.asc_1pps_amets.oldest() as f64;
            let asc_gps_delta = self.asc_1pps_gps.current() - self.asc_1pps_gps.oldest();

            if asc_gps_delta < (SAMPLE_HISTORY as f64 * 0.5) || asc_gps_delta > (SAMPLE_HISTORY as f64 * 1.5) {
                warn!(
                    "timekeeping: GPS is unstable, cumulated time over {SAMPLE_HISTORY} samples: {asc_gps_delta}"
                );
                self.errorcnt += 1;
                self.uso_freq_calc = false;
            } else {
                let cnts_per_sec = asc_amet_delta / asc_gps_delta;
                if (cnts_per_sec - USO_CNTS_PER_SEC).abs() > 1000.0 {
                    warn!("timekeeping: unstable USO measurement, counts per second = {cnts_per_sec}");
                    self.errorcnt += 1;
                    self.uso_freq_calc = false;
                } else {
                    self.uso_freq_calc = true;
                    self.uso_freq = cnts_per_sec;
                    self.true_ruler_clk_period_ns = 1_000_000_000.0 / cnts_per_sec;
                }
            }
        }

        self.statcnt += 1;
        Ok(())
    }

    /// Ingests one SXP housekeeping sample (original_source's
    /// `parseSxpHkPkt`), used only for the TQ frequency diagnostic.
    pub fn ingest_sxp_housekeeping(
        &mut self,
        tq_gps_sec: u32,
        tq_gps_sub: u32,
    ) -> Result<(), TimekeepingError> {
        if tq_gps_sec == 0 {
            self.errorcnt += 1;
            warn!("timekeeping: rejecting SXP housekeeping sample, TQ GPS seconds is zero");
            return Err(TimekeepingError::ZeroedMandatoryField { field: "tq_gps_sec" });
        }

        let tq_time = tq_gps_sec as f64 + tq_gps_sub as f64 / TIME_32BIT_FLOAT_MAX_VALUE;
        self.tq_gps.push(tq_time);
        self.tq_count += 1;

        if self.tq_count > 1 {
            let delta = self.tq_gps.current() - self.tq_gps.previous();
            self.tq_freq = 1.0 / delta;
        }

        self.statcnt += 1;
        Ok(())
    }

    /// Ingests one per-PCE timekeeping sample (original_source's
    /// `parseTimekeepingPkt`), used only for the per-PCE major-frame
    /// frequency diagnostic.
    pub fn ingest_pce_timekeeping(
        &mut self,
        pce: Pce,
        mf_gps_sec: u32,
        mf_gps_sub: u32,
        mf_gps_cnt: u32,
    ) -> Result<(), TimekeepingError> {
        if mf_gps_sec == 0 {
            self.errorcnt += 1;
            warn!("timekeeping: rejecting PCE timekeeping sample, MF GPS seconds is zero");
            return Err(TimekeepingError::ZeroedMandatoryField { field: "mf_gps_sec" });
        }

        let idx = pce.index();
        let mf_time = mf_gps_sec as f64 + mf_gps_sub as f64 / TIME_32BIT_FLOAT_MAX_VALUE;
        self.mf_gps[idx].push(mf_time);
        self.mf_ids[idx].push(mf_gps_cnt);
        self.mf_count[idx] += 1;

        if self.mf_count[idx] > 1 {
            let gps_delta = self.mf_gps[idx].current() - self.mf_gps[idx].previous();
            let cnt_delta = self.mf_ids[idx].current() as f64 - self.mf_ids[idx].previous() as f64;
            self.mf_freq[idx] = cnt_delta / gps_delta;
        }

        self.statcnt += 1;
        Ok(())
    }

    /// The mapping C4 pulls at the start of each integration period.
    pub fn get_ameto_gps_mapping(&self) -> AmetToGpsMapping {
        AmetToGpsMapping {
            asc_1pps_gps: self.asc_1pps_gps.current(),
            asc_1pps_amet: self.asc_1pps_amet,
            true_ruler_clk_period_ns: self.true_ruler_clk_period_ns,
            uso_freq_calc_valid: self.uso_freq_calc,
        }
    }

    pub fn uso_freq(&self) -> f64 {
        self.uso_freq
    }

    pub fn tq_freq(&self) -> f64 {
        self.tq_freq
    }

    pub fn mf_freq(&self, pce: Pce) -> f64 {
        self.mf_freq[pce.index()]
    }

    pub fn sc_to_asc_1pps_amet_delta(&self) -> i64 {
        self.sc_to_asc_1pps_amet_delta
    }
}

impl Default for TimekeepingCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes `gps = asc_1pps_gps + (amet - asc_1pps_amet) * period_ns / 1e9`
/// when the mapping is valid (spec.md §4.3 "Contract to C4"). Returns
/// `None` when `mapping.uso_freq_calc_valid` is false, in which case the
/// caller should leave gps at zero and skip GPS-based cross-checks.
pub fn amet_to_gps(mapping: &AmetToGpsMapping, amet: u64) -> Option<f64> {
    if !mapping.uso_freq_calc_valid {
        return None;
    }
    let delta_amet = amet as i64 - mapping.asc_1pps_amet as i64;
    Some(mapping.asc_1pps_gps + delta_amet as f64 * mapping.true_ruler_clk_period_ns / 1e9)
}
