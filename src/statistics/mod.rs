// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Running packet/channel/transmit/signal statistics (spec.md §4.5,
component C5). Every record exposes a `lock()`-bracketed mutation
protocol so the report writer (C6) can snapshot a consistent view.
*/

use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
mod test;

const NUM_CHANNELS: usize = 20;
const MAX_FINE_COUNT: usize = 75;
const NUM_SPOTS: usize = 2;

/// Running-average update: `avg_(n+1) = (n*avg_n + x) / (n+1)`
/// (spec.md §4.5).
fn running_avg(avg: f64, n: u32, x: f64) -> f64 {
    (avg * n as f64 + x) / (n as f64 + 1.0)
}

/// Per-PCE packet-level error/warning taxonomy and tag-count running
/// stats (original_source's `pktStat_t`).
#[derive(Debug, Clone, Default)]
pub struct PacketStats {
    pub segcnt: u32,
    pub pktcnt: u32,
    pub mfc_errors: u32,
    pub hdr_errors: u32,
    pub fmt_errors: u32,
    pub dlb_errors: u32,
    pub tag_errors: u32,
    pub pkt_errors: u32,
    pub warnings: u32,
    pub sum_tags: u32,
    pub min_tags: u32,
    pub max_tags: u32,
    pub avg_tags: f64,
}

impl PacketStats {
    pub fn new() -> Self {
        Self {
            min_tags: u32::MAX,
            ..Default::default()
        }
    }

    /// Folds one packet's tag count (excludes transmit tags, per the
    /// original's comment) into the running min/max/avg.
    pub fn update_tag_count(&mut self, tags: u32) {
        self.sum_tags += tags;
        self.min_tags = self.min_tags.min(tags);
        self.max_tags = self.max_tags.max(tags);
        self.avg_tags = running_avg(self.avg_tags, self.pktcnt, tags as f64);
        self.pktcnt += 1;
    }
}

/// Per-channel TDC calibration and dead-time tracking
/// (original_source's `chStat_t`). `cell_cnts` is the fine-time
/// histogram recovered from the original for diagnosing TDC nonlinearity
/// (SPEC_FULL.md §F).
#[derive(Debug, Clone)]
pub struct ChannelStats {
    pub statcnt: u32,
    pub rx_cnt: [u32; NUM_CHANNELS],
    pub num_dupr: [u32; NUM_CHANNELS],
    pub num_dupf: [u32; NUM_CHANNELS],
    pub cell_cnts: Box<[[u32; MAX_FINE_COUNT]; NUM_CHANNELS]>,
    pub tdc_calr: [f64; NUM_CHANNELS],
    pub min_calr: [f64; NUM_CHANNELS],
    pub max_calr: [f64; NUM_CHANNELS],
    pub avg_calr: [f64; NUM_CHANNELS],
    pub tdc_calf: [f64; NUM_CHANNELS],
    pub min_calf: [f64; NUM_CHANNELS],
    pub max_calf: [f64; NUM_CHANNELS],
    pub avg_calf: [f64; NUM_CHANNELS],
    pub bias: [f64; NUM_CHANNELS],
    pub dead_time: [f64; NUM_CHANNELS],
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            statcnt: 0,
            rx_cnt: [0; NUM_CHANNELS],
            num_dupr: [0; NUM_CHANNELS],
            num_dupf: [0; NUM_CHANNELS],
            cell_cnts: Box::new([[0; MAX_FINE_COUNT]; NUM_CHANNELS]),
            tdc_calr: [0.0; NUM_CHANNELS],
            min_calr: [f64::MAX; NUM_CHANNELS],
            max_calr: [0.0; NUM_CHANNELS],
            avg_calr: [0.0; NUM_CHANNELS],
            tdc_calf: [0.0; NUM_CHANNELS],
            min_calf: [f64::MAX; NUM_CHANNELS],
            max_calf: [0.0; NUM_CHANNELS],
            avg_calf: [0.0; NUM_CHANNELS],
            bias: [0.0; NUM_CHANNELS],
            dead_time: [f64::MAX; NUM_CHANNELS],
        }
    }
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn ch(channel: u8) -> usize {
        channel as usize - 1
    }

    pub fn inc_rx(&mut self, channel: u8) {
        self.rx_cnt[Self::ch(channel)] += 1;
    }

    pub fn inc_cell(&mut self, channel: u8, fine: u8) {
        if let Some(cell) = self.cell_cnts[Self::ch(channel)].get_mut(fine as usize) {
            *cell += 1;
        }
    }

    /// Folds one period's header calibration values (`cvr`/`cvf`) into the
    /// running per-channel TDC average, weighted by `statcnt` (spec.md
    /// §4.4.3 "Channel stats update" — called once per channel per period,
    /// independent of how many tags the channel saw).
    pub fn update_tdc_cal(&mut self, channel: u8, cvr_ns: f64, cvf_ns: f64) {
        let i = Self::ch(channel);
        self.tdc_calr[i] = running_avg(self.tdc_calr[i], self.statcnt, cvr_ns);
        self.tdc_calf[i] = running_avg(self.tdc_calf[i], self.statcnt, cvf_ns);
    }

    /// Folds one dead-time-chain-span duplicate's deduced calibration
    /// value into the running rising/falling-edge average, min and max,
    /// then counts it (spec.md §4.4.2 "Duplicate by dead-time").
    pub fn record_duplicate_calibration(&mut self, channel: u8, edge: crate::types::Edge, calval_ns: f64) {
        let i = Self::ch(channel);
        match edge {
            crate::types::Edge::Rising => {
                self.avg_calr[i] = running_avg(self.avg_calr[i], self.num_dupr[i], calval_ns);
                self.min_calr[i] = self.min_calr[i].min(calval_ns);
                self.max_calr[i] = self.max_calr[i].max(calval_ns);
                self.num_dupr[i] += 1;
            }
            crate::types::Edge::Falling => {
                self.avg_calf[i] = running_avg(self.avg_calf[i], self.num_dupf[i], calval_ns);
                self.min_calf[i] = self.min_calf[i].min(calval_ns);
                self.max_calf[i] = self.max_calf[i].max(calval_ns);
                self.num_dupf[i] += 1;
            }
        }
    }

    /// Folds one period's histogram-derived channel bias into the running
    /// average, weighted by `statcnt` (original_source's
    /// `chStat->rec->bias[ch] = integrateAverage(...)`, called only for
    /// channels `getChBiases` marked valid this period).
    pub fn update_bias(&mut self, channel: u8, bias: f64) {
        let i = Self::ch(channel);
        self.bias[i] = running_avg(self.bias[i], self.statcnt, bias);
    }

    /// Dead time is tracked as the minimum opposite-edge range delta
    /// observed on the channel (spec.md §4.4.3 "Dead-time stats").
    pub fn update_dead_time(&mut self, channel: u8, delta_ns: f64) {
        let i = Self::ch(channel);
        self.dead_time[i] = self.dead_time[i].min(delta_ns);
    }
}

/// Per-spot transmit-shot statistics (original_source's `txStat_t`).
/// `min_tags`/`max_tags`/`avg_tags`/`std_tags` are per-spot arrays
/// recovered from the original (SPEC_FULL.md §F); the spec's prose only
/// restates them in aggregate.
#[derive(Debug, Clone)]
pub struct TransmitStats {
    pub statcnt: u32,
    pub txcnt: u32,
    pub min_tags: [u32; NUM_SPOTS],
    pub max_tags: [u32; NUM_SPOTS],
    pub avg_tags: [f64; NUM_SPOTS],
    pub std_tags: [f64; NUM_SPOTS],
    pub min_delta: f64,
    pub max_delta: f64,
    pub avg_delta: f64,
}

impl Default for TransmitStats {
    fn default() -> Self {
        Self {
            statcnt: 0,
            txcnt: 0,
            min_tags: [u32::MAX; NUM_SPOTS],
            max_tags: [0; NUM_SPOTS],
            avg_tags: [0.0; NUM_SPOTS],
            std_tags: [0.0; NUM_SPOTS],
            min_delta: f64::MAX,
            max_delta: 0.0,
            avg_delta: 0.0,
        }
    }
}

impl TransmitStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one shot's per-spot return count into the running
    /// min/max/avg. Truncated shots must not update `min_tags`
    /// (spec.md §4.4.3).
    pub fn update_tag_count(&mut self, spot: usize, tags: u32, truncated: bool) {
        if !truncated {
            self.min_tags[spot] = self.min_tags[spot].min(tags);
        }
        self.max_tags[spot] = self.max_tags[spot].max(tags);
        self.avg_tags[spot] = running_avg(self.avg_tags[spot], self.txcnt, tags as f64);
    }

    pub fn update_delta(&mut self, delta_ns: f64) {
        self.min_delta = self.min_delta.min(delta_ns);
        self.max_delta = self.max_delta.max(delta_ns);
        self.avg_delta = running_avg(self.avg_delta, self.txcnt, delta_ns);
        self.txcnt += 1;
    }
}

/// Per-spot signal-detection snapshot (original_source's `sigStat_t`).
#[derive(Debug, Clone, Default)]
pub struct SignalStats {
    pub statcnt: u32,
    pub rws: [f64; NUM_SPOTS],
    pub rww: [f64; NUM_SPOTS],
    pub sigrng: [f64; NUM_SPOTS],
    pub bkgnd: [f64; NUM_SPOTS],
    pub sigpes: [f64; NUM_SPOTS],
    pub teppe: [f64; NUM_SPOTS],
}

impl SignalStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one period's per-spot signal snapshot into the running
    /// integrating average (original_source's `TimeTagProcessorModule`
    /// `sigStat->rec->rws[s] = integrateAverage(...)` block, called once
    /// per period after both spots' histograms are finalized).
    #[allow(clippy::too_many_arguments)]
    pub fn update(&mut self, spot: usize, rws: f64, rww: f64, sigrng: f64, bkgnd: f64, sigpes: f64, teppe: f64) {
        self.rws[spot] = running_avg(self.rws[spot], self.statcnt, rws);
        self.rww[spot] = running_avg(self.rww[spot], self.statcnt, rww);
        self.sigrng[spot] = running_avg(self.sigrng[spot], self.statcnt, sigrng);
        self.bkgnd[spot] = running_avg(self.bkgnd[spot], self.statcnt, bkgnd);
        self.sigpes[spot] = running_avg(self.sigpes[spot], self.statcnt, sigpes);
        self.teppe[spot] = running_avg(self.teppe[spot], self.statcnt, teppe);
    }

    /// Bumps the shared sample counter once both spots have been folded in
    /// for this period (mirrors the original's single `statcnt++` after
    /// its per-spot loop).
    pub fn tick(&mut self) {
        self.statcnt += 1;
    }
}

/// Wraps a statistic record behind a mutex, matching the original's
/// `lock()`/`unlock()`-bracketed mutation with a single-reader snapshot
/// for C6 (spec.md §4.5).
pub struct LockedStat<T> {
    inner: Mutex<T>,
}

impl<T: Clone> LockedStat<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Locks the record for in-place mutation.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().expect("statistics mutex poisoned")
    }

    /// Takes a consistent snapshot under the same lock C4 mutates
    /// through.
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }
}
