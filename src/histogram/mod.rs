// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The integration-period output record: a fixed-capacity bin array plus the
derived signal attributes every downstream consumer reads (spec.md §4.1,
component C1).
*/

pub mod error;

#[cfg(test)]
mod test;

pub use error::HistogramError;

use crate::major_frame::MajorFrameSnapshot;
use crate::statistics::PacketStats;
use crate::types::{DownlinkBand, HistogramType};

/// Largest bin array any histogram can grow to (spec.md §4.1).
pub const MAX_HIST_SIZE: usize = 10000;

/// Number of tracked running maxima in [`Histogram::calc_attributes`].
pub const NUM_MAX_BINS: usize = 3;

/// Default signal-search filter width, in meters, when the caller does
/// not override it with an explicit signal width.
const HISTOGRAM_DEFAULT_FILTER_WIDTH_M: f64 = 1.5;

const NUM_CHANNELS: usize = 20;
const MAX_NUM_DLBS: usize = 4;

/// The extra fields only time-tag histograms (as opposed to pre-binned
/// altimetric/atmospheric histograms) carry (original_source's
/// `TimeTagHistogram::ttHist_t`).
#[derive(Debug, Clone)]
pub struct TimeTagExtra {
    pub channel_biases: [f64; NUM_CHANNELS],
    pub channel_bias_set: [bool; NUM_CHANNELS],
    pub channel_counts: [i32; NUM_CHANNELS],
    /// Running sum/count of the histogram bin each retained return landed
    /// in, per channel, feeding [`Histogram::extract_channel_biases`].
    channel_bin_sum: [f64; NUM_CHANNELS],
    channel_bin_count: [u32; NUM_CHANNELS],
    pub downlink_bands: Vec<DownlinkBand>,
    pub downlink_bands_tag_count: [i32; MAX_NUM_DLBS],
    pub pkt_stats: PacketStats,
}

impl TimeTagExtra {
    pub fn new(downlink_bands: Vec<DownlinkBand>, pkt_stats: PacketStats) -> Self {
        Self {
            channel_biases: [0.0; NUM_CHANNELS],
            channel_bias_set: [false; NUM_CHANNELS],
            channel_counts: [0; NUM_CHANNELS],
            channel_bin_sum: [0.0; NUM_CHANNELS],
            channel_bin_count: [0; NUM_CHANNELS],
            downlink_bands,
            downlink_bands_tag_count: [0; MAX_NUM_DLBS],
            pkt_stats,
        }
    }

    pub fn inc_channel_count(&mut self, channel: u8) {
        if let Some(c) = self.channel_counts.get_mut(channel as usize - 1) {
            *c += 1;
        }
    }
}

/// A per-spot, per-integration-period histogram record (original_source's
/// `AtlasHistogram`/`AltimetryHistogram`/`TimeTagHistogram` collapsed into
/// one tagged type, since the spec distinguishes subtypes only by
/// [`HistogramType`] and an optional time-tag payload).
#[derive(Debug, Clone)]
pub struct Histogram {
    pub hist_type: HistogramType,
    pub integration_period: i64,
    pub bin_size_m: f64,
    pub pce_index: usize,
    pub mfc: u64,
    pub major_frame: Option<MajorFrameSnapshot>,
    pub gps_at_major_frame: f64,
    pub range_window_start: f64,
    pub range_window_width: f64,

    pub transmit_count: i32,
    pub noise_floor: f64,
    pub noise_bin: f64,
    pub signal_range: f64,
    pub signal_width: f64,
    pub signal_energy: f64,
    pub tep_energy: f64,
    pub pkt_bytes: i64,
    pub pkt_errors: i64,

    /// Count of returns flagged as a transmit/receive "slip" during this
    /// period's post-period reductions (spec.md §4.4.3 "Slip detection").
    pub slip_count: i32,

    pub ignore_start_bin: i32,
    pub ignore_stop_bin: i32,

    pub max_val: [i64; NUM_MAX_BINS],
    pub max_bin: [i32; NUM_MAX_BINS],
    pub begin_sig_bin: i32,
    pub end_sig_bin: i32,

    size: usize,
    sum: i64,
    bins: Vec<i64>,

    pub extra: Option<TimeTagExtra>,
}

impl Histogram {
    pub fn new(
        hist_type: HistogramType,
        integration_period: i64,
        bin_size_m: f64,
        pce_index: usize,
        mfc: u64,
        major_frame: Option<MajorFrameSnapshot>,
        gps_at_major_frame: f64,
        range_window_start: f64,
        range_window_width: f64,
    ) -> Result<Self, HistogramError> {
        if bin_size_m <= 0.0 {
            return Err(HistogramError::NonPositiveBinSize(bin_size_m));
        }
        if integration_period <= 0 {
            return Err(HistogramError::NonPositiveIntegrationPeriod(integration_period));
        }

        Ok(Self {
            hist_type,
            integration_period,
            bin_size_m,
            pce_index,
            mfc,
            major_frame,
            gps_at_major_frame,
            range_window_start,
            range_window_width,
            transmit_count: 0,
            noise_floor: 0.0,
            noise_bin: 0.0,
            signal_range: 0.0,
            signal_width: 0.0,
            signal_energy: 0.0,
            tep_energy: 0.0,
            pkt_bytes: 0,
            pkt_errors: 0,
            slip_count: 0,
            ignore_start_bin: 0,
            ignore_stop_bin: 0,
            max_val: [0; NUM_MAX_BINS],
            max_bin: [0; NUM_MAX_BINS],
            begin_sig_bin: 0,
            end_sig_bin: 0,
            size: 0,
            sum: 0,
            bins: vec![0; MAX_HIST_SIZE],
            extra: None,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn in_range(bin: i64) -> bool {
        (0..MAX_HIST_SIZE as i64).contains(&bin)
    }

    /// Overwrites `bin`, extending `size` if this is the highest bin
    /// touched so far. Out-of-range bins are a no-op (spec.md §4.1).
    pub fn set_bin(&mut self, bin: i64, val: i64) -> bool {
        if !Self::in_range(bin) {
            return false;
        }
        let bin = bin as usize;
        self.sum -= self.bins[bin];
        self.bins[bin] = val;
        self.sum += val;
        if bin >= self.size {
            self.size = bin + 1;
        }
        true
    }

    pub fn add_bin(&mut self, bin: i64, val: i64) -> bool {
        if !Self::in_range(bin) {
            return false;
        }
        let bin = bin as usize;
        self.bins[bin] += val;
        self.sum += val;
        if bin >= self.size {
            self.size = bin + 1;
        }
        true
    }

    pub fn inc_bin(&mut self, bin: i64) -> bool {
        self.add_bin(bin, 1)
    }

    pub fn get_bin(&self, bin: i64) -> i64 {
        if Self::in_range(bin) && (bin as usize) < self.size {
            self.bins[bin as usize]
        } else {
            0
        }
    }

    pub fn get_sum(&self) -> i64 {
        self.sum
    }

    pub fn get_mean(&self) -> f64 {
        if self.size > 0 {
            self.sum as f64 / self.size as f64
        } else {
            0.0
        }
    }

    pub fn get_stdev(&self) -> f64 {
        if self.size <= 1 {
            return 0.0;
        }
        let mean = self.get_mean();
        let diffsum: f64 = self.bins[..self.size]
            .iter()
            .map(|&b| {
                let diff = b as f64 - mean;
                diff * diff
            })
            .sum();
        (diffsum / (self.size - 1) as f64).sqrt()
    }

    /// `stop` is exclusive; a `stop < start` defaults to `size`.
    pub fn get_min(&self, start: i64, stop: i64) -> i64 {
        let stop = if stop < start { self.size as i64 } else { stop };
        let start = start.max(0) as usize;
        let stop = (stop.max(0) as usize).min(self.size);
        self.bins[start..stop].iter().copied().min().unwrap_or(i64::MAX)
    }

    pub fn get_max(&self, start: i64, stop: i64) -> i64 {
        let stop = if stop < start { self.size as i64 } else { stop };
        let start = start.max(0) as usize;
        let stop = (stop.max(0) as usize).min(self.size);
        self.bins[start..stop].iter().copied().max().unwrap_or(0)
    }

    /// `stop_bin` is inclusive, matching original_source's `getSumRange`.
    pub fn get_sum_range(&self, start_bin: i64, stop_bin: i64) -> i64 {
        let safe_start = start_bin.max(0) as usize;
        let safe_stop = ((stop_bin + 1).max(0) as usize).min(self.size);
        if safe_start >= safe_stop {
            return 0;
        }
        self.bins[safe_start..safe_stop].iter().sum()
    }

    pub fn scale(&mut self, factor: f64) {
        self.sum = 0;
        for b in &mut self.bins[..self.size] {
            *b = (*b as f64 * factor) as i64;
            self.sum += *b;
        }
    }

    pub fn add_scalar(&mut self, scalar: i64) {
        self.sum = 0;
        for b in &mut self.bins[..self.size] {
            *b += scalar;
            self.sum += *b;
        }
    }

    pub fn set_ignore(&mut self, start: i32, stop: i32) {
        self.ignore_start_bin = start;
        self.ignore_stop_bin = stop;
    }

    pub fn set_pkt_bytes(&mut self, bytes: i64) {
        self.pkt_bytes = bytes;
    }

    pub fn add_pkt_bytes(&mut self, bytes: i64) {
        self.pkt_bytes += bytes;
    }

    pub fn set_pkt_errors(&mut self, errors: i64) {
        self.pkt_errors = errors;
    }

    pub fn add_pkt_errors(&mut self, errors: i64) {
        self.pkt_errors += errors;
    }

    pub fn set_transmit_count(&mut self, count: i32) {
        self.transmit_count = count;
    }

    pub fn add_transmit_count(&mut self, count: i32) {
        self.transmit_count += count;
    }

    pub fn set_tep_energy(&mut self, energy: f64) {
        self.tep_energy = energy;
    }

    pub fn set_slip_count(&mut self, count: i32) {
        self.slip_count = count;
    }

    /// Records the bin one retained return landed in, folded per channel
    /// (original_source's `TimeTagHistogram::binTag`). Feeds
    /// [`Self::extract_channel_biases`]; a no-op for histograms with no
    /// `extra` payload.
    pub fn record_channel_bin(&mut self, channel: u8, bin: i64) {
        let Some(extra) = self.extra.as_mut() else { return };
        let Some(slot) = (channel as usize).checked_sub(1).filter(|&i| i < NUM_CHANNELS) else {
            return;
        };
        extra.channel_bin_sum[slot] += bin as f64;
        extra.channel_bin_count[slot] += 1;
    }

    /// Derives each channel's timing bias as the offset of that channel's
    /// mean retained-return bin from the period's detected signal centroid
    /// (original_source's `TimeTagHistogram::getChBiases`, called once per
    /// spot over its channel range). Must run after [`Self::calc_attributes`]
    /// so `begin_sig_bin`/`end_sig_bin` are current. Channels with no
    /// retained returns this period are left unset.
    pub fn extract_channel_biases(&mut self, true_10ns: f64) {
        let bin_size_m = self.bin_size_m;
        let begin = self.begin_sig_bin.max(0) as usize;
        let end = self.end_sig_bin.max(0) as usize;
        let sigloc = crate::misc::weighted_centroid(&self.bins, begin, end);

        let Some(extra) = self.extra.as_mut() else { return };
        for ch in 0..NUM_CHANNELS {
            if extra.channel_bin_count[ch] > 0 {
                let mean_bin = extra.channel_bin_sum[ch] / extra.channel_bin_count[ch] as f64;
                extra.channel_biases[ch] = (mean_bin - sigloc) * bin_size_m * (true_10ns / 1.5);
                extra.channel_bias_set[ch] = true;
            }
        }
    }

    /// Reproduces `AtlasHistogram::calcAttributes` followed, for altimetric
    /// and time-tag subtypes, by `AltimetryHistogram::calcAttributes`'s
    /// background/signal-range/signal-energy overrides
    /// (original_source's `AtlasHistogram.cpp` / `AltimetryHistogram.cpp`).
    ///
    /// `sig_width_ns` of 0.0 auto-sizes the search filter from
    /// [`HISTOGRAM_DEFAULT_FILTER_WIDTH_M`]; a nonzero value is treated as
    /// an override and restores the first-pass signal window afterward.
    /// `true_10ns` is the calibration period (spec.md's `trueRulerClkPeriod`)
    /// in nanoseconds, nominally 10.0. Returns whether a signal was found.
    pub fn calc_attributes(&mut self, sig_width_ns: f64, true_10ns: f64) -> bool {
        self.max_val = [0; NUM_MAX_BINS];
        self.max_bin = [0; NUM_MAX_BINS];

        for i in 0..self.size {
            let val = self.bins[i];
            let mut rank = NUM_MAX_BINS;
            for j in 0..NUM_MAX_BINS {
                if val > self.max_val[(NUM_MAX_BINS - 1) - j] {
                    rank -= 1;
                } else {
                    break;
                }
            }
            if rank < NUM_MAX_BINS {
                for k in (rank + 1..NUM_MAX_BINS).rev() {
                    self.max_val[k] = self.max_val[k - 1];
                    self.max_bin[k] = self.max_bin[k - 1];
                }
                self.max_val[rank] = val;
                self.max_bin[rank] = i as i32;
            }
        }

        let filter_width_bins: i64 = if sig_width_ns == 0.0 {
            (HISTOGRAM_DEFAULT_FILTER_WIDTH_M / self.bin_size_m).ceil() as i64
        } else {
            (sig_width_ns * (3.0 / 20.0) / self.bin_size_m).round() as i64
        };
        let filter_width_bins = filter_width_bins.max(0) as usize;

        let mut maxval: i64 = 0;
        let mut maxbin: usize = 0;
        let nsize = self.size.saturating_sub(filter_width_bins) + 1;
        for n in 0..nsize.min(self.size) {
            let mut sum: i64 = 0;
            for m in 0..filter_width_bins {
                let b = n + m;
                if b >= self.size {
                    break;
                }
                if (b as i32) < self.ignore_start_bin || (b as i32) >= self.ignore_stop_bin {
                    sum += self.bins[b];
                }
            }
            if sum > maxval {
                maxval = sum;
                maxbin = n;
            }
        }

        let mut begin_sigbin = maxbin as i64;
        let mut end_sigbin = (maxbin + filter_width_bins) as i64;
        let saved_begin_sigbin = begin_sigbin;
        let saved_end_sigbin = end_sigbin;

        let thresh_bins = self.size as f64 - filter_width_bins as f64;
        let thresh_events_per_bin = if thresh_bins > 0.0 {
            (self.sum - maxval) as f64 / thresh_bins
        } else {
            0.0
        };
        let edge_thresh = thresh_events_per_bin + thresh_events_per_bin.sqrt();

        let mut maxval = self.bins.get(begin_sigbin as usize).copied().unwrap_or(0);
        let mut maxbin = begin_sigbin;
        let mut i = begin_sigbin;
        while i < end_sigbin && (i as usize) < self.size {
            if self.bins[i as usize] > maxval {
                maxval = self.bins[i as usize];
                maxbin = i;
            }
            i += 1;
        }

        self.signal_width = 1.0;

        begin_sigbin = maxbin;
        while begin_sigbin > 0 && self.bins[begin_sigbin as usize] as f64 > edge_thresh {
            begin_sigbin -= 1;
            self.signal_width += 1.0;
        }
        if begin_sigbin > 0 {
            begin_sigbin -= 1;
        }

        end_sigbin = maxbin;
        while (end_sigbin as usize) < self.size && self.bins[end_sigbin as usize] as f64 > edge_thresh {
            end_sigbin += 1;
            self.signal_width += 1.0;
        }
        if end_sigbin < self.size as i64 - 1 {
            end_sigbin += 1;
        }

        self.signal_width = self.signal_width * self.bin_size_m * 20.0 / 3.0;

        if sig_width_ns != 0.0 {
            begin_sigbin = saved_begin_sigbin;
            end_sigbin = saved_end_sigbin;
        }

        // A blocked TEP region must never be reported as part of the
        // detected signal window (spec.md §8 invariant 7): clamp the
        // window to whichever side of the ignore region the true peak
        // falls on.
        if self.ignore_start_bin < self.ignore_stop_bin {
            let ignore_start = self.ignore_start_bin as i64;
            let ignore_stop = self.ignore_stop_bin as i64;
            if maxbin < ignore_start {
                end_sigbin = end_sigbin.min(ignore_start - 1);
            } else if maxbin >= ignore_stop {
                begin_sigbin = begin_sigbin.max(ignore_stop);
            }
        }

        self.begin_sig_bin = begin_sigbin.max(0) as i32;
        self.end_sig_bin = end_sigbin.min(self.size as i64 - 1) as i32;

        if self.hist_type.is_altimetric() || self.hist_type.is_time_tag() {
            self.calc_signal_attributes(true_10ns)
        } else {
            true
        }
    }

    /// Noise floor, bin-weighted signal range, and signal energy
    /// (original_source's `AltimetryHistogram::calcAttributes` override).
    /// Time-tag histograms share this step with altimetric ones: both
    /// need `signalRange`/`signalEnergy` for the post-period slip
    /// detection (spec.md §4.4.3).
    fn calc_signal_attributes(&mut self, true_10ns: f64) -> bool {
        let begin = self.begin_sig_bin as i64;
        let end = self.end_sig_bin as i64;

        let bkgnd_bins = self.size as f64
            - (end - begin + 1) as f64
            - (self.ignore_stop_bin - self.ignore_start_bin) as f64;

        let sigsum: f64 = (begin..=end)
            .filter_map(|i| self.bins.get(i as usize))
            .map(|&v| v as f64)
            .sum();
        let ignoresum: f64 = (self.ignore_start_bin as i64..self.ignore_stop_bin as i64)
            .filter_map(|i| self.bins.get(i as usize))
            .map(|&v| v as f64)
            .sum();

        self.noise_bin = if bkgnd_bins > 0.0 {
            (self.sum as f64 - sigsum - ignoresum) / bkgnd_bins
        } else {
            0.0
        };

        self.noise_floor = ((15000.0 / self.bin_size_m) * (50.0 / self.integration_period as f64)
            * self.noise_bin)
            / 1_000_000.0;
        if self.transmit_count != 0 {
            self.noise_floor *=
                (self.integration_period as f64 * 200.0) / self.transmit_count as f64;
        }

        let sigloc = crate::misc::weighted_centroid(&self.bins, begin.max(0) as usize, end.max(0) as usize);
        let retcount: f64 = (begin..=end)
            .filter_map(|i| self.bins.get(i as usize))
            .map(|&val| val as f64 - self.noise_bin)
            .sum();

        self.signal_range =
            (sigloc * self.bin_size_m * (true_10ns / 1.5)) + self.range_window_start;
        self.signal_energy = retcount / (200.0 * self.integration_period as f64);

        self.max_val[0] as f64 > self.noise_bin + self.noise_bin.sqrt() * 3.0
    }
}
