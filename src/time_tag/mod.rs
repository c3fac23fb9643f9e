// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The per-PCE time-tag integrator: reassembles one integration period's
segments into per-spot histograms plus running statistics (spec.md §4.4,
component C4 — the core of the core).
*/

pub mod config;
pub mod error;


pub use config::{TimeTagConfig, GRANULE_HIST_SIZE};
pub use error::TimeTagError;

use crate::histogram::{Histogram, TimeTagExtra};
use crate::major_frame::MajorFrameSnapshot;
use crate::misc::{fmod, wrap_to_centered};
use crate::statistics::{ChannelStats, PacketStats, SignalStats, TransmitStats};
use crate::types::{DownlinkBand, Edge, HistogramType, Spot};

use config::{
    DETECTOR_DEAD_TIME_NS, MAX_FINE_COUNT, MAX_FINE_TIME_CAL_NS, MAX_NUM_DLBS, MAX_NUM_SHOTS,
    MAX_RX_PER_SHOT, MIN_FINE_TIME_CAL_NS, NUM_CHANNELS,
};

use log::{debug, error, warn};

/// `State` follows spec.md §4.4.4's four-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitStart,
    InPeriod,
    Emit,
}

/// A decoded transmit event (channels 24..27).
#[derive(Debug, Clone, Copy)]
pub struct TxTag {
    pub raw: u32,
    pub width_bit: bool,
    pub trailing_fine: u8,
    pub leading_coarse: u32,
    pub leading_fine: u8,
    pub tx_time_ns: f64,
}

/// A decoded return event (channels 1..20).
#[derive(Debug, Clone, Copy)]
pub struct RxTag {
    pub channel: u8,
    pub edge: Edge,
    pub band_low: bool,
    pub coarse: u16,
    pub fine: u8,
    pub raw: [u8; 3],
    /// Computed range (ns), spec.md §3 "Tag" — `None` when the loopback
    /// correction rejected the tag at the window edge (spec.md §4.4.2
    /// "Transmit-delay lookahead").
    pub range_ns: Option<f64>,
}

/// One transmit shot and the returns retained against it.
#[derive(Debug, Clone, Default)]
pub struct Shot {
    pub tx: Option<TxTag>,
    pub returns: Vec<RxTag>,
    pub truncated: bool,
}

/// Parsed start-segment header (spec.md §4.4.2 "Phase B").
#[derive(Debug, Clone)]
pub struct StartHeader {
    pub mfc: u64,
    pub amet: u64,
    pub cvr_ns: f64,
    pub cvf_ns: f64,
    pub rws_ns: [f64; 2],
    pub rww_ns: [f64; 2],
    pub downlink_bands: Vec<DownlinkBand>,
    /// `true` when the encoded `N_DLB` exceeded [`MAX_NUM_DLBS`] and was
    /// clamped, a non-fatal header error (spec.md §4.4.2 "Phase B").
    pub hdr_error: bool,
}

fn read_be(buf: &[u8], offset: usize, len: usize) -> u64 {
    let mut v: u64 = 0;
    for &b in &buf[offset..offset + len] {
        v = (v << 8) | b as u64;
    }
    v
}

/// Parses the start segment's fixed-offset header (spec.md §4.4.2
/// "Phase B"). Byte layout: MFC(4) AMET(8) cvr_raw(2) cvf_raw(2)
/// {strong RWS(3) RWW(2)} {weak RWS(3) RWW(2)} ndlb_raw(1), followed by
/// `ndlb_raw + 1` downlink band entries of {mask(3) start(2) width(2)}.
pub fn parse_start_header(
    payload: &[u8],
    true_ruler_clk_period_ns: f64,
) -> Result<StartHeader, TimeTagError> {
    const FIXED_LEN: usize = 4 + 8 + 2 + 2 + (3 + 2) * 2 + 1;
    if payload.len() < FIXED_LEN {
        return Err(TimeTagError::StartSegmentTooShort {
            needed: FIXED_LEN,
            actual: payload.len(),
        });
    }

    let mfc = read_be(payload, 0, 4);
    let amet = read_be(payload, 4, 8);
    let cvr_raw = read_be(payload, 12, 2) as f64;
    let cvf_raw = read_be(payload, 14, 2) as f64;
    let cvr_ns = true_ruler_clk_period_ns / (cvr_raw / 256.0);
    let cvf_ns = true_ruler_clk_period_ns / (cvf_raw / 256.0);

    let strong_rws = read_be(payload, 16, 3) as f64 * true_ruler_clk_period_ns;
    let strong_rww = read_be(payload, 19, 2) as f64 * true_ruler_clk_period_ns;
    let weak_rws = read_be(payload, 21, 3) as f64 * true_ruler_clk_period_ns;
    let weak_rww = read_be(payload, 24, 2) as f64 * true_ruler_clk_period_ns;

    let ndlb_uncapped = payload[26] as usize + 1;
    let hdr_error = ndlb_uncapped > MAX_NUM_DLBS;
    let ndlb = ndlb_uncapped.min(MAX_NUM_DLBS);
    if hdr_error {
        warn!(
            "time_tag: N_DLB={ndlb_uncapped} exceeds MAX_NUM_DLBS={MAX_NUM_DLBS}, clamping"
        );
    }

    let mut downlink_bands = Vec::with_capacity(ndlb);
    let mut off = FIXED_LEN;
    for _ in 0..ndlb {
        if payload.len() < off + 7 {
            return Err(TimeTagError::StartSegmentTooShort {
                needed: off + 7,
                actual: payload.len(),
            });
        }
        let mask = read_be(payload, off, 3) as u32;
        let start = read_be(payload, off + 3, 2) as u16;
        let width = read_be(payload, off + 5, 2) as u16;
        downlink_bands.push(DownlinkBand { mask, start, width });
        off += 7;
    }

    Ok(StartHeader {
        mfc,
        amet,
        cvr_ns,
        cvf_ns,
        rws_ns: [strong_rws, weak_rws],
        rww_ns: [strong_rww, weak_rww],
        downlink_bands,
        hdr_error,
    })
}

/// Scans all continuation segments once and collects every transmit
/// loopback tag in shot order (spec.md §4.4.2 "Phase A"). Stops once
/// `intperiod * MAX_NUM_SHOTS` tags have been collected.
pub fn harvest_loopback_tags(segments: &[&[u8]], intperiod: i64) -> Vec<TxTag> {
    let cap = (intperiod as usize) * MAX_NUM_SHOTS;
    let mut tags = Vec::new();

    'segments: for seg in segments {
        let mut i = 12usize;
        while i < seg.len() {
            let id = seg[i];
            let channel = (id >> 3) & 0x1F;
            if (24..=27).contains(&channel) {
                if i + 4 > seg.len() {
                    break;
                }
                let raw = read_be(seg, i, 4) as u32;
                tags.push(decode_tx_tag(raw, 10.0, 0.0));
                if tags.len() >= cap {
                    break 'segments;
                }
                i += 4;
            } else if (1..=20).contains(&channel) {
                i += 3;
            } else if channel == 28 {
                i += 1;
            } else {
                i += 1;
            }
        }
    }

    tags
}

fn decode_tx_tag(raw: u32, true_ruler_clk_period_ns: f64, cvr_ns: f64) -> TxTag {
    let width_bit = (raw >> 28) & 1 != 0;
    let trailing_fine = ((raw >> 21) & 0x7F) as u8;
    let leading_coarse = ((raw >> 7) & 0x3FFF).wrapping_sub(1);
    let leading_fine = (raw & 0x7F) as u8;
    let tx_time_ns =
        leading_coarse as f64 * true_ruler_clk_period_ns - leading_fine as f64 * cvr_ns;
    TxTag {
        raw,
        width_bit,
        trailing_fine,
        leading_coarse,
        leading_fine,
        tx_time_ns,
    }
}

/// Decodes a 3-byte return tag (spec.md §4.4.2 "Phase C" step 3).
/// Returns `None` when `fine >= MAX_FINE_COUNT` (a format error).
fn decode_rx_tag(channel: u8, raw: [u8; 3]) -> Option<RxTag> {
    let word = ((raw[0] as u32) << 16) | ((raw[1] as u32) << 8) | raw[2] as u32;
    let edge = Edge::from_toggle_bit((word >> 18) & 1 != 0);
    let band_low = (word >> 17) & 1 != 0;
    let coarse = (((word >> 7) & 0x3FF) as i32 - 1).max(0) as u16;
    let fine = (word & 0x7F) as u8;
    if fine as usize >= MAX_FINE_COUNT {
        return None;
    }
    Some(RxTag {
        channel,
        edge,
        band_low,
        coarse,
        fine,
        raw,
        range_ns: None,
    })
}

/// Resolves the fine-time calibration value used for `tag`'s range
/// calculation: the running per-channel empirical average when it falls
/// within the sane `[MIN_FINE_TIME_CAL_NS, MAX_FINE_TIME_CAL_NS]` band,
/// otherwise the period header's `cvr`/`cvf` (spec.md §4.4.2 "Calibration
/// selection").
fn resolve_calval(header: &StartHeader, channel_stats: &ChannelStats, tag: &RxTag) -> f64 {
    let i = tag.channel as usize - 1;
    match tag.edge {
        Edge::Rising => {
            if (MIN_FINE_TIME_CAL_NS..=MAX_FINE_TIME_CAL_NS).contains(&channel_stats.avg_calr[i]) {
                channel_stats.avg_calr[i]
            } else {
                header.cvr_ns
            }
        }
        Edge::Falling => {
            if (MIN_FINE_TIME_CAL_NS..=MAX_FINE_TIME_CAL_NS).contains(&channel_stats.avg_calf[i]) {
                channel_stats.avg_calf[i]
            } else {
                header.cvf_ns
            }
        }
    }
}

/// TEP ignore-region bounds for one spot (spec.md §4.4.2 "TEP blocking").
pub fn tep_ignore_region(
    rws_ns: f64,
    bin_size_m: f64,
    tep_location_ns: f64,
    tep_width_ns: f64,
) -> Option<(i64, i64)> {
    let period = 100_000.0;
    let offset = fmod(rws_ns, period);
    let ns_per_bin = bin_size_m * 20.0 / 3.0;

    let (lo_ns, hi_ns) = if offset < tep_location_ns {
        (
            tep_location_ns - offset - tep_width_ns,
            tep_location_ns - offset + tep_width_ns,
        )
    } else {
        let wrapped = tep_location_ns - offset + period;
        (wrapped - tep_width_ns, wrapped + tep_width_ns)
    };

    let start = (lo_ns / ns_per_bin).floor().max(0.0) as i64;
    let stop = (hi_ns / ns_per_bin).ceil() as i64;

    if start < 0 || stop >= crate::histogram::MAX_HIST_SIZE as i64 {
        debug!("time_tag: TEP ignore region [{start}, {stop}] out of histogram bounds, dropping");
        return None;
    }
    Some((start, stop))
}

/// Per-integration-period working state for one PCE (spec.md §4.4). Owns
/// the per-spot histograms being built and the state machine that drives
/// Phases A/B/C across the segments of one period.
pub struct TimeTagIntegrator {
    pub pce_index: usize,
    pub config: TimeTagConfig,
    pub state: State,

    shots: Vec<Shot>,
    /// Per-channel raw last-seen tag, reset at every transmit boundary
    /// (spec.md §4.4.2 "`prevtag` (within shot)").
    prevtag: [Option<[u8; 3]>; NUM_CHANNELS],
    /// Per-channel raw last-seen tag, reset only at [`Self::begin_period`]
    /// (spec.md §4.4.2 "`prevtag_sticky` (across shots)").
    prevtag_sticky: [Option<[u8; 3]>; NUM_CHANNELS],
    /// Snapshot of `ChannelStats::bias` taken at the start of each segment,
    /// so the range computation reads a stable per-channel bias resolved
    /// from prior periods (spec.md §4.4.2 range computation).
    channel_bias_for_range: [f64; NUM_CHANNELS],
    /// Running tally of segment/header bytes processed this period
    /// (spec.md §4.4.3 "Emit ... pktBytes").
    pkt_bytes: i64,

    header: Option<StartHeader>,
    histograms: Option<[Histogram; 2]>,
    intperiod: i64,

    /// GPS seconds and MFC of the most recent period, used to detect
    /// drift in the next period's GPS assignment (spec.md §4.4.2 "GPS
    /// assignment").
    last_gps: Option<f64>,
    last_gps_mfc: Option<u64>,

    /// Whether the `buildUpMfc` diagnostic has already fired for the
    /// in-flight period (spec.md §4.4.1 — fires at most once per period).
    build_up_emitted: bool,

    pkt_stats: PacketStats,
}

impl TimeTagIntegrator {
    pub fn new(pce_index: usize, config: TimeTagConfig) -> Self {
        Self {
            pce_index,
            config,
            state: State::Idle,
            shots: Vec::new(),
            prevtag: [None; NUM_CHANNELS],
            prevtag_sticky: [None; NUM_CHANNELS],
            channel_bias_for_range: [0.0; NUM_CHANNELS],
            pkt_bytes: 0,
            header: None,
            histograms: None,
            intperiod: 1,
            last_gps: None,
            last_gps_mfc: None,
            build_up_emitted: false,
            pkt_stats: PacketStats::new(),
        }
    }

    /// Begins a new integration period from a start segment (spec.md
    /// §4.4.4). Any prior in-flight period is discarded; the caller is
    /// expected to have already emitted it via [`Self::finish_period`].
    pub fn begin_period(
        &mut self,
        payload: &[u8],
        intperiod: i64,
        major_frame: Option<MajorFrameSnapshot>,
        gps_at_major_frame: f64,
    ) -> Result<(), TimeTagError> {
        let header = parse_start_header(payload, self.config.true_ruler_clk_period_ns)?;

        self.pkt_stats = PacketStats::new();
        if header.hdr_error {
            self.pkt_stats.hdr_errors += 1;
        }
        self.check_gps_drift(&header, intperiod, gps_at_major_frame);

        let strong = Histogram::new(
            HistogramType::StrongTimeTag,
            intperiod,
            self.config.time_tag_bin_size_m,
            self.pce_index,
            header.mfc,
            major_frame.clone(),
            gps_at_major_frame,
            header.rws_ns[Spot::Strong.index()],
            header.rww_ns[Spot::Strong.index()],
        )
        .expect("time-tag bin size and integration period are always positive");
        let weak = Histogram::new(
            HistogramType::WeakTimeTag,
            intperiod,
            self.config.time_tag_bin_size_m,
            self.pce_index,
            header.mfc,
            major_frame,
            gps_at_major_frame,
            header.rws_ns[Spot::Weak.index()],
            header.rww_ns[Spot::Weak.index()],
        )
        .expect("time-tag bin size and integration period are always positive");

        let mut strong = strong;
        let mut weak = weak;
        strong.extra = Some(TimeTagExtra::new(header.downlink_bands.clone(), PacketStats::new()));
        weak.extra = Some(TimeTagExtra::new(header.downlink_bands.clone(), PacketStats::new()));

        self.histograms = Some([strong, weak]);
        self.header = Some(header);
        self.intperiod = intperiod;
        self.shots.clear();
        self.prevtag = [None; NUM_CHANNELS];
        self.prevtag_sticky = [None; NUM_CHANNELS];
        self.pkt_bytes = payload.len() as i64;
        self.build_up_emitted = false;
        self.state = State::AwaitStart;
        Ok(())
    }

    /// GPS assignment sanity check (spec.md §4.4.2 "GPS assignment"):
    /// compares the GPS time handed to this period against the time
    /// predicted from the last period's GPS/MFC pair at the nominal
    /// 0.020s/MFC major-frame rate, and warns (non-fatal) when the two
    /// diverge by more than `gps_accuracy_tolerance_s * intperiod`.
    fn check_gps_drift(&mut self, header: &StartHeader, intperiod: i64, gps_at_major_frame: f64) {
        if let (Some(last_gps), Some(last_mfc)) = (self.last_gps, self.last_gps_mfc) {
            if last_gps != 0.0 && last_mfc != 0 && header.mfc > last_mfc {
                let expected = last_gps + (header.mfc - last_mfc) as f64 * 0.020 * intperiod as f64;
                let drift = (gps_at_major_frame - expected).abs();
                let tolerance = self.config.gps_accuracy_tolerance_s * intperiod as f64;
                if drift > tolerance {
                    self.pkt_stats.warnings += 1;
                    warn!(
                        "pce {}: GPS drift {drift:.6}s at mfc {} exceeds tolerance {tolerance:.6}s (expected {expected:.6}, got {gps_at_major_frame:.6})",
                        self.pce_index, header.mfc
                    );
                }
            }
        }
        if gps_at_major_frame != 0.0 {
            self.last_gps = Some(gps_at_major_frame);
            self.last_gps_mfc = Some(header.mfc);
        }
    }

    fn histogram_mut(&mut self, spot: Spot) -> &mut Histogram {
        &mut self.histograms.as_mut().expect("period started")[spot.index()]
    }

    /// Decodes one continuation or end segment (spec.md §4.4.2 "Phase C").
    /// `loopback_tags` is Phase A's harvested array, already computed for
    /// the whole period. `channel_stats` receives per-channel calibration
    /// and dead-time updates.
    pub fn process_segment(
        &mut self,
        segment: &[u8],
        is_end: bool,
        loopback_tags: &[TxTag],
        channel_stats: &mut ChannelStats,
    ) {
        if self.state != State::AwaitStart && self.state != State::InPeriod {
            let state = match self.state {
                State::Idle => "Idle",
                State::Emit => "Emit",
                State::AwaitStart | State::InPeriod => unreachable!(),
            };
            warn!("time_tag: {}", TimeTagError::UnexpectedSegmentInIdle { state });
            return;
        }
        // The first continuation/end segment after `begin_period` moves the
        // state machine out of AWAIT_START (spec.md §4.4.4): both states
        // accept the same segments, the distinction is whether any have
        // been processed yet.
        self.state = State::InPeriod;

        self.channel_bias_for_range = channel_stats.bias;
        self.pkt_bytes += segment.len() as i64;

        let header = self.header.clone().expect("period started");
        let mut i = 12usize;
        let mut current_shot_index: i64 = -1;

        while i < segment.len() {
            let id = segment[i];
            let channel = (id >> 3) & 0x1F;

            if (24..=27).contains(&channel) {
                if i + 4 > segment.len() {
                    self.pkt_stats.fmt_errors += 1;
                    break;
                }
                let raw = read_be(segment, i, 4) as u32;
                let tx = decode_tx_tag(raw, self.config.true_ruler_clk_period_ns, header.cvr_ns);
                if self.shots.len() < MAX_NUM_SHOTS {
                    self.shots.push(Shot {
                        tx: Some(tx),
                        returns: Vec::new(),
                        truncated: false,
                    });
                    current_shot_index = self.shots.len() as i64 - 1;
                } else {
                    self.pkt_stats.pkt_errors += 1;
                }
                self.prevtag = [None; NUM_CHANNELS];
                i += 4;
            } else if (1..=20).contains(&channel) {
                if i + 3 > segment.len() {
                    self.pkt_stats.fmt_errors += 1;
                    break;
                }
                let raw = [segment[i], segment[i + 1], segment[i + 2]];
                let Some(mut tag) = decode_rx_tag(channel, raw) else {
                    self.pkt_stats.fmt_errors += 1;
                    break;
                };

                let spot = Spot::from_channel(channel);
                if self.config.channel_enabled(channel) {
                    if let Some(extra) = self.histogram_mut(spot).extra.as_mut() {
                        extra.inc_channel_count(channel);
                    }
                }

                let is_repeat = self.check_duplicate(channel, &tag, current_shot_index);

                let dlb_index = self.select_downlink_band(&header, channel, tag.band_low);
                if dlb_index.is_none() {
                    self.pkt_stats.dlb_errors += 1;
                }
                let band_valid =
                    dlb_index.is_some_and(|idx| tag.coarse <= header.downlink_bands[idx].width);
                if dlb_index.is_some() && !band_valid {
                    self.pkt_stats.tag_errors += 1;
                }

                let calval = band_valid.then(|| resolve_calval(&header, channel_stats, &tag));

                // Duplicate by dead-time: an adjacent-coarse-count return on
                // the same channel/edge whose chain span, scaled by this
                // tag's own calibration, already exceeds one ruler period
                // minus the detector dead time (spec.md §4.4.2 "Duplicate by
                // dead-time").
                let is_dead_time_dup = calval.is_some_and(|c| {
                    self.config.remove_duplicates
                        && self.check_dead_time_duplicate(&tag, c, current_shot_index, channel_stats)
                });
                let is_dup = is_repeat || is_dead_time_dup;

                let range = match (dlb_index, calval) {
                    (Some(dlb_idx), Some(calval)) => self.compute_range(
                        &header,
                        &tag,
                        dlb_idx,
                        calval,
                        current_shot_index,
                        loopback_tags,
                    ),
                    _ => None,
                };

                tag.range_ns = range;

                if !is_dup {
                    if let Some(range_ns) = range {
                        self.update_opposite_edge_dead_time(
                            &tag,
                            range_ns,
                            current_shot_index,
                            channel_stats,
                        );
                    }
                }

                let retain = (!is_dup || !self.config.remove_duplicates)
                    && self.config.channel_enabled(channel);
                if retain {
                    channel_stats.inc_rx(channel);
                    channel_stats.inc_cell(channel, tag.fine);
                    if current_shot_index >= 0 {
                        if let Some(shot) = self.shots.get_mut(current_shot_index as usize) {
                            if shot.returns.len() < MAX_RX_PER_SHOT {
                                shot.returns.push(tag);
                            } else {
                                shot.returns[MAX_RX_PER_SHOT - 1] = tag;
                            }
                        }
                    }
                    if let Some(range_ns) = range {
                        let bin = self.compute_bin(&header, spot, range_ns);
                        let hist = self.histogram_mut(spot);
                        hist.inc_bin(bin);
                        hist.record_channel_bin(channel, bin);
                    }
                }

                self.pkt_stats.sum_tags += 1;
                i += 3;
            } else if channel == 28 {
                if current_shot_index >= 0 {
                    if let Some(shot) = self.shots.get_mut(current_shot_index as usize) {
                        shot.truncated = true;
                    }
                }
                self.pkt_stats.warnings += 1;
                i += 3;
            } else if id == 0xED {
                i += 1;
            } else {
                self.pkt_stats.pkt_errors += 1;
                i += 1;
            }
        }

        self.pkt_stats.segcnt += 1;
        if is_end {
            self.cross_check_major_frame(&header);
            self.state = State::Emit;
        }
    }

    /// Cross-checks the start header's range window against the hardware's
    /// own major-frame copy, only meaningful when a single packet carries
    /// the whole period (spec.md §4.4.2 "Major-frame cross-check"): the
    /// DFC reports range window start/width in raw ruler ticks with a
    /// `+13`/`+1` fixed offset baked in.
    fn cross_check_major_frame(&mut self, header: &StartHeader) {
        if self.intperiod != 1 {
            return;
        }
        let Some(major_frame) = self.histograms.as_ref().and_then(|h| h[0].major_frame.as_ref())
        else {
            return;
        };

        let period = self.config.true_ruler_clk_period_ns;
        let checks = [
            (
                Spot::Strong,
                major_frame.strong_altimetric_rws,
                major_frame.strong_altimetric_rww,
            ),
            (
                Spot::Weak,
                major_frame.weak_altimetric_rws,
                major_frame.weak_altimetric_rww,
            ),
        ];
        for (spot, raw_rws, raw_rww) in checks {
            let dfc_rws = (raw_rws as f64 + 13.0) * period;
            let dfc_rww = (raw_rww as f64 + 1.0) * period;
            let fsw_rws = header.rws_ns[spot.index()];
            let fsw_rww = header.rww_ns[spot.index()];

            if (dfc_rws - fsw_rws).abs() > f64::EPSILON {
                error!(
                    "time_tag: {spot} range window start mismatch: fsw={fsw_rws:.1} dfc={dfc_rws:.1}"
                );
                self.pkt_stats.pkt_errors += 1;
            }
            if (dfc_rww - fsw_rww).abs() > f64::EPSILON {
                error!(
                    "time_tag: {spot} range window width mismatch: fsw={fsw_rww:.1} dfc={dfc_rww:.1}"
                );
                self.pkt_stats.pkt_errors += 1;
            }
        }
    }

    /// Duplicate-by-repeat test (spec.md §4.4.2 "Phase C duplicate
    /// detection"): a return is a repeat if its raw bytes match either the
    /// within-shot tracker (reset at every transmit) or the across-shots
    /// sticky tracker (reset only at [`Self::begin_period`]). Both trackers
    /// are updated unconditionally, whether or not this tag is a duplicate.
    fn check_duplicate(&mut self, channel: u8, tag: &RxTag, _current_shot_index: i64) -> bool {
        let i = channel as usize - 1;
        let dup = self.prevtag[i].is_some_and(|raw| raw == tag.raw)
            || self.prevtag_sticky[i].is_some_and(|raw| raw == tag.raw);
        self.prevtag[i] = Some(tag.raw);
        self.prevtag_sticky[i] = Some(tag.raw);
        dup
    }

    /// Scans this shot's already-retained same-channel, same-edge returns
    /// for one whose coarse count is exactly one tick away and whose chain
    /// span, scaled by `calval`, exceeds one ruler period minus the
    /// detector dead time. A match folds a deduced calibration value into
    /// `channel_stats` and marks `tag` a duplicate (spec.md §4.4.2
    /// "Duplicate by dead-time").
    fn check_dead_time_duplicate(
        &self,
        tag: &RxTag,
        calval: f64,
        current_shot_index: i64,
        channel_stats: &mut ChannelStats,
    ) -> bool {
        let Some(shot) = (current_shot_index >= 0)
            .then(|| current_shot_index as usize)
            .and_then(|i| self.shots.get(i))
        else {
            return false;
        };

        for retained in shot
            .returns
            .iter()
            .filter(|r| r.channel == tag.channel && r.edge == tag.edge)
        {
            let coarse_delta = retained.coarse as i32 - tag.coarse as i32;
            let chain_span = coarse_delta * (retained.fine as i32 - tag.fine as i32);
            if coarse_delta.abs() == 1
                && (chain_span as f64 * calval).abs()
                    >= (self.config.true_ruler_clk_period_ns - DETECTOR_DEAD_TIME_NS)
            {
                let dup_calval = self.config.true_ruler_clk_period_ns / chain_span.abs() as f64;
                channel_stats.record_duplicate_calibration(tag.channel, tag.edge, dup_calval);
                return true;
            }
        }
        false
    }

    /// Tracks the minimum opposite-edge range delta on this channel as the
    /// channel's empirical dead time (spec.md §4.4.3 "Dead-time stats").
    /// Only called for non-duplicate returns with a valid range.
    fn update_opposite_edge_dead_time(
        &self,
        tag: &RxTag,
        range_ns: f64,
        current_shot_index: i64,
        channel_stats: &mut ChannelStats,
    ) {
        let Some(shot) = (current_shot_index >= 0)
            .then(|| current_shot_index as usize)
            .and_then(|i| self.shots.get(i))
        else {
            return;
        };
        let opposite = match tag.edge {
            Edge::Rising => Edge::Falling,
            Edge::Falling => Edge::Rising,
        };
        for retained in shot
            .returns
            .iter()
            .filter(|r| r.channel == tag.channel && r.edge == opposite)
        {
            if let Some(other_range) = retained.range_ns {
                channel_stats.update_dead_time(tag.channel, (other_range - range_ns).abs());
            }
        }
    }

    /// Band selection (spec.md §4.4.2 "Band selection"). Returns the
    /// matching downlink band's index, or `None` on zero/multiple matches
    /// (both counted as a DLB error by the caller).
    fn select_downlink_band(&self, header: &StartHeader, channel: u8, band_low: bool) -> Option<usize> {
        let n = header.downlink_bands.len();
        let b = band_low as usize;
        let candidates: Vec<usize> = [0 + b, 2 + b]
            .into_iter()
            .filter(|&idx| idx < n)
            .filter(|&idx| header.downlink_bands[idx].channel_enabled(channel))
            .collect();

        if candidates.len() == 1 {
            Some(candidates[0])
        } else {
            None
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_range(
        &mut self,
        header: &StartHeader,
        tag: &RxTag,
        dlb_idx: usize,
        calval: f64,
        current_shot_index: i64,
        loopback_tags: &[TxTag],
    ) -> Option<f64> {
        let band = &header.downlink_bands[dlb_idx];
        if tag.coarse > band.width {
            self.pkt_stats.tag_errors += 1;
            return None;
        }

        let rws_ns = header.rws_ns[Spot::from_channel(tag.channel).index()];
        let coarse_time =
            (band.start as f64 + tag.coarse as f64) * self.config.true_ruler_clk_period_ns;
        let channel_bias = self.channel_bias_for_range[tag.channel as usize - 1];
        let tx_leading_fine = self
            .shots
            .get(current_shot_index.max(0) as usize)
            .and_then(|s| s.tx)
            .map_or(0.0, |tx| tx.leading_fine as f64);
        let mut range = coarse_time - tag.fine as f64 * calval
            + rws_ns * (10.0 / self.config.true_ruler_clk_period_ns)
            - channel_bias
            + tx_leading_fine * header.cvr_ns;

        if let crate::types::Correction::Loopback { location_ns, width_ns } = self.config.correction
        {
            let period = 10000.0 * self.config.true_ruler_clk_period_ns;
            let lookahead = (range / period).ceil() as i64;
            let target = current_shot_index + lookahead;
            let correction = if target >= 0 && (target as usize) < loopback_tags.len() {
                let current_tx = self
                    .shots
                    .get(current_shot_index.max(0) as usize)
                    .and_then(|s| s.tx)
                    .map(|tx| tx.tx_time_ns);
                current_tx.map(|cur| cur - loopback_tags[target as usize].tx_time_ns)
            } else {
                None
            };

            let range_from_tx = wrap_to_centered(fmod(range, period), period);
            if (range_from_tx - location_ns).abs() < width_ns {
                match correction {
                    Some(delta) => {
                        let corrected = range + delta;
                        let corrected_from_tx = wrap_to_centered(fmod(corrected, period), period);
                        if (corrected_from_tx - location_ns).abs() < width_ns {
                            range = corrected;
                        }
                        // Else the corrected tag would land outside the
                        // loopback window (edge bias): skip the
                        // correction and keep the uncorrected range
                        // (spec.md §8 S5), rather than dropping the tag.
                    }
                    None => return None,
                }
            }
        }

        Some(range)
    }

    fn compute_bin(&self, header: &StartHeader, spot: Spot, range_ns: f64) -> i64 {
        let bin_size = self.config.time_tag_bin_size_m;
        let rws_ns = header.rws_ns[spot.index()];
        if self.config.full_column_integration {
            let period = 10000.0 * self.config.true_ruler_clk_period_ns;
            (fmod(range_ns, period) * 0.15 / bin_size) as i64
        } else if !self.config.is_zoom_mode() {
            ((range_ns - rws_ns * 10.0 / self.config.true_ruler_clk_period_ns) * 0.15 / bin_size)
                as i64
        } else {
            ((range_ns - (rws_ns + self.config.time_tag_zoom_offset_ns)) * 0.15 / bin_size) as i64
        }
    }

    /// Finalizes the current period: runs the post-period reductions
    /// (spec.md §4.4.3) and returns the two emitted histograms.
    pub fn finish_period(
        &mut self,
        transmit_stats: &mut TransmitStats,
        channel_stats: &mut ChannelStats,
        signal_stats: &mut SignalStats,
    ) -> [Histogram; 2] {
        let histograms = self.histograms.take().expect("period started");
        let histograms = self.reduce_period(histograms, transmit_stats, channel_stats, signal_stats);
        self.state = State::Idle;
        histograms
    }

    /// `buildUpMfc` diagnostic (spec.md §4.4.1/§6): if configured with a
    /// target MFC and the current period's header carries it, runs the
    /// same post-period reductions as [`Self::finish_period`] over the
    /// shots collected *so far* without ending the period — the shot list
    /// keeps growing and the period finishes normally afterward. Per
    /// spec.md §4.4.1, the resulting `transmitCount` is not guaranteed to
    /// be monotonic across this emission and the period's real one; this
    /// is a diagnostic aid only and is a no-op unless `buildUpMfc` is set
    /// and matches. Only fires once per period.
    pub fn maybe_build_up_emit(
        &mut self,
        transmit_stats: &mut TransmitStats,
        channel_stats: &mut ChannelStats,
        signal_stats: &mut SignalStats,
    ) -> Option<[Histogram; 2]> {
        let target = self.config.build_up_mfc?;
        let header = self.header.as_ref()?;
        if header.mfc != target || self.build_up_emitted {
            return None;
        }
        self.build_up_emitted = true;
        let histograms = self.histograms.clone()?;
        Some(self.reduce_period(histograms, transmit_stats, channel_stats, signal_stats))
    }

    /// Shared post-period reduction logic (spec.md §4.4.3) driving both the
    /// real period-end emission and the `buildUpMfc` diagnostic peek.
    /// Operates over `histograms` by value so the diagnostic path can clone
    /// rather than consume `self.histograms`.
    fn reduce_period(
        &mut self,
        histograms: [Histogram; 2],
        transmit_stats: &mut TransmitStats,
        channel_stats: &mut ChannelStats,
        signal_stats: &mut SignalStats,
    ) -> [Histogram; 2] {
        let header = self.header.clone().expect("period started");

        for channel in 1..=NUM_CHANNELS as u8 {
            channel_stats.update_tdc_cal(channel, header.cvr_ns, header.cvf_ns);
        }

        for shot in &self.shots {
            for spot in Spot::ALL {
                let count = shot
                    .returns
                    .iter()
                    .filter(|r| Spot::from_channel(r.channel) == spot)
                    .count() as u32;
                transmit_stats.update_tag_count(spot.index(), count, shot.truncated);
            }
        }

        // Per-shot transmit-time deltas against the *previous* shot, with
        // the period-wraparound rule (spec.md §4.4.3 "Transmit stats").
        // `tx_deltas[i]` is 0.0 for shots with no predecessor (index 0, or
        // any shot whose transmit tag is missing).
        let mut tx_deltas = vec![0.0f64; self.shots.len()];
        let mut prev_tx_ns: Option<f64> = None;
        for (i, shot) in self.shots.iter().enumerate() {
            if let (Some(tx), Some(prev)) = (shot.tx, prev_tx_ns) {
                let mut delta = tx.tx_time_ns - prev;
                if delta.abs() > 5000.0 {
                    delta = if delta > 0.0 { delta - 10000.0 } else { delta + 10000.0 };
                }
                tx_deltas[i] = delta;
                transmit_stats.update_delta(delta);
            }
            if let Some(tx) = shot.tx {
                prev_tx_ns = Some(tx.tx_time_ns);
            }
        }

        let mut histograms = histograms;
        for (spot, hist) in Spot::ALL.into_iter().zip(histograms.iter_mut()) {
            hist.set_transmit_count(self.shots.iter().filter(|s| s.tx.is_some()).count() as i32);

            // The ignore region must be set before calc_attributes so its
            // signal-search step excludes TEP-blocked bins from the outset
            // (spec.md §8 invariant 7).
            let ignore_region = tep_ignore_region(
                header.rws_ns[spot.index()],
                self.config.time_tag_bin_size_m,
                self.config.tep_location_ns,
                self.config.tep_width_ns,
            );
            if let Some((start, stop)) = ignore_region {
                hist.set_ignore(start as i32, stop as i32);
            }

            hist.calc_attributes(self.config.signal_width_ns, self.config.true_ruler_clk_period_ns);

            if let Some((start, stop)) = ignore_region {
                if self.config.block_tep {
                    let num_shots = self.shots.len().max(1) as f64;
                    let tep_sum = hist.get_sum_range(start, stop) as f64;
                    let tep_energy = (tep_sum - (stop - start) as f64 * hist.noise_bin) / num_shots;
                    hist.set_tep_energy(tep_energy);
                }
            }

            hist.extract_channel_biases(self.config.true_ruler_clk_period_ns);

            // Emit: embed this period's packet stats and byte/error tallies
            // in the histogram (spec.md §4.4.3 "Emit").
            let total_pkt_errors = (self.pkt_stats.mfc_errors
                + self.pkt_stats.hdr_errors
                + self.pkt_stats.fmt_errors
                + self.pkt_stats.dlb_errors
                + self.pkt_stats.tag_errors
                + self.pkt_stats.pkt_errors) as i64;
            hist.set_pkt_bytes(self.pkt_bytes);
            hist.set_pkt_errors(total_pkt_errors);
            if let Some(extra) = hist.extra.as_mut() {
                extra.pkt_stats = self.pkt_stats.clone();
            }
        }

        // Fold each channel's histogram-derived bias into the running
        // per-channel average, only where the extractor marked it valid
        // (original_source's post-period `getChBiases`/`integrateAverage`
        // pairing, spec.md §4.4.3 "accumulate bias").
        for channel in 1..=NUM_CHANNELS as u8 {
            let spot = Spot::from_channel(channel);
            let hist = &histograms[spot.index()];
            let Some(extra) = hist.extra.as_ref() else { continue };
            let i = channel as usize - 1;
            if extra.channel_bias_set[i] {
                channel_stats.update_bias(channel, extra.channel_biases[i]);
            }
        }

        // Tx/Rx slip detection and the shared granule histogram (spec.md
        // §4.4.3 "Slip detection"): walk every shot but the last, since
        // each return is compared against the delta to its *next* shot.
        let hist_radius = (GRANULE_HIST_SIZE / 2) as i64;
        let mut slipped = [0i32; 2];
        for tx in 0..self.shots.len().saturating_sub(1) {
            let next_delta = tx_deltas[tx + 1];
            for ret in &self.shots[tx].returns {
                let Some(range_ns) = ret.range_ns else { continue };
                let spot = Spot::from_channel(ret.channel);
                let hist = &histograms[spot.index()];

                if next_delta.abs() > 20.0 && hist.signal_energy > 0.5 {
                    let slip_delta = (range_ns - hist.signal_range) - next_delta;
                    if slip_delta.abs() < 1.0 {
                        slipped[spot.index()] += 1;
                    }
                }

                let delta_range = hist.signal_range - range_ns;
                let granule_bin = delta_range.round() as i64;
                if granule_bin >= -hist_radius && granule_bin < hist_radius {
                    crate::granule_histogram_inc(
                        spot.index(),
                        (hist_radius + granule_bin) as usize,
                    );
                }
            }
        }
        for (spot, hist) in Spot::ALL.into_iter().zip(histograms.iter_mut()) {
            hist.set_slip_count(slipped[spot.index()]);
        }

        for (spot, hist) in Spot::ALL.into_iter().zip(histograms.iter()) {
            signal_stats.update(
                spot.index(),
                hist.range_window_start,
                hist.range_window_width,
                hist.signal_range,
                hist.noise_floor,
                hist.signal_energy,
                hist.tep_energy,
            );
        }
        signal_stats.tick();

        channel_stats.statcnt += 1;
        histograms
    }

    pub fn packet_stats(&self) -> &PacketStats {
        &self.pkt_stats
    }
}
