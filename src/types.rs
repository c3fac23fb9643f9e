// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Small shared enums and newtypes used across every component.
*/

use std::fmt;

#[cfg(test)]
mod test;

/// One of the three independent Photon Counting Electronics chains.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pce {
    Pce0 = 0,
    Pce1 = 1,
    Pce2 = 2,
}

/// Total number of PCEs on the instrument.
pub const NUM_PCES: usize = 3;

impl Pce {
    /// All PCEs, in index order.
    pub const ALL: [Pce; NUM_PCES] = [Pce::Pce0, Pce::Pce1, Pce::Pce2];

    /// Builds a `Pce` from its 0-based index.
    ///
    /// Returns `None` if `index` is not in `0..NUM_PCES`.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Pce::Pce0),
            1 => Some(Pce::Pce1),
            2 => Some(Pce::Pce2),
            _ => None,
        }
    }

    /// This PCE's 0-based index.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Pce {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PCE{}", self.index())
    }
}

/// Strong or weak spot: the two independent receive chains fed by a single
/// transmit pulse.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spot {
    Strong = 0,
    Weak = 1,
}

/// Total number of spots per shot.
pub const NUM_SPOTS: usize = 2;

impl Spot {
    pub const ALL: [Spot; NUM_SPOTS] = [Spot::Strong, Spot::Weak];

    /// A return's spot is determined solely by its channel number (1..20):
    /// channels 1..=16 are strong, 17..=20 are weak.
    pub fn from_channel(channel: u8) -> Self {
        if channel <= 16 {
            Spot::Strong
        } else {
            Spot::Weak
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", if *self == Spot::Strong { "strong" } else { "weak" })
    }
}

/// Rising or falling edge of the detector pulse, a.k.a. LVPECL toggle.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Falling = 0,
    Rising = 1,
}

impl Edge {
    pub fn from_toggle_bit(bit: bool) -> Self {
        if bit {
            Edge::Rising
        } else {
            Edge::Falling
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which segment position a reassembled CCSDS buffer occupies within a
/// multi-segment time-tag packet. Reassembly itself is out of scope
/// (spec.md §1); the integrator only needs to know which edge of the
/// sequence it is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFlag {
    Start,
    Continuation,
    End,
}

/// Per-shot transmit-delay correction mode (spec.md §4.4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// No per-shot transmit-delay compensation.
    Uncorrected,
    /// Apply the transmit-delay lookahead correction described in
    /// spec.md §4.4.2, gated by the loopback window.
    Loopback {
        location_ns: f64,
        width_ns: f64,
    },
}

impl Default for Correction {
    fn default() -> Self {
        Correction::Uncorrected
    }
}

/// Histogram record subtype (spec.md §3, `AtlasHistogram::type_t` in
/// `original_source`). `NotApplicable` stands in for the source's `NAS`
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramType {
    NotApplicable,
    StrongAltimetric,
    WeakAltimetric,
    StrongAtmospheric,
    WeakAtmospheric,
    StrongTimeTag,
    WeakTimeTag,
    GroundTestStrong,
    GroundTestWeak,
    WeakTestSim,
}

impl HistogramType {
    /// Altimetric subtypes get the signal-attribute overrides in
    /// spec.md §4.1 step 8 (noise floor, bin-weighted signal range).
    pub fn is_altimetric(self) -> bool {
        matches!(
            self,
            HistogramType::StrongAltimetric
                | HistogramType::WeakAltimetric
                | HistogramType::StrongAtmospheric
                | HistogramType::WeakAtmospheric
        )
    }

    /// Time-tag subtypes carry the `TimeTagExtra` suffix.
    pub fn is_time_tag(self) -> bool {
        matches!(self, HistogramType::StrongTimeTag | HistogramType::WeakTimeTag)
    }

    /// Which spot a time-tag subtype belongs to, for consumers (C6) that
    /// need to pick the matching slot out of a per-spot array. `None` for
    /// non-time-tag subtypes.
    pub fn spot(self) -> Option<Spot> {
        match self {
            HistogramType::StrongTimeTag => Some(Spot::Strong),
            HistogramType::WeakTimeTag => Some(Spot::Weak),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HistogramType::NotApplicable => "NAS",
            HistogramType::StrongAltimetric => "SAL",
            HistogramType::WeakAltimetric => "WAL",
            HistogramType::StrongAtmospheric => "SAM",
            HistogramType::WeakAtmospheric => "WAM",
            HistogramType::StrongTimeTag => "STT",
            HistogramType::WeakTimeTag => "WTT",
            HistogramType::GroundTestStrong => "GRL",
            HistogramType::GroundTestWeak => "SHS",
            HistogramType::WeakTestSim => "WHS",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "SAL" => HistogramType::StrongAltimetric,
            "WAL" => HistogramType::WeakAltimetric,
            "SAM" => HistogramType::StrongAtmospheric,
            "WAM" => HistogramType::WeakAtmospheric,
            "STT" => HistogramType::StrongTimeTag,
            "WTT" => HistogramType::WeakTimeTag,
            "GRL" => HistogramType::GroundTestStrong,
            "SHS" => HistogramType::GroundTestWeak,
            "WHS" => HistogramType::WeakTestSim,
            _ => HistogramType::NotApplicable,
        }
    }
}

/// A downlink band as decoded from a time-tag packet header (spec.md §3):
/// a programmable per-shot range window with a per-channel enable mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownlinkBand {
    /// 24-bit channel enable mask; bit 0 corresponds to channel 1. A zero
    /// bit means the channel is enabled (spec.md §3 and §9 — reverify
    /// against the instrument ICD before relying on this in flight ops).
    pub mask: u32,
    /// Start of the band, in TDC coarse-count ticks from range-window start.
    pub start: u16,
    /// Width of the band, in TDC coarse-count ticks.
    pub width: u16,
}

impl DownlinkBand {
    /// `channel` is 1-based (1..=20).
    pub fn channel_enabled(&self, channel: u8) -> bool {
        debug_assert!((1..=20).contains(&channel), "channel out of range: {channel}");
        (self.mask >> (channel - 1)) & 1 == 0
    }
}

impl fmt::Display for HistogramType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
