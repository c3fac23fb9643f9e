// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
CSV report writer facade (spec.md §4.6/§6, component C6). Consumes the
time-tag histograms C4 emits each integration period and rewrites a
"live file" with a fixed, contractual column order.
*/

#[cfg(test)]
mod test;

pub mod error;

pub use error::ReportError;

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::histogram::Histogram;
use crate::major_frame::MajorFrameSnapshot;

/// Column order is contractual for downstream readers (spec.md §6) —
/// never reorder without a version bump to the consumers of this file.
pub const COLUMNS: [&str; 33] = [
    "GPS", "MFC", "PCE", "TYPE", "RWS", "RWW", "DLBW1", "DLBW2", "DLBW3", "DLBW4", "SIGRNG",
    "BKGND", "SIGPES", "SIGWID", "HISTSUM", "TXCNT", "MBPS", "TXERR", "WRERR", "STTDC", "WKTDC",
    "RWDERR", "SDRMERR", "MFCERR", "HDRERR", "FMTERR", "DLBERR", "TAGERR", "PKTERR", "DLBS1",
    "DLBS2", "DLBS3", "DLBS4",
];

/// One CSV row: a flattened view of a single time-tag [`Histogram`] plus
/// the major-frame housekeeping bits and downlink-band layout it carries.
///
/// `BKGND` is the histogram's `noise_floor`, not its raw `noise_bin` —
/// confirmed by reading the original writer directly (`hist->hist.noiseFloor`).
/// `DLBS1..DLBS4` are each band's *start* tick, not its tag count.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub gps: f64,
    pub mfc: u64,
    pub pce: usize,
    pub hist_type: &'static str,
    pub rws: f64,
    pub rww: f64,
    pub dlbw: [u16; 4],
    pub sigrng: f64,
    pub bkgnd: f64,
    pub sigpes: f64,
    pub sigwid: f64,
    pub histsum: i64,
    pub txcnt: i32,
    pub mbps: f64,
    pub txerr: bool,
    pub wrerr: bool,
    pub sttdc: bool,
    pub wktdc: bool,
    pub rwderr: bool,
    pub sdrmerr: bool,
    pub mfcerr: u32,
    pub hdrerr: u32,
    pub fmterr: u32,
    pub dlberr: u32,
    pub tagerr: u32,
    pub pkterr: u32,
    pub dlbs: [u16; 4],
}

fn bool_col(b: bool) -> String {
    if b { "1".to_string() } else { "0".to_string() }
}

impl ReportRow {
    /// Builds a row from one PCE's strong- or weak-spot time-tag
    /// histogram for this integration period. Returns `None` for any
    /// other [`crate::types::HistogramType`] — this CSV's columns are
    /// specific to the time-tag meta record (spec.md §6).
    pub fn from_histogram(hist: &Histogram) -> Option<Self> {
        if !hist.hist_type.is_time_tag() {
            return None;
        }

        let extra = hist.extra.as_ref();
        let bands = extra.map(|e| e.downlink_bands.as_slice()).unwrap_or(&[]);
        let band_field = |i: usize, f: fn(&crate::types::DownlinkBand) -> u16| {
            bands.get(i).map(f).unwrap_or(0)
        };
        let pkt_stats = extra.map(|e| &e.pkt_stats);

        let mf = hist.major_frame.as_ref();
        let mf_bool = |f: fn(&MajorFrameSnapshot) -> bool| mf.map(f).unwrap_or(false);

        // Mbps at the nominal 50 Hz major-frame rate, scaled back down to
        // a per-period byte count by integration_period (spec.md §4.4,
        // matches the original's Viewer.cpp data-rate readout).
        let mbps = if hist.integration_period > 0 {
            (hist.pkt_bytes as f64 * 8.0 * 50.0 / hist.integration_period as f64) / 1_000_000.0
        } else {
            0.0
        };

        Some(Self {
            gps: hist.gps_at_major_frame,
            mfc: hist.mfc,
            pce: hist.pce_index + 1,
            hist_type: hist.hist_type.as_str(),
            rws: hist.range_window_start,
            rww: hist.range_window_width,
            dlbw: [
                band_field(0, |b| b.width),
                band_field(1, |b| b.width),
                band_field(2, |b| b.width),
                band_field(3, |b| b.width),
            ],
            sigrng: hist.signal_range,
            bkgnd: hist.noise_floor,
            sigpes: hist.signal_energy,
            sigwid: hist.signal_width,
            histsum: hist.get_sum(),
            txcnt: hist.transmit_count,
            mbps,
            txerr: mf_bool(|m| m.did_not_finish_transfer_err),
            wrerr: mf_bool(|m| m.did_not_finish_writing_data_err),
            sttdc: mf_bool(|m| m.tdc_strong_path_err),
            wktdc: mf_bool(|m| m.tdc_weak_path_err),
            rwderr: mf_bool(|m| m.range_window_dropout_err),
            sdrmerr: mf_bool(|m| m.sdram_mismatch_err),
            mfcerr: pkt_stats.map(|s| s.mfc_errors).unwrap_or(0),
            hdrerr: pkt_stats.map(|s| s.hdr_errors).unwrap_or(0),
            fmterr: pkt_stats.map(|s| s.fmt_errors).unwrap_or(0),
            dlberr: pkt_stats.map(|s| s.dlb_errors).unwrap_or(0),
            tagerr: pkt_stats.map(|s| s.tag_errors).unwrap_or(0),
            pkterr: pkt_stats.map(|s| s.pkt_errors).unwrap_or(0),
            dlbs: [
                band_field(0, |b| b.start),
                band_field(1, |b| b.start),
                band_field(2, |b| b.start),
                band_field(3, |b| b.start),
            ],
        })
    }

    fn to_record(&self) -> [String; 33] {
        [
            format!("{:.6}", self.gps),
            self.mfc.to_string(),
            self.pce.to_string(),
            self.hist_type.to_string(),
            format!("{:.1}", self.rws),
            format!("{:.1}", self.rww),
            self.dlbw[0].to_string(),
            self.dlbw[1].to_string(),
            self.dlbw[2].to_string(),
            self.dlbw[3].to_string(),
            format!("{:.1}", self.sigrng),
            format!("{:.1}", self.bkgnd),
            format!("{:.1}", self.sigpes),
            format!("{:.1}", self.sigwid),
            self.histsum.to_string(),
            self.txcnt.to_string(),
            format!("{:.1}", self.mbps),
            bool_col(self.txerr),
            bool_col(self.wrerr),
            bool_col(self.sttdc),
            bool_col(self.wktdc),
            bool_col(self.rwderr),
            bool_col(self.sdrmerr),
            self.mfcerr.to_string(),
            self.hdrerr.to_string(),
            self.fmterr.to_string(),
            self.dlberr.to_string(),
            self.tagerr.to_string(),
            self.pkterr.to_string(),
            self.dlbs[0].to_string(),
            self.dlbs[1].to_string(),
            self.dlbs[2].to_string(),
            self.dlbs[3].to_string(),
        ]
    }
}

/// Rewrites a fixed CSV file in full every integration period ("live
/// file" mode, spec.md §4.6): open, write the header and every current
/// row, close. Each call fully replaces the previous contents rather
/// than appending, matching `ReportProcessorStatistic::writeLiveFile`'s
/// open-write-close discipline.
pub struct Writer {
    path: PathBuf,
}

impl Writer {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_live_file(&self, rows: &[ReportRow]) -> Result<(), ReportError> {
        let file = File::create(&self.path)?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record(COLUMNS)?;
        for row in rows {
            wtr.write_record(row.to_record())?;
        }
        wtr.flush()?;
        Ok(())
    }
}
