// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Process-wide keyed store of the most recent major-frame diagnostic
snapshots, one slot per `(PCE, MFC mod 256)` (spec.md §4.2, component C2).
*/

pub mod error;

#[cfg(test)]
mod test;

pub use error::MajorFrameError;

use crate::types::{Pce, NUM_PCES};

/// Payload length of a major-frame status packet (spec.md §6).
pub const PAYLOAD_LEN: usize = 116;

/// Number of cached slots per PCE. One major frame arrives roughly every
/// 20 ms and the integrator consumes at least once per integration period,
/// so 256 slots comfortably outlive any in-flight period (spec.md §4.2).
pub const NUM_SLOTS: usize = 256;

fn read_uint(buf: &[u8], offset: usize, len: usize) -> u64 {
    let mut v: u64 = 0;
    for &b in &buf[offset..offset + len] {
        v = (v << 8) | b as u64;
    }
    v
}

fn bit(value: u64, pos: u32) -> bool {
    (value >> pos) & 1 != 0
}

/// A fully-decoded major-frame diagnostic snapshot (spec.md §3/§6,
/// grounded on `original_source`'s `majorFrameData_t`).
#[derive(Debug, Clone, PartialEq)]
pub struct MajorFrameSnapshot {
    pub one_pps_count: u32,
    pub imet_at_one_pps: u64,
    pub imet_at_first_t0: u64,
    pub t0_counter: u32,
    pub major_frame_count: u64,
    pub background_counts: [u32; 8],
    pub calibration_value_rising: u32,
    pub calibration_value_falling: u32,

    /// (start, width) in 100 MHz ruler ticks, the hardware's authoritative
    /// copy used for the RWS/RWW cross-check in spec.md §4.4.2.
    pub strong_altimetric_rws: u32,
    pub strong_altimetric_rww: u32,
    pub strong_atmospheric_rws: u32,
    pub strong_atmospheric_rww: u32,
    pub weak_altimetric_rws: u32,
    pub weak_altimetric_rww: u32,
    pub weak_atmospheric_rws: u32,
    pub weak_atmospheric_rww: u32,

    pub edac_status_bits: u32,
    pub edac_single_bit_error_count: u8,
    pub edac_start_tracking_fifo_dbe: bool,
    pub edac_start_tag_fifo_dbe: bool,
    pub edac_sdram_b_dbe: bool,
    pub edac_sdram_a_dbe: bool,
    pub edac_mf_number_dbe: bool,
    pub edac_event_tag_fifo_dbe: bool,
    pub edac_card_readout_ram_dbe: bool,
    pub edac_card_creation_ram_dbe: bool,
    pub edac_burst_fifo_dbe: bool,
    pub edac_packet_fifo_b_dbe: bool,
    pub edac_packet_fifo_a_dbe: bool,
    pub edac_start_tracking_fifo_sbe: bool,
    pub edac_start_tag_fifo_sbe: bool,
    pub edac_sdram_b_sbe: bool,
    pub edac_sdram_a_sbe: bool,
    pub edac_mf_number_sbe: bool,
    pub edac_event_tag_fifo_sbe: bool,
    pub edac_card_flag_ram_sbe: bool,
    pub edac_card_readout_ram_sbe: bool,
    pub edac_card_creation_ram_sbe: bool,
    pub edac_burst_fifo_sbe: bool,
    pub edac_packet_fifo_b_sbe: bool,
    pub edac_packet_fifo_a_sbe: bool,

    /// Overridden after decomposition with the meaningful OR of
    /// strong/weak TDC path errors and the three FIFO-went-full bits
    /// (spec.md §6, "the derived `DFCHousekeepingStatusBits`").
    pub dfc_housekeeping_status_bits: bool,
    pub range_window_dropout_err: bool,
    pub tdc_strong_path_err: bool,
    pub tdc_weak_path_err: bool,
    pub tdc_fifo_half_full: bool,
    pub tdc_fifo_empty: bool,
    pub event_tag_fifo_empty: bool,
    pub burst_fifo_empty: bool,
    pub start_tag_fifo_empty: bool,
    pub tracking_fifo_empty: bool,
    pub packetizer_a_fifo_empty: bool,
    pub packetizer_b_fifo_empty: bool,
    pub tdc_fifo_went_full: bool,
    pub event_tag_fifo_went_full: bool,
    pub burst_fifo_went_full: bool,
    pub start_tag_fifo_went_full: bool,
    pub tracking_fifo_went_full: bool,
    pub packetizer_a_fifo_went_full: bool,
    pub packetizer_b_fifo_went_full: bool,

    pub did_not_finish_transfer_err: bool,
    pub sdram_mismatch_err: bool,
    pub did_not_finish_writing_data_err: bool,
    pub spw_rx_eep_err: bool,
    pub spw_rx_invalid_length_err: bool,
    pub spw_rx_invalid_opcode_err: bool,
    pub spw_rx_protocol_id_err: bool,
    pub current_read_sdram_buffer: bool,
}

impl MajorFrameSnapshot {
    /// Decodes a 116-byte major-frame payload at the fixed offsets in
    /// spec.md §6 / `original_source`'s `MajorFrameProcessorModule::processSegments`.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, MajorFrameError> {
        if payload.len() != PAYLOAD_LEN {
            return Err(MajorFrameError::WrongPayloadLength {
                expected: PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let edac = read_uint(payload, 102, 4);
        let dfc_hk_raw = read_uint(payload, 106, 4);
        let dfc_status = read_uint(payload, 111, 1);

        let tdc_strong_path_err = bit(dfc_hk_raw, 17);
        let tdc_weak_path_err = bit(dfc_hk_raw, 16);
        let tdc_fifo_went_full = bit(dfc_hk_raw, 6);
        let event_tag_fifo_went_full = bit(dfc_hk_raw, 5);
        let start_tag_fifo_went_full = bit(dfc_hk_raw, 3);

        Ok(Self {
            one_pps_count: read_uint(payload, 12, 4) as u32,
            imet_at_one_pps: read_uint(payload, 16, 6),
            imet_at_first_t0: read_uint(payload, 22, 6),
            t0_counter: read_uint(payload, 28, 2) as u32,
            major_frame_count: read_uint(payload, 30, 4),
            background_counts: {
                let mut c = [0u32; 8];
                for (i, slot) in c.iter_mut().enumerate() {
                    *slot = read_uint(payload, 34 + i * 2, 2) as u32;
                }
                c
            },
            calibration_value_rising: read_uint(payload, 50, 2) as u32,
            calibration_value_falling: read_uint(payload, 52, 2) as u32,

            strong_altimetric_rws: read_uint(payload, 76, 3) as u32,
            strong_altimetric_rww: read_uint(payload, 79, 2) as u32,
            strong_atmospheric_rws: read_uint(payload, 81, 3) as u32,
            strong_atmospheric_rww: read_uint(payload, 84, 2) as u32,
            weak_altimetric_rws: read_uint(payload, 86, 3) as u32,
            weak_altimetric_rww: read_uint(payload, 89, 2) as u32,
            weak_atmospheric_rws: read_uint(payload, 91, 3) as u32,
            weak_atmospheric_rww: read_uint(payload, 94, 2) as u32,

            edac_status_bits: edac as u32,
            edac_single_bit_error_count: ((edac & 0xFF00_0000) >> 24) as u8,
            edac_start_tracking_fifo_dbe: bit(edac, 22),
            edac_start_tag_fifo_dbe: bit(edac, 21),
            edac_sdram_b_dbe: bit(edac, 20),
            edac_sdram_a_dbe: bit(edac, 19),
            edac_mf_number_dbe: bit(edac, 18),
            edac_event_tag_fifo_dbe: bit(edac, 17),
            edac_card_readout_ram_dbe: bit(edac, 16),
            edac_card_creation_ram_dbe: bit(edac, 15),
            edac_burst_fifo_dbe: bit(edac, 14),
            edac_packet_fifo_b_dbe: bit(edac, 13),
            edac_packet_fifo_a_dbe: bit(edac, 12),
            edac_start_tracking_fifo_sbe: bit(edac, 11),
            edac_start_tag_fifo_sbe: bit(edac, 10),
            edac_sdram_b_sbe: bit(edac, 9),
            edac_sdram_a_sbe: bit(edac, 8),
            edac_mf_number_sbe: bit(edac, 7),
            edac_event_tag_fifo_sbe: bit(edac, 6),
            edac_card_flag_ram_sbe: bit(edac, 5),
            edac_card_readout_ram_sbe: bit(edac, 4),
            edac_card_creation_ram_sbe: bit(edac, 3),
            edac_burst_fifo_sbe: bit(edac, 2),
            edac_packet_fifo_b_sbe: bit(edac, 1),
            edac_packet_fifo_a_sbe: bit(edac, 0),

            dfc_housekeeping_status_bits: tdc_strong_path_err
                || tdc_weak_path_err
                || tdc_fifo_went_full
                || event_tag_fifo_went_full
                || start_tag_fifo_went_full,
            range_window_dropout_err: bit(dfc_hk_raw, 18),
            tdc_strong_path_err,
            tdc_weak_path_err,
            tdc_fifo_half_full: bit(dfc_hk_raw, 15),
            tdc_fifo_empty: bit(dfc_hk_raw, 14),
            event_tag_fifo_empty: bit(dfc_hk_raw, 13),
            burst_fifo_empty: bit(dfc_hk_raw, 12),
            start_tag_fifo_empty: bit(dfc_hk_raw, 10),
            tracking_fifo_empty: bit(dfc_hk_raw, 9),
            packetizer_a_fifo_empty: bit(dfc_hk_raw, 8),
            packetizer_b_fifo_empty: bit(dfc_hk_raw, 7),
            tdc_fifo_went_full,
            event_tag_fifo_went_full,
            burst_fifo_went_full: bit(dfc_hk_raw, 4),
            start_tag_fifo_went_full,
            tracking_fifo_went_full: bit(dfc_hk_raw, 2),
            packetizer_a_fifo_went_full: bit(dfc_hk_raw, 1),
            packetizer_b_fifo_went_full: bit(dfc_hk_raw, 0),

            did_not_finish_transfer_err: bit(dfc_status, 7),
            sdram_mismatch_err: bit(dfc_status, 6),
            did_not_finish_writing_data_err: bit(dfc_status, 5),
            spw_rx_eep_err: bit(dfc_status, 4),
            spw_rx_invalid_length_err: bit(dfc_status, 3),
            spw_rx_invalid_opcode_err: bit(dfc_status, 2),
            spw_rx_protocol_id_err: bit(dfc_status, 1),
            current_read_sdram_buffer: bit(dfc_status, 0),
        })
    }
}

/// Process-wide, per-PCE cache of the most recent 256 major-frame
/// snapshots, slotted by `mfc mod 256` (spec.md §4.2). Writers overwrite
/// their slot unconditionally (eviction is implicit write-through);
/// readers MUST verify the returned snapshot's embedded MFC matches their
/// own before trusting it — see [`MajorFrameCache::get_verified`].
pub struct MajorFrameCache {
    slots: [[Option<MajorFrameSnapshot>; NUM_SLOTS]; NUM_PCES],
}

impl MajorFrameCache {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| std::array::from_fn(|_| None)),
        }
    }

    fn slot_index(mfc: u64) -> usize {
        (mfc % NUM_SLOTS as u64) as usize
    }

    /// Writes `snapshot` into its slot for `pce`, overwriting whatever was
    /// previously cached there.
    pub fn put(&mut self, pce: Pce, snapshot: MajorFrameSnapshot) {
        let idx = Self::slot_index(snapshot.major_frame_count);
        self.slots[pce.index()][idx] = Some(snapshot);
    }

    /// Returns the slot's snapshot without checking its embedded MFC.
    /// Prefer [`Self::get_verified`] from the integrator.
    pub fn get_raw(&self, pce: Pce, mfc: u64) -> Option<&MajorFrameSnapshot> {
        self.slots[pce.index()][Self::slot_index(mfc)].as_ref()
    }

    /// Returns the cached snapshot for `(pce, mfc)` only if its embedded
    /// MFC equals `mfc`; otherwise the snapshot is "not associated"
    /// (spec.md §3/§4.2) and `None` is returned so the caller can count a
    /// warning.
    pub fn get_verified(&self, pce: Pce, mfc: u64) -> Option<&MajorFrameSnapshot> {
        self.get_raw(pce, mfc).filter(|s| s.major_frame_count == mfc)
    }
}

impl Default for MajorFrameCache {
    fn default() -> Self {
        Self::new()
    }
}
