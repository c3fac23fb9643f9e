// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// A narrative walkthrough of the library API, independent of the
/// `atlas-replay` binary's CLI/file-format plumbing: build one in-memory
/// integration period by hand, feed it through a [`atlas_timetag::TimeTagIntegrator`],
/// and print the resulting strong- and weak-spot histogram summaries.
///
/// Not wired into the crate's Cargo.toml — run it by copying its `main`
/// into a scratch binary, the way you'd step through mwalib's `examples/`
/// walkthroughs in a debugger.
use atlas_timetag::statistics::{ChannelStats, SignalStats, TransmitStats};
use atlas_timetag::time_tag::{harvest_loopback_tags, TimeTagConfig, TimeTagIntegrator};

fn push_be(buf: &mut Vec<u8>, value: u64, len: usize) {
    for i in (0..len).rev() {
        buf.push(((value >> (8 * i)) & 0xFF) as u8);
    }
}

/// One start-segment header: MFC 42, a single downlink band spanning the
/// whole 2000-tick range window, strong-spot range window start at tick
/// 300.
fn sample_header() -> Vec<u8> {
    let mut buf = Vec::new();
    push_be(&mut buf, 42, 4); // mfc
    push_be(&mut buf, 0, 8); // amet
    push_be(&mut buf, 12800, 2); // cvr
    push_be(&mut buf, 12800, 2); // cvf
    push_be(&mut buf, 300, 3); // strong rws
    push_be(&mut buf, 2000, 2); // strong rww
    push_be(&mut buf, 0, 3); // weak rws
    push_be(&mut buf, 0, 2); // weak rww
    buf.push(0); // ndlb: one band follows
    push_be(&mut buf, 0, 3); // band mask: all channels enabled
    push_be(&mut buf, 0, 2); // band start
    push_be(&mut buf, 2000, 2); // band width
    buf
}

fn tx_tag_bytes(channel: u8, leading_coarse: u32, leading_fine: u8) -> [u8; 4] {
    let raw = ((channel as u32 & 0x1F) << 27)
        | (((leading_coarse + 1) & 0x3FFF) << 7)
        | (leading_fine as u32 & 0x7F);
    raw.to_be_bytes()
}

fn rx_tag_bytes(channel: u8, rising: bool, band_low: bool, coarse: u16, fine: u8) -> [u8; 3] {
    let word = ((channel as u32 & 0x1F) << 19)
        | ((rising as u32) << 18)
        | ((band_low as u32) << 17)
        | (((coarse as u32 + 1) & 0x3FF) << 7)
        | (fine as u32 & 0x7F);
    [(word >> 16) as u8, (word >> 8) as u8, word as u8]
}

fn main() {
    let header = sample_header();

    let mut config = TimeTagConfig::default();
    config.time_tag_bin_size_m = 1.5;
    let mut integrator = TimeTagIntegrator::new(0, config);
    integrator
        .begin_period(&header, 1, None, 1_000_000_000.0)
        .expect("well-formed header");

    // One shot: a transmit tag on channel 24 (strong spot) followed by a
    // single rising-edge return on channel 1. Every continuation/end
    // segment carries a 12-byte prefix ahead of the tag stream (spec.md
    // §4.4.2 "Phase C" — decode starts "at byte index i starting at 12 per
    // segment"), which this crate's reassembly collaborator would normally
    // have already stripped of its own framing.
    let mut segment = vec![0u8; 12];
    segment.extend_from_slice(&tx_tag_bytes(24, 100, 10));
    segment.extend_from_slice(&rx_tag_bytes(1, true, false, 325, 20));

    let mut channel_stats = ChannelStats::new();
    let loopback_tags = harvest_loopback_tags(&[&segment], 1);
    integrator.process_segment(&segment, true, &loopback_tags, &mut channel_stats);

    let mut transmit_stats = TransmitStats::new();
    let mut signal_stats = SignalStats::new();
    let histograms = integrator.finish_period(&mut transmit_stats, &mut channel_stats, &mut signal_stats);

    for hist in &histograms {
        println!(
            "{}: mfc={} sum={} signal_range={:.2} noise_floor={:.3}",
            hist.hist_type,
            hist.mfc,
            hist.get_sum(),
            hist.signal_range,
            hist.noise_floor
        );
    }
}
