// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{criterion_group, criterion_main, Criterion, SamplingMode};

use atlas_timetag::statistics::{ChannelStats, SignalStats, TransmitStats};
use atlas_timetag::time_tag::{harvest_loopback_tags, TimeTagConfig, TimeTagIntegrator};

fn push_be(buf: &mut Vec<u8>, value: u64, len: usize) {
    for i in (0..len).rev() {
        buf.push(((value >> (8 * i)) & 0xFF) as u8);
    }
}

/// A minimal but well-formed start-segment header: one downlink band
/// spanning the whole range window, no calibration or dropout flags set.
fn header_bytes(mfc: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    push_be(&mut buf, mfc as u64, 4);
    push_be(&mut buf, 0, 8); // amet
    push_be(&mut buf, 12800, 2); // cvr
    push_be(&mut buf, 12800, 2); // cvf
    push_be(&mut buf, 300, 3); // strong rws
    push_be(&mut buf, 2000, 2); // strong rww
    push_be(&mut buf, 0, 3); // weak rws
    push_be(&mut buf, 0, 2); // weak rww
    buf.push(0); // ndlb
    push_be(&mut buf, 0, 3); // band mask
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

fn rx_tag_bytes(channel: u8, rising: bool, coarse: u16, fine: u8) -> [u8; 3] {
    let word = ((channel as u32 & 0x1F) << 19)
        | ((rising as u32) << 18)
        | (((coarse as u32 + 1) & 0x3FF) << 7)
        | (fine as u32 & 0x7F);
    [(word >> 16) as u8, (word >> 8) as u8, word as u8]
}

/// A synthetic continuation segment carrying 20 shots (one per channel
/// pair), each with one return, roughly matching a typical ATLAS major
/// frame's tag density. Leads with the 12-byte per-segment prefix the
/// integrator's decode loop skips (spec.md §4.4.2 "Phase C").
fn body_segment() -> Vec<u8> {
    let mut segment = vec![0u8; 12];
    for shot in 0..20u8 {
        let channel = 24 + (shot % 4);
        segment.extend_from_slice(&tx_tag_bytes(channel, 100 + shot as u32, 10));
        segment.extend_from_slice(&rx_tag_bytes((shot % 20) + 1, shot % 2 == 0, 300 + shot as u16, 20));
    }
    segment
}

fn bench_integration_period(c: &mut Criterion) {
    let group = &mut c.benchmark_group("time_tag");
    group.sampling_mode(SamplingMode::Flat);

    let header = header_bytes(1);
    let body = body_segment();

    group.bench_function("full_integration_period", |b| {
        b.iter(|| {
            let mut integrator = TimeTagIntegrator::new(0, TimeTagConfig::default());
            integrator.begin_period(&header, 1, None, 0.0).unwrap();

            let mut channel_stats = ChannelStats::new();
            let loopback_tags = harvest_loopback_tags(&[&body], 1);
            integrator.process_segment(&body, true, &loopback_tags, &mut channel_stats);

            let mut transmit_stats = TransmitStats::new();
            let mut signal_stats = SignalStats::new();
            integrator.finish_period(&mut transmit_stats, &mut channel_stats, &mut signal_stats)
        })
    });
}

criterion_group!(benches, bench_integration_period);
criterion_main!(benches);
