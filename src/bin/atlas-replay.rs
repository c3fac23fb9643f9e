// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// Replays an already-reassembled time-tag segment file through one PCE's
/// `TimeTagIntegrator` and writes the resulting per-period CSV rows,
/// verifying that `atlas-timetag` is functioning correctly end to end.
///
/// CCSDS framing/segment reassembly is out of scope for this crate (spec.md
/// §1), so the input file is this crate's own minimal segment container
/// rather than a real spacecraft telemetry stream: a sequence of records,
/// each `[segment_flag: u8][len: u32 BE][payload: len bytes]`, where
/// `segment_flag` is `0` (start), `1` (continuation) or `2` (end).
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use atlas_timetag::report::{ReportRow, Writer};
use atlas_timetag::statistics::{ChannelStats, PacketStats, SignalStats, TransmitStats};
use atlas_timetag::time_tag::{harvest_loopback_tags, TimeTagConfig, TimeTagIntegrator};
use atlas_timetag::types::SegmentFlag;

#[derive(Parser, Debug)]
#[clap(name = "atlas-replay", author)]
struct Opt {
    /// Which PCE this segment stream belongs to (0..2), for the CSV `PCE`
    /// column and per-PCE channel disable defaults.
    #[clap(short, long, default_value_t = 0)]
    pce: usize,

    /// Path to a segment file in this crate's minimal replay container.
    segments: PathBuf,

    /// Where to write the resulting "live file" CSV. Rewritten in full
    /// after every integration period (spec.md §4.6).
    #[clap(short, long, default_value = "atlas-replay-out.csv")]
    out: PathBuf,
}

fn read_segments(path: &PathBuf) -> Result<Vec<(SegmentFlag, Vec<u8>)>> {
    let mut reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    let mut segments = Vec::new();
    loop {
        let mut flag_byte = [0u8; 1];
        match reader.read_exact(&mut flag_byte) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let flag = match flag_byte[0] {
            0 => SegmentFlag::Start,
            1 => SegmentFlag::Continuation,
            2 => SegmentFlag::End,
            other => bail!("unrecognized segment flag byte {other}"),
        };
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        segments.push((flag, payload));
    }
    Ok(segments)
}

fn main() -> Result<()> {
    env_logger::try_init().unwrap_or(());
    let opt = Opt::parse();

    let segments = read_segments(&opt.segments)?;
    log::info!("read {} segments from {}", segments.len(), opt.segments.display());

    let mut integrator = TimeTagIntegrator::new(opt.pce, TimeTagConfig::default());
    let mut channel_stats = ChannelStats::new();
    let mut transmit_stats = TransmitStats::new();
    let mut signal_stats = SignalStats::new();
    let mut running_pkt_stats = PacketStats::new();

    let mut rows = Vec::new();
    let mut period_continuations: Vec<&[u8]> = Vec::new();
    let mut period_header: Option<&[u8]> = None;

    for (flag, payload) in &segments {
        match flag {
            SegmentFlag::Start => {
                period_header = Some(payload);
                period_continuations.clear();
            }
            SegmentFlag::Continuation | SegmentFlag::End => {
                period_continuations.push(payload);
            }
        }

        if *flag == SegmentFlag::Start {
            let Some(header) = period_header else { continue };
            integrator.begin_period(header, 1, None, 0.0)?;
            continue;
        }

        let loopback_tags = harvest_loopback_tags(&period_continuations, 1);
        integrator.process_segment(payload, *flag == SegmentFlag::End, &loopback_tags, &mut channel_stats);

        if *flag == SegmentFlag::End {
            running_pkt_stats.update_tag_count(integrator.packet_stats().sum_tags);
            let histograms =
                integrator.finish_period(&mut transmit_stats, &mut channel_stats, &mut signal_stats);
            for hist in &histograms {
                if let Some(row) = ReportRow::from_histogram(hist) {
                    rows.push(row);
                }
            }
            Writer::new(&opt.out).write_live_file(&rows)?;
            log::debug!("emitted period mfc={}, {} rows so far", hist_mfc(&histograms), rows.len());
        }
    }

    println!(
        "replayed {} periods ({} rows) into {}",
        rows.len() / 2,
        rows.len(),
        opt.out.display()
    );
    println!("running packet stats: {running_pkt_stats:?}");
    Ok(())
}

fn hist_mfc(histograms: &[atlas_timetag::Histogram; 2]) -> u64 {
    histograms[0].mfc
}
