use super::*;
use crate::histogram::TimeTagExtra;
use crate::major_frame::MajorFrameSnapshot;
use crate::statistics::PacketStats;
use crate::types::{DownlinkBand, HistogramType};

fn major_frame_bytes(dfc_hk_raw: u32, dfc_status: u8) -> Vec<u8> {
    let mut buf = vec![0u8; 116];
    buf[106..110].copy_from_slice(&dfc_hk_raw.to_be_bytes());
    buf[111] = dfc_status;
    buf
}

fn sample_histogram() -> Histogram {
    let mut hist =
        Histogram::new(HistogramType::StrongTimeTag, 1, 0.15, 1, 42, None, 1000.123456, 3000.0, 500.0)
            .unwrap();
    hist.set_transmit_count(10);
    hist.set_bin(5, 3);
    hist.signal_range = 3010.5;
    hist.noise_floor = 0.25;
    hist.signal_energy = 0.05;
    hist.signal_width = 1.5;
    hist.pkt_bytes = 2000;

    // TDC_StrongPath_Err (bit 17) and RangeWindowDropout_Err (bit 18) set;
    // DidNotFinishTransfer_Err (bit 7 of dfc_status) set.
    let mf_bytes = major_frame_bytes((1 << 17) | (1 << 18), 1 << 7);
    hist.major_frame = Some(MajorFrameSnapshot::from_bytes(&mf_bytes).unwrap());

    let mut pkt_stats = PacketStats::new();
    pkt_stats.hdr_errors = 2;
    pkt_stats.tag_errors = 1;

    let bands = vec![
        DownlinkBand { mask: 0, start: 100, width: 50 },
        DownlinkBand { mask: 0, start: 200, width: 60 },
    ];
    hist.extra = Some(TimeTagExtra::new(bands, pkt_stats));

    hist
}

#[test]
fn test_from_histogram_maps_fields() {
    let hist = sample_histogram();
    let row = ReportRow::from_histogram(&hist).unwrap();

    assert_eq!(row.pce, 2); // pce_index 1 -> 1-based PCE 2
    assert_eq!(row.mfc, 42);
    assert_eq!(row.hist_type, "STT");
    assert_eq!(row.dlbw, [50, 60, 0, 0]);
    assert_eq!(row.dlbs, [100, 200, 0, 0]);
    assert!((row.bkgnd - 0.25).abs() < 1e-9); // BKGND is noise_floor, not noise_bin
    assert_eq!(row.histsum, 3);
    assert!(row.sttdc);
    assert!(row.rwderr);
    assert!(row.txerr);
    assert!(!row.wktdc);
    assert_eq!(row.hdrerr, 2);
    assert_eq!(row.tagerr, 1);
    // Mbps at nominal 50 Hz, one-MFC integration period: 2000*8*50/1e6
    assert!((row.mbps - 0.8).abs() < 1e-9);
}

#[test]
fn test_from_histogram_rejects_non_time_tag_type() {
    let hist = Histogram::new(HistogramType::StrongAltimetric, 1, 0.15, 0, 1, None, 0.0, 0.0, 0.0)
        .unwrap();
    assert!(ReportRow::from_histogram(&hist).is_none());
}

#[test]
fn test_write_live_file_rewrites_not_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.csv");
    let writer = Writer::new(&path);

    let hist = sample_histogram();
    let row = ReportRow::from_histogram(&hist).unwrap();

    writer.write_live_file(&[row.clone()]).unwrap();
    writer.write_live_file(&[row.clone(), row]).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    // header + 2 data rows, not header + 1 + header + 2
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], COLUMNS.join(","));
}
