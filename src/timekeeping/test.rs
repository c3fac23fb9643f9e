use super::*;
use float_cmp::approx_eq;

fn feed_stable_1pps(corr: &mut TimekeepingCorrelator, samples: u32) {
    let mut curr_amet: u64 = 1_000_000_000;
    let mut asc_gps_sec: u32 = 1_000_000;
    for _ in 0..samples {
        corr.ingest_spacecraft_1pps(
            curr_amet,
            (curr_amet & 0xFFFF_FFFF) as u32 + 1,
            (curr_amet & 0xFFFF_FFFF) as u32 + 2,
            0,
            asc_gps_sec,
            0,
            asc_gps_sec,
            0,
            Sc1ppsSource::A,
        )
        .unwrap();
        curr_amet += USO_CNTS_PER_SEC as u64;
        asc_gps_sec += 1;
    }
}

#[test]
fn test_rejects_zeroed_mandatory_field() {
    let mut corr = TimekeepingCorrelator::new();
    let err = corr
        .ingest_spacecraft_1pps(0, 1, 1, 0, 1, 0, 1, 0, Sc1ppsSource::A)
        .unwrap_err();
    match err {
        TimekeepingError::ZeroedMandatoryField { field } => assert_eq!(field, "curr_amet"),
    }
    assert_eq!(corr.errorcnt, 1);
}

#[test]
fn test_uso_freq_calc_becomes_valid_after_full_buffer() {
    let mut corr = TimekeepingCorrelator::new();
    assert!(!corr.get_ameto_gps_mapping().uso_freq_calc_valid);

    feed_stable_1pps(&mut corr, SAMPLE_HISTORY as u32 + 2);

    let mapping = corr.get_ameto_gps_mapping();
    assert!(mapping.uso_freq_calc_valid);
    assert!(approx_eq!(
        f64,
        mapping.true_ruler_clk_period_ns,
        10.0,
        epsilon = 1e-6
    ));
}

#[test]
fn test_amet_to_gps_none_when_invalid() {
    let corr = TimekeepingCorrelator::new();
    let mapping = corr.get_ameto_gps_mapping();
    assert_eq!(amet_to_gps(&mapping, 12345), None);
}

#[test]
fn test_amet_to_gps_extrapolates_with_valid_mapping() {
    let mapping = AmetToGpsMapping {
        asc_1pps_gps: 100.0,
        asc_1pps_amet: 1_000_000_000,
        true_ruler_clk_period_ns: 10.0,
        uso_freq_calc_valid: true,
    };
    // one full second of AMET ticks later (100e6 ticks at 10ns each)
    let amet = mapping.asc_1pps_amet + 100_000_000;
    let gps = amet_to_gps(&mapping, amet).unwrap();
    assert!(approx_eq!(f64, gps, 101.0, epsilon = 1e-6));
}

#[test]
fn test_pce_timekeeping_frequency() {
    let mut corr = TimekeepingCorrelator::new();
    corr.ingest_pce_timekeeping(Pce::Pce0, 1000, 0, 200).unwrap();
    corr.ingest_pce_timekeeping(Pce::Pce0, 1001, 0, 210).unwrap();
    assert!(approx_eq!(f64, corr.mf_freq(Pce::Pce0), 10.0, epsilon = 1e-6));
}

#[test]
fn test_sxp_housekeeping_rejects_zero_seconds() {
    let mut corr = TimekeepingCorrelator::new();
    assert!(corr.ingest_sxp_housekeeping(0, 5).is_err());
    assert_eq!(corr.errorcnt, 1);
}
