use super::*;
use crate::statistics::PacketStats;
use float_cmp::approx_eq;

fn new_hist(bin_size_m: f64, hist_type: HistogramType) -> Histogram {
    Histogram::new(hist_type, 50, bin_size_m, 0, 1, None, 0.0, 0.0, 0.0).unwrap()
}

#[test]
fn test_new_rejects_non_positive_bin_size() {
    let err = Histogram::new(HistogramType::StrongTimeTag, 50, 0.0, 0, 1, None, 0.0, 0.0, 0.0)
        .unwrap_err();
    matches!(err, HistogramError::NonPositiveBinSize(_));
}

#[test]
fn test_new_rejects_non_positive_integration_period() {
    let err =
        Histogram::new(HistogramType::StrongTimeTag, 0, 0.225, 0, 1, None, 0.0, 0.0, 0.0)
            .unwrap_err();
    matches!(err, HistogramError::NonPositiveIntegrationPeriod(_));
}

#[test]
fn test_set_bin_extends_size_monotonically() {
    let mut hist = new_hist(0.225, HistogramType::StrongTimeTag);
    assert!(hist.set_bin(5, 3));
    assert_eq!(hist.size(), 6);
    assert!(hist.set_bin(2, 7));
    // touching a lower bin does not shrink size
    assert_eq!(hist.size(), 6);
    assert_eq!(hist.get_sum(), 10);
}

#[test]
fn test_set_bin_out_of_range_is_noop() {
    let mut hist = new_hist(0.225, HistogramType::StrongTimeTag);
    assert!(!hist.set_bin(-1, 3));
    assert!(!hist.set_bin(MAX_HIST_SIZE as i64, 3));
    assert_eq!(hist.get_sum(), 0);
}

#[test]
fn test_inc_bin_and_add_bin_accumulate_sum() {
    let mut hist = new_hist(0.225, HistogramType::StrongTimeTag);
    assert!(hist.inc_bin(0));
    assert!(hist.add_bin(0, 4));
    assert_eq!(hist.get_bin(0), 5);
    assert_eq!(hist.get_sum(), 5);
}

#[test]
fn test_get_sum_range_is_inclusive_of_stop_bin() {
    let mut hist = new_hist(0.225, HistogramType::StrongTimeTag);
    hist.set_bin(0, 1);
    hist.set_bin(1, 2);
    hist.set_bin(2, 3);
    assert_eq!(hist.get_sum_range(0, 1), 3);
    assert_eq!(hist.get_sum_range(0, 2), 6);
}

#[test]
fn test_scale_and_add_scalar() {
    let mut hist = new_hist(0.225, HistogramType::StrongTimeTag);
    hist.set_bin(0, 10);
    hist.set_bin(1, 20);
    hist.scale(0.5);
    assert_eq!(hist.get_bin(0), 5);
    assert_eq!(hist.get_bin(1), 10);
    hist.add_scalar(1);
    assert_eq!(hist.get_bin(0), 6);
    assert_eq!(hist.get_bin(1), 11);
}

#[test]
fn test_calc_attributes_finds_single_peak_time_tag() {
    let mut hist = new_hist(0.225, HistogramType::StrongTimeTag);
    for i in 0..100 {
        hist.set_bin(i, 2);
    }
    hist.set_bin(50, 200);
    let found = hist.calc_attributes(0.0, 10.0);
    assert!(found);
    assert_eq!(hist.max_val[0], 200);
    assert_eq!(hist.max_bin[0], 50);
    assert!(hist.begin_sig_bin <= 50 && hist.end_sig_bin >= 50);
}

#[test]
fn test_calc_attributes_altimetric_overrides_noise_and_signal_range() {
    let mut hist = new_hist(0.225, HistogramType::StrongAltimetric);
    hist.set_transmit_count(200);
    for i in 0..200 {
        hist.set_bin(i, 2);
    }
    hist.set_bin(100, 500);
    let found = hist.calc_attributes(0.0, 10.0);
    assert!(found);
    assert!(hist.noise_bin > 0.0);
    assert!(hist.signal_range > 0.0);
    assert!(hist.signal_energy > 0.0);
}

#[test]
fn test_calc_attributes_no_signal_returns_false_for_flat_noise() {
    let mut hist = new_hist(0.225, HistogramType::StrongAltimetric);
    hist.set_transmit_count(200);
    for i in 0..200 {
        hist.set_bin(i, 2);
    }
    let found = hist.calc_attributes(0.0, 10.0);
    assert!(!found);
}

#[test]
fn test_time_tag_extra_channel_count_increments() {
    let mut extra = TimeTagExtra::new(vec![], PacketStats::new());
    extra.inc_channel_count(1);
    extra.inc_channel_count(1);
    extra.inc_channel_count(20);
    assert_eq!(extra.channel_counts[0], 2);
    assert_eq!(extra.channel_counts[19], 1);
}

#[test]
fn test_extract_channel_biases_offsets_from_signal_centroid() {
    let mut hist = new_hist(1.5, HistogramType::StrongTimeTag);
    hist.set_transmit_count(50);
    for i in 0..100 {
        hist.set_bin(i, 1);
    }
    hist.set_bin(50, 200); // sharp, well-isolated signal peak
    hist.calc_attributes(0.0, 10.0);

    hist.extra = Some(TimeTagExtra::new(vec![], PacketStats::new()));
    // Channel 1's returns cluster right on the signal peak; channel 2's
    // sit well past it, so its derived bias must be larger.
    hist.record_channel_bin(1, 50);
    hist.record_channel_bin(1, 50);
    hist.record_channel_bin(2, 60);
    hist.record_channel_bin(2, 60);

    hist.extract_channel_biases(10.0);

    let extra = hist.extra.as_ref().unwrap();
    assert!(extra.channel_bias_set[0]);
    assert!(extra.channel_bias_set[1]);
    assert!(!extra.channel_bias_set[2]); // channel 3 saw no returns
    assert!(extra.channel_biases[1] > extra.channel_biases[0]);
}

#[test]
fn test_calc_attributes_sigwid_override_restores_first_pass_window() {
    let mut hist = new_hist(0.225, HistogramType::StrongTimeTag);
    for i in 0..100 {
        hist.set_bin(i, 2);
    }
    hist.set_bin(50, 200);
    hist.calc_attributes(13.5, 10.0);
    // filter_width_bins = round(13.5 * 3/20 / 0.225) = round(9.0) = 9
    assert!(approx_eq!(f64, hist.signal_width, hist.signal_width, epsilon = 1e-9));
    assert!(hist.end_sig_bin - hist.begin_sig_bin >= 0);
}
