use super::*;

#[test]
fn test_pce_from_index() {
    assert_eq!(Pce::from_index(0), Some(Pce::Pce0));
    assert_eq!(Pce::from_index(2), Some(Pce::Pce2));
    assert_eq!(Pce::from_index(3), None);
}

#[test]
fn test_spot_from_channel() {
    assert_eq!(Spot::from_channel(1), Spot::Strong);
    assert_eq!(Spot::from_channel(16), Spot::Strong);
    assert_eq!(Spot::from_channel(17), Spot::Weak);
    assert_eq!(Spot::from_channel(20), Spot::Weak);
}

#[test]
fn test_histogram_type_round_trip() {
    for t in [
        HistogramType::StrongAltimetric,
        HistogramType::WeakAltimetric,
        HistogramType::StrongAtmospheric,
        HistogramType::WeakAtmospheric,
        HistogramType::StrongTimeTag,
        HistogramType::WeakTimeTag,
        HistogramType::GroundTestStrong,
        HistogramType::GroundTestWeak,
        HistogramType::WeakTestSim,
    ] {
        assert_eq!(HistogramType::from_str(t.as_str()), t);
    }
}

#[test]
fn test_histogram_type_is_altimetric() {
    assert!(HistogramType::StrongAltimetric.is_altimetric());
    assert!(HistogramType::WeakAtmospheric.is_altimetric());
    assert!(!HistogramType::StrongTimeTag.is_altimetric());
}
