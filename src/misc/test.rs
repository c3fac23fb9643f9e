use super::*;
use float_cmp::approx_eq;

#[test]
fn test_fmod_positive() {
    assert!(approx_eq!(f64, fmod(10.0, 3.0), 1.0, epsilon = 1e-9));
}

#[test]
fn test_fmod_negative() {
    assert!(approx_eq!(f64, fmod(-10.0, 3.0), -1.0, epsilon = 1e-9));
}

#[test]
fn test_wrap_to_centered() {
    assert!(approx_eq!(f64, wrap_to_centered(75.0, 10000.0), 75.0, epsilon = 1e-9));
    assert!(approx_eq!(
        f64,
        wrap_to_centered(9950.0, 10000.0),
        -50.0,
        epsilon = 1e-9
    ));
    assert!(approx_eq!(
        f64,
        wrap_to_centered(5000.0, 10000.0),
        5000.0,
        epsilon = 1e-9
    ));
}

#[test]
fn test_weighted_centroid_uniform() {
    let bins = vec![0_i64, 10, 10, 10, 0];
    // uniform weight across bins 1..=3 -> centroid is the middle bin
    assert!(approx_eq!(f64, weighted_centroid(&bins, 1, 3), 2.0, epsilon = 1e-9));
}

#[test]
fn test_weighted_centroid_empty_region() {
    let bins = vec![0_i64, 0, 0];
    assert!(approx_eq!(f64, weighted_centroid(&bins, 1, 2), 1.0, epsilon = 1e-9));
}
