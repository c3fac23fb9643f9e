// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
General helper/utility methods shared across components.
*/

#[cfg(test)]
mod test;

/// Floating point remainder with the sign of `value` (matches C's `fmod`,
/// and `std::f64::rem_euclid`'s unsigned cousin is the wrong tool here
/// since several callers need the negative-offset branch of spec.md
/// §4.4.2's TEP-blocking `fmod(rws, 100000)` calculation).
///
/// # Arguments
///
/// * `value` - the dividend
///
/// * `modulus` - the divisor
///
///
/// # Returns
///
/// * `value - modulus * trunc(value / modulus)`
///
pub fn fmod(value: f64, modulus: f64) -> f64 {
    value - modulus * (value / modulus).trunc()
}

/// Normalizes `value` modulo `period` into the centered half-open range
/// `(-period/2, period/2]`, used by the loopback-correction range-from-tx
/// normalization in spec.md §4.4.2.
///
/// # Arguments
///
/// * `value` - the value to normalize, in the same units as `period`
///
/// * `period` - the period to normalize against (must be positive)
///
///
/// # Returns
///
/// * the centered representative of `value mod period`
///
pub fn wrap_to_centered(value: f64, period: f64) -> f64 {
    let mut r = fmod(value, period);
    if r > period / 2.0 {
        r -= period;
    } else if r <= -period / 2.0 {
        r += period;
    }
    r
}

/// Bin-weighted centroid of a closed bin range `[start, end]`, used by
/// `calcAttributes`'s altimetric `signalRange` computation (spec.md §4.1
/// step 8).
///
/// # Arguments
///
/// * `bins` - the full bin array
///
/// * `start` - first bin of the region (inclusive)
///
/// * `end` - last bin of the region (inclusive)
///
///
/// # Returns
///
/// * the weighted-mean bin index of the region, or `start` as `f64` if the
///   region sums to zero
///
pub fn weighted_centroid(bins: &[i64], start: usize, end: usize) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total = 0.0;
    for (i, &v) in bins.iter().enumerate().take(end + 1).skip(start) {
        weighted_sum += i as f64 * v as f64;
        total += v as f64;
    }

    if total > 0.0 {
        weighted_sum / total
    } else {
        start as f64
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Builds a synthetic `tempfile::NamedTempFile` path string for
    /// report-writer "live file" tests.
    pub fn temp_csv_path(tmp: &tempfile::TempDir, filename: &str) -> std::path::PathBuf {
        tmp.path().join(filename)
    }
}
