// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with histogram records.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistogramError {
    #[error("bin size must be positive, got {0}")]
    NonPositiveBinSize(f64),

    #[error("integration period must be positive, got {0}")]
    NonPositiveIntegrationPeriod(i64),
}
