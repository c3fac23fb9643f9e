// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with writing the live CSV report file.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to open or write live file: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),
}
