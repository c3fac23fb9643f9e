// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with the timekeeping correlator.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimekeepingError {
    #[error("sample rejected: mandatory field was zero ({field})")]
    ZeroedMandatoryField { field: &'static str },
}
