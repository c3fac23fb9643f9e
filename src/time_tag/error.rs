// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with the time-tag integrator.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeTagError {
    #[error("start segment too short: need at least {needed} bytes, got {actual}")]
    StartSegmentTooShort { needed: usize, actual: usize },

    #[error("segment received in state {state}, expected a start segment")]
    UnexpectedSegmentInIdle { state: &'static str },
}
