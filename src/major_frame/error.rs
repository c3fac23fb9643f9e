// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with major-frame status decoding.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MajorFrameError {
    #[error("major-frame payload must be {expected} bytes, got {actual}")]
    WrongPayloadLength { expected: usize, actual: usize },
}
