// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Structs and helper methods for Error handling

use thiserror::Error;

/// AtlasError subtypes. Only setup/contract failures are represented here —
/// per spec.md §4.4.5 and §7, routine per-packet parse anomalies are
/// counted in `PacketStats`, never returned as `Err`.
#[derive(Error, Debug)]
pub enum AtlasError {
    /// An error derived from `HistogramError`.
    #[error("{0}")]
    Histogram(#[from] crate::histogram::error::HistogramError),

    /// An error derived from `MajorFrameError`.
    #[error("{0}")]
    MajorFrame(#[from] crate::major_frame::error::MajorFrameError),

    /// An error derived from `TimekeepingError`.
    #[error("{0}")]
    Timekeeping(#[from] crate::timekeeping::error::TimekeepingError),

    /// An error derived from `TimeTagError`.
    #[error("{0}")]
    TimeTag(#[from] crate::time_tag::error::TimeTagError),

    /// An error derived from `ReportError`.
    #[error("{0}")]
    Report(#[from] crate::report::error::ReportError),
}
