//! HIDP Status Codes
//!
//! This module defines the error type returned by the report accessors. Each variant corresponds to one of the
//! `HIDP_STATUS_*` NTSTATUS values, and [`HidpError::ntstatus`] returns the exact value so that callers bridging to a
//! Windows-style ABI can pass it through unchanged.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use thiserror::Error;

use crate::report_data_types::Usage;

/// NTSTATUS value reported for a successful HIDP call.
pub const HIDP_STATUS_SUCCESS: u32 = 0x0011_0000;

/// Errors returned by the report accessors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidpError {
  /// The preparsed data failed validation.
  #[error("invalid preparsed data")]
  InvalidPreparsedData,
  /// The report type is not one of Input, Output or Feature.
  #[error("invalid report type")]
  InvalidReportType,
  /// The report buffer is too short for the field, or does not match the declared report length.
  #[error("invalid report length")]
  InvalidReportLength,
  /// No report record matches the requested report id.
  #[error("report does not exist")]
  ReportDoesNotExist,
  /// No element matches the requested usage page / usage.
  #[error("usage not found")]
  UsageNotFound,
  /// A usage passed to a setter could not be located. `index` is its position in the caller's list.
  #[error("usage {usage:?} at index {index} not found")]
  UsageNotFoundAt { usage: Usage, index: usize },
  /// The caller supplied output buffer cannot hold every result.
  #[error("buffer too small")]
  BufferTooSmall,
  /// The value does not fit in the field.
  #[error("value out of range")]
  ValueOutOfRange,
  /// A report buffer already carries a different report id than the field being written.
  #[error("incompatible report id")]
  IncompatibleReportId,
}

impl HidpError {
  /// Returns the `HIDP_STATUS_*` NTSTATUS value for this error.
  pub fn ntstatus(&self) -> u32 {
    match self {
      HidpError::InvalidPreparsedData => 0xC011_0001,
      HidpError::InvalidReportType => 0xC011_0002,
      HidpError::InvalidReportLength => 0xC011_0003,
      HidpError::UsageNotFound | HidpError::UsageNotFoundAt { .. } => 0xC011_0004,
      HidpError::ValueOutOfRange => 0xC011_0005,
      HidpError::BufferTooSmall => 0xC011_0007,
      HidpError::IncompatibleReportId => 0xC011_000A,
      HidpError::ReportDoesNotExist => 0xC011_0010,
    }
  }
}

/// Result type used by the report accessors.
pub type HidpResult<T> = core::result::Result<T, HidpError>;

/// Converts an accessor result into the NTSTATUS value a `HidP_*` caller expects.
pub fn ntstatus<T>(result: &HidpResult<T>) -> u32 {
  match result {
    Ok(_) => HIDP_STATUS_SUCCESS,
    Err(err) => err.ntstatus(),
  }
}
