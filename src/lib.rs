//! HID Report Accessors
//!
//! This crate turns a raw HID report descriptor into preparsed data, and implements the `HidP_*` family of accessors
//! over it: capability queries, reading and writing usage values, listing and updating pressed buttons, and preparing
//! outgoing reports.
//!
//! Refer to the USB Device Class Definition for Human Interface Devices (HID) Version 1.11
//! <https://www.usb.org/sites/default/files/hid1_11.pdf>
//!
//! ## Example
//! ```
//! # use hidp::{PreparsedData, ReportId, ReportType, Usage, UsagePage};
//!
//!   let GAMEPAD_REPORT_DESCRIPTOR: &[u8] = &[
//!     0x05, 0x01, // USAGE_PAGE (Generic Desktop)
//!     0x09, 0x05, // USAGE (Game Pad)
//!     0xa1, 0x01, // COLLECTION (Application)
//!     0x85, 0x01, //    REPORT_ID (1)
//!     0x09, 0x30, //    USAGE (X)
//!     0x09, 0x31, //    USAGE (Y)
//!     0x15, 0x81, //    LOGICAL_MINIMUM (-127)
//!     0x25, 0x7f, //    LOGICAL_MAXIMUM (127)
//!     0x75, 0x08, //    REPORT_SIZE (8)
//!     0x95, 0x02, //    REPORT_COUNT (2)
//!     0x81, 0x02, //    INPUT (Data, Var, Abs)
//!     0x05, 0x09, //    USAGE_PAGE (Button)
//!     0x19, 0x01, //    USAGE_MINIMUM (1)
//!     0x29, 0x08, //    USAGE_MAXIMUM (8)
//!     0x15, 0x00, //    LOGICAL_MINIMUM (0)
//!     0x25, 0x01, //    LOGICAL_MAXIMUM (1)
//!     0x75, 0x01, //    REPORT_SIZE (1)
//!     0x95, 0x08, //    REPORT_COUNT (8)
//!     0x81, 0x02, //    INPUT (Data, Var, Abs)
//!     0xc0, // END_COLLECTION
//!   ];
//!
//!   let data = PreparsedData::from_descriptor(GAMEPAD_REPORT_DESCRIPTOR).unwrap();
//!   assert_eq!(data.get_caps().input_report_byte_length, 4);
//!
//!   // report 1: X = 0x10, Y = 0x20, buttons 1 and 3.
//!   let report = [0x01, 0x10, 0x20, 0b0000_0101];
//!   let x = data.get_usage_value(ReportType::Input, UsagePage::from(0x01), 0, Usage::from(0x30), &report);
//!   assert_eq!(x, Ok(0x10));
//!
//!   let mut buttons = [Usage::default(); 8];
//!   let count = data.get_usages(ReportType::Input, UsagePage::from(0x09), 0, &mut buttons, &report).unwrap();
//!   assert_eq!(&buttons[..count], &[Usage::from(1), Usage::from(3)]);
//!
//!   // building a report is the reverse: initialize it for the id, then set fields.
//!   let mut report = [0u8; 4];
//!   data.initialize_report_for_id(ReportType::Input, ReportId::from(1), &mut report).unwrap();
//!   data.set_usages(ReportType::Input, UsagePage::from(0x09), 0, &[Usage::from(8)], &mut report).unwrap();
//!   assert_eq!(report, [0x01, 0x00, 0x00, 0b1000_0000]);
//! ```
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

#![no_std]
mod hidp;
mod item_tokenizer;
pub mod preparsed_data;
pub mod preparser;
pub mod report_bits;
pub mod report_data_types;
pub mod status;
mod utils;

extern crate alloc;

pub use preparsed_data::PreparsedData;
pub use preparser::{preparse_report_descriptor, PreparseError};
pub use report_bits::{read_bits, read_field_bits, write_bits};
pub use report_data_types::{
  ButtonCaps, Caps, CapsUsage, LinkCollectionNode, ReportId, ReportType, Usage, UsagePage, ValueCaps,
};
pub use status::{ntstatus, HidpError, HidpResult, HIDP_STATUS_SUCCESS};
