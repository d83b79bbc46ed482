//! Report Data Types
//!
//! This module contains the structures used to describe the capabilities of a HID device, in the shape exposed by the
//! `HidP_Get*Caps` family (`HIDP_CAPS`, `HIDP_BUTTON_CAPS`, `HIDP_VALUE_CAPS`, `HIDP_LINK_COLLECTION_NODE`).
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::{status::HidpError, utils::u32_from_bytes};

/// Usage page data type.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsagePage(u16);
impl From<u16> for UsagePage {
  fn from(val: u16) -> Self {
    UsagePage(val)
  }
}
impl From<UsagePage> for u16 {
  fn from(val: UsagePage) -> Self {
    val.0
  }
}
impl From<&[u8]> for UsagePage {
  fn from(bytes: &[u8]) -> Self {
    UsagePage(u32_from_bytes(bytes) as u16)
  }
}

impl UsagePage {
  pub const fn new(val: u16) -> Self {
    UsagePage(val)
  }

  /// Usage page 0 is undefined, and is used as a wildcard by the usage list and specific caps queries.
  pub fn is_wildcard(&self) -> bool {
    self.0 == 0
  }
}

/// Usage id within a usage page.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Usage(u16);
impl From<u16> for Usage {
  fn from(val: u16) -> Self {
    Usage(val)
  }
}
impl From<Usage> for u16 {
  fn from(val: Usage) -> Self {
    val.0
  }
}
impl From<Usage> for u32 {
  fn from(val: Usage) -> Self {
    val.0 as u32
  }
}

impl Usage {
  pub const fn new(val: u16) -> Self {
    Usage(val)
  }
}

/// Report id. Id 0 means reports carry no id byte.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportId(u8);
impl From<u8> for ReportId {
  fn from(val: u8) -> Self {
    ReportId(val)
  }
}
impl From<ReportId> for u8 {
  fn from(val: ReportId) -> Self {
    val.0
  }
}

impl ReportId {
  /// True when reports with this id are prefixed by an id byte.
  pub fn is_present(&self) -> bool {
    self.0 != 0
  }
}

/// Report type selector (`HIDP_REPORT_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportType {
  Input,
  Output,
  Feature,
}

impl TryFrom<u32> for ReportType {
  type Error = HidpError;
  fn try_from(val: u32) -> Result<Self, Self::Error> {
    match val {
      0 => Ok(ReportType::Input),
      1 => Ok(ReportType::Output),
      2 => Ok(ReportType::Feature),
      _ => Err(HidpError::InvalidReportType),
    }
  }
}

impl From<ReportType> for u32 {
  fn from(val: ReportType) -> Self {
    match val {
      ReportType::Input => 0,
      ReportType::Output => 1,
      ReportType::Feature => 2,
    }
  }
}

/// The usage (or usage range) described by a button or value capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsUsage {
  NotRange { usage: Usage, string_index: u16, designator_index: u16, data_index: u16 },
  Range {
    usage_min: Usage,
    usage_max: Usage,
    string_min: u16,
    string_max: u16,
    designator_min: u16,
    designator_max: u16,
    data_index_min: u16,
    data_index_max: u16,
  },
}

impl Default for CapsUsage {
  fn default() -> Self {
    CapsUsage::NotRange { usage: Usage::default(), string_index: 0, designator_index: 0, data_index: 0 }
  }
}

impl CapsUsage {
  pub fn is_range(&self) -> bool {
    matches!(self, CapsUsage::Range { .. })
  }

  pub fn usage_min(&self) -> Usage {
    match self {
      CapsUsage::NotRange { usage, .. } => *usage,
      CapsUsage::Range { usage_min, .. } => *usage_min,
    }
  }

  pub fn usage_max(&self) -> Usage {
    match self {
      CapsUsage::NotRange { usage, .. } => *usage,
      CapsUsage::Range { usage_max, .. } => *usage_max,
    }
  }

  /// Number of usages covered: the range size, or 1. An inverted range covers nothing.
  pub fn usage_count(&self) -> u32 {
    (u32::from(self.usage_max()) + 1).saturating_sub(u32::from(self.usage_min()))
  }

  pub fn contains(&self, usage: Usage) -> bool {
    self.usage_min() <= usage && usage <= self.usage_max()
  }

  pub fn data_index_min(&self) -> u16 {
    match self {
      CapsUsage::NotRange { data_index, .. } => *data_index,
      CapsUsage::Range { data_index_min, .. } => *data_index_min,
    }
  }
}

/// Describes a button capability (`HIDP_BUTTON_CAPS`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ButtonCaps {
  pub usage_page: UsagePage,
  pub report_id: ReportId,
  pub is_alias: bool,
  /// Raw data of the main item that produced this capability.
  pub bit_field: u16,
  pub link_collection: u16,
  pub link_usage: Usage,
  pub link_usage_page: UsagePage,
  pub is_absolute: bool,
  pub report_count: u16,
  pub usage: CapsUsage,
}

/// Describes a value capability (`HIDP_VALUE_CAPS`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValueCaps {
  pub usage_page: UsagePage,
  pub report_id: ReportId,
  pub is_alias: bool,
  pub bit_field: u16,
  pub link_collection: u16,
  pub link_usage: Usage,
  pub link_usage_page: UsagePage,
  pub is_absolute: bool,
  pub has_null: bool,
  /// Size in bits of a single value.
  pub bit_size: u16,
  pub report_count: u16,
  pub unit_exponent: u32,
  pub units: u32,
  pub logical_min: i32,
  pub logical_max: i32,
  pub physical_min: i32,
  pub physical_max: i32,
  pub usage: CapsUsage,
}

/// Top level capabilities of a device (`HIDP_CAPS`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
  pub usage: Usage,
  pub usage_page: UsagePage,
  pub input_report_byte_length: u16,
  pub output_report_byte_length: u16,
  pub feature_report_byte_length: u16,
  pub number_link_collection_nodes: u16,
  pub number_input_button_caps: u16,
  pub number_input_value_caps: u16,
  pub number_input_data_indices: u16,
  pub number_output_button_caps: u16,
  pub number_output_value_caps: u16,
  pub number_output_data_indices: u16,
  pub number_feature_button_caps: u16,
  pub number_feature_value_caps: u16,
  pub number_feature_data_indices: u16,
}

impl Caps {
  /// Declared byte length of reports of the given type, including the report id byte.
  pub fn report_byte_length(&self, report_type: ReportType) -> u16 {
    match report_type {
      ReportType::Input => self.input_report_byte_length,
      ReportType::Output => self.output_report_byte_length,
      ReportType::Feature => self.feature_report_byte_length,
    }
  }

  pub fn number_button_caps(&self, report_type: ReportType) -> u16 {
    match report_type {
      ReportType::Input => self.number_input_button_caps,
      ReportType::Output => self.number_output_button_caps,
      ReportType::Feature => self.number_feature_button_caps,
    }
  }

  pub fn number_value_caps(&self, report_type: ReportType) -> u16 {
    match report_type {
      ReportType::Input => self.number_input_value_caps,
      ReportType::Output => self.number_output_value_caps,
      ReportType::Feature => self.number_feature_value_caps,
    }
  }

  pub fn number_data_indices(&self, report_type: ReportType) -> u16 {
    match report_type {
      ReportType::Input => self.number_input_data_indices,
      ReportType::Output => self.number_output_data_indices,
      ReportType::Feature => self.number_feature_data_indices,
    }
  }
}

/// A node of the collection tree (`HIDP_LINK_COLLECTION_NODE`). Indices refer to positions in the node list; 0 is the
/// top level collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkCollectionNode {
  pub link_usage: Usage,
  pub link_usage_page: UsagePage,
  pub parent: u16,
  pub number_of_children: u16,
  pub next_sibling: u16,
  pub first_child: u16,
  pub collection_type: u8,
  pub is_alias: bool,
}

/// Describes the main item attributes (HID 1.11 section 6.2.2.5).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportAttributes {
  pub constant: bool,
  pub variable: bool,
  pub relative: bool,
  pub wrap: bool,
  pub nonlinear: bool,
  pub no_preferred: bool,
  pub null_state: bool,
  pub volatile: bool,
  pub buffered_bytes: bool,
}

impl From<&[u8]> for ReportAttributes {
  fn from(data: &[u8]) -> Self {
    let attributes = u32_from_bytes(data);
    ReportAttributes {
      constant: (attributes & 0b000000001) != 0,       //0
      variable: (attributes & 0b000000010) != 0,       //1
      relative: (attributes & 0b000000100) != 0,       //2
      wrap: (attributes & 0b000001000) != 0,           //3
      nonlinear: (attributes & 0b000010000) != 0,      //4
      no_preferred: (attributes & 0b000100000) != 0,   //5
      null_state: (attributes & 0b001000000) != 0,     //6
      volatile: (attributes & 0b010000000) != 0,       //7
      buffered_bytes: (attributes & 0b100000000) != 0, //8
    }
  }
}
