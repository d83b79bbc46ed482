//! Preparsed Data
//!
//! This module defines the immutable table that the report accessors run against: for each report type, an ordered
//! list of report records, each holding the button and value elements that live in that report.
//!
//! A [`PreparsedData`] is validated once when it is built. Every element is known to fit inside its report and to have
//! a supported bit size, so the accessors never need to re-check the table itself.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;
use log::debug;

use crate::{
  report_data_types::{ButtonCaps, Caps, LinkCollectionNode, ReportId, ReportType, ValueCaps},
  status::{HidpError, HidpResult},
};

/// Largest field the bit reader can return in one value.
pub const MAX_VALUE_BITS: u32 = 32;

/// How the bits of a button element encode pressed usages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLayout {
  /// One bit per usage, in usage order.
  Bitmap,
  /// `bit_count / slot_bits` selector slots, each holding `usage index + logical_minimum` of a pressed usage, or a
  /// value outside the usage range when empty.
  Array { slot_bits: u32, logical_minimum: i32 },
}

/// A button field within a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonElement {
  pub value_start_bit: u32,
  pub bit_count: u32,
  pub layout: ButtonLayout,
  pub caps: ButtonCaps,
}

impl ButtonElement {
  /// Number of usages this element can report at once.
  pub fn max_usages(&self) -> u32 {
    match self.layout {
      ButtonLayout::Bitmap => self.caps.usage.usage_count(),
      ButtonLayout::Array { slot_bits, .. } => (self.bit_count / slot_bits).min(self.caps.usage.usage_count()),
    }
  }
}

/// A value field within a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueElement {
  pub value_start_bit: u32,
  pub bit_count: u32,
  pub caps: ValueCaps,
}

/// A single field of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
  Button(ButtonElement),
  Value(ValueElement),
}

impl Element {
  pub fn value_start_bit(&self) -> u32 {
    match self {
      Element::Button(button) => button.value_start_bit,
      Element::Value(value) => value.value_start_bit,
    }
  }

  pub fn bit_count(&self) -> u32 {
    match self {
      Element::Button(button) => button.bit_count,
      Element::Value(value) => value.bit_count,
    }
  }

  pub fn link_collection(&self) -> u16 {
    match self {
      Element::Button(button) => button.caps.link_collection,
      Element::Value(value) => value.caps.link_collection,
    }
  }

  // number of data indices occupied by this element.
  fn data_indices(&self) -> u32 {
    match self {
      Element::Button(button) => button.caps.usage.usage_count(),
      Element::Value(value) => value.caps.usage.usage_count(),
    }
  }
}

/// Describes one report (one report id) of a given type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
  /// Report id, or 0 if reports carry no id byte.
  pub report_id: ReportId,
  /// Length in bytes of the report, including the id byte.
  pub byte_length: usize,
  /// The fields of the report, in report order.
  pub elements: Vec<Element>,
}

impl ReportRecord {
  /// True when this record describes a report whose id byte is `id`. Records without an id match any report.
  pub fn matches(&self, id: Option<u8>) -> bool {
    !self.report_id.is_present() || id == Some(u8::from(self.report_id))
  }
}

/// Validated preparsed data for a HID device.
#[derive(Debug, Clone)]
pub struct PreparsedData {
  caps: Caps,
  link_collection_nodes: Vec<LinkCollectionNode>,
  input_reports: Vec<ReportRecord>,
  output_reports: Vec<ReportRecord>,
  features: Vec<ReportRecord>,
}

fn validate_element(record: &ReportRecord, element: &Element, nodes: usize) -> HidpResult<()> {
  let end_bit = element.value_start_bit() as u64 + element.bit_count() as u64;
  if end_bit > record.byte_length as u64 * 8 {
    debug!("element ending at bit {end_bit} exceeds report {:?} of {} bytes", record.report_id, record.byte_length);
    return Err(HidpError::InvalidPreparsedData);
  }
  if element.bit_count() == 0 || (nodes > 0 && element.link_collection() as usize >= nodes) {
    return Err(HidpError::InvalidPreparsedData);
  }
  let (usage, report_id) = match element {
    Element::Button(button) => (button.caps.usage, button.caps.report_id),
    Element::Value(value) => (value.caps.usage, value.caps.report_id),
  };
  if usage.usage_min() > usage.usage_max() || report_id != record.report_id {
    return Err(HidpError::InvalidPreparsedData);
  }
  let valid_layout = match element {
    Element::Button(button) => match button.layout {
      ButtonLayout::Bitmap => button.bit_count == button.caps.usage.usage_count(),
      ButtonLayout::Array { slot_bits, .. } => {
        slot_bits > 0 && slot_bits <= MAX_VALUE_BITS && button.bit_count % slot_bits == 0
      }
    },
    // the scaled reader sign extends by the caps bit size, so it has to describe the field.
    Element::Value(value) => value.bit_count <= MAX_VALUE_BITS && value.caps.bit_size as u32 == value.bit_count,
  };
  if !valid_layout {
    return Err(HidpError::InvalidPreparsedData);
  }
  Ok(())
}

// validates a report list and returns (byte length, button caps, value caps, data indices).
fn validate_reports(reports: &[ReportRecord], nodes: usize) -> HidpResult<(usize, usize, usize, usize)> {
  let mut byte_length = 0;
  let (mut buttons, mut values, mut data_indices) = (0, 0, 0);
  let uses_ids = reports.iter().any(|record| record.report_id.is_present());
  for (index, record) in reports.iter().enumerate() {
    // a report without an id byte can only be the sole report of its type.
    if uses_ids && !record.report_id.is_present() {
      return Err(HidpError::InvalidPreparsedData);
    }
    if reports[..index].iter().any(|other| other.report_id == record.report_id) {
      return Err(HidpError::InvalidPreparsedData);
    }
    for element in &record.elements {
      validate_element(record, element, nodes)?;
      match element {
        Element::Button(_) => buttons += 1,
        Element::Value(_) => values += 1,
      }
      data_indices += element.data_indices() as usize;
    }
    byte_length = byte_length.max(record.byte_length);
  }
  Ok((byte_length, buttons, values, data_indices))
}

fn to_u16(count: usize) -> HidpResult<u16> {
  u16::try_from(count).map_err(|_| HidpError::InvalidPreparsedData)
}

impl PreparsedData {
  /// Builds validated preparsed data from report records.
  ///
  /// Only the top level usage and usage page of `caps` are taken from the caller; report lengths and element counts
  /// are computed from the records. Returns [`HidpError::InvalidPreparsedData`] if an element does not fit inside its
  /// report, has an unsupported bit size or an inverted usage range, references a missing link collection, or if
  /// report ids are duplicated or mixed with id-less reports.
  pub fn new(
    caps: Caps,
    link_collection_nodes: Vec<LinkCollectionNode>,
    input_reports: Vec<ReportRecord>,
    output_reports: Vec<ReportRecord>,
    features: Vec<ReportRecord>,
  ) -> HidpResult<Self> {
    let nodes = link_collection_nodes.len();
    let (input_len, input_buttons, input_values, input_indices) = validate_reports(&input_reports, nodes)?;
    let (output_len, output_buttons, output_values, output_indices) = validate_reports(&output_reports, nodes)?;
    let (feature_len, feature_buttons, feature_values, feature_indices) = validate_reports(&features, nodes)?;

    let caps = Caps {
      usage: caps.usage,
      usage_page: caps.usage_page,
      input_report_byte_length: to_u16(input_len)?,
      output_report_byte_length: to_u16(output_len)?,
      feature_report_byte_length: to_u16(feature_len)?,
      number_link_collection_nodes: to_u16(nodes)?,
      number_input_button_caps: to_u16(input_buttons)?,
      number_input_value_caps: to_u16(input_values)?,
      number_input_data_indices: to_u16(input_indices)?,
      number_output_button_caps: to_u16(output_buttons)?,
      number_output_value_caps: to_u16(output_values)?,
      number_output_data_indices: to_u16(output_indices)?,
      number_feature_button_caps: to_u16(feature_buttons)?,
      number_feature_value_caps: to_u16(feature_values)?,
      number_feature_data_indices: to_u16(feature_indices)?,
    };

    Ok(PreparsedData { caps, link_collection_nodes, input_reports, output_reports, features })
  }

  /// Top level capabilities.
  pub fn caps(&self) -> &Caps {
    &self.caps
  }

  /// The collection tree, node 0 being the top level collection.
  pub fn link_collections(&self) -> &[LinkCollectionNode] {
    &self.link_collection_nodes
  }

  /// The report records of the given type, in descriptor order.
  pub fn reports(&self, report_type: ReportType) -> &[ReportRecord] {
    match report_type {
      ReportType::Input => &self.input_reports,
      ReportType::Output => &self.output_reports,
      ReportType::Feature => &self.features,
    }
  }
}
