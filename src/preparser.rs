//! Report Descriptor Preparser
//!
//! This module turns a raw report descriptor into [`PreparsedData`]: one table per top level collection, holding the
//! button and value elements of each input, output and feature report together with the collection tree.
//!
//! Parsing follows HID spec 1.11 section 6.2.2: global items persist (with push/pop), local items apply to the next
//! main item only, and each Input/Output/Feature main item allocates `report_size * report_count` bits in the report
//! selected by the current report id.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{collections::BTreeMap, vec::Vec};
use log::{debug, trace};
use thiserror::Error;

use crate::{
  item_tokenizer::{DescriptorItemTokenizer, GlobalTag, ItemTag, LocalTag, MainTag, ReportItem},
  preparsed_data::{
    ButtonElement, ButtonLayout, Element, PreparsedData, ReportRecord, ValueElement, MAX_VALUE_BITS,
  },
  report_data_types::{
    ButtonCaps, Caps, CapsUsage, LinkCollectionNode, ReportAttributes, ReportId, ReportType, Usage, UsagePage,
    ValueCaps,
  },
  status::HidpError,
  utils::{i32_from_bytes, u32_from_bytes},
};

/// Defines errors generated while preparsing a report descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreparseError {
  #[error("invalid main item tag {0:#x}")]
  InvalidMainItem(u8),
  #[error("invalid global item tag {0:#x}")]
  InvalidGlobalItem(u8),
  #[error("invalid local item tag {0:#x}")]
  InvalidLocalItem(u8),
  #[error("reserved items are not supported")]
  ReservedItemNotSupported,
  #[error("delimiters are not supported")]
  DelimiterNotSupported,
  #[error("pop without a matching push")]
  InvalidPop,
  #[error("item at offset {0} runs past the end of the descriptor")]
  TruncatedItem(usize),
  #[error("main item outside of any collection")]
  MainItemOutsideCollection,
  #[error("unbalanced collection")]
  UnbalancedCollection,
  #[error("descriptor declares no top level collection")]
  NoTopLevelCollection,
  #[error("report id must be in 1..=255")]
  InvalidReportId,
  #[error("report field without a report size")]
  InvalidReportNoSize,
  #[error("report field without a report count")]
  InvalidReportNoCount,
  #[error("report field without a logical minimum")]
  InvalidReportNoLogicalMin,
  #[error("report field without a logical maximum")]
  InvalidReportNoLogicalMax,
  #[error("usage minimum without usage maximum")]
  InvalidUsageRange,
  #[error("report field of {0} bits is wider than a single value")]
  FieldTooWide(u32),
  #[error("report is too long")]
  ReportTooLong,
  #[error(transparent)]
  InvalidPreparsedData(#[from] HidpError),
}

impl From<PreparseError> for HidpError {
  fn from(_: PreparseError) -> Self {
    HidpError::InvalidPreparsedData
  }
}

// A local usage item: either a single usage or a min/max range. 32-bit usage items carry their own page.
#[derive(Debug, Clone, Copy)]
struct LocalUsage {
  page: Option<UsagePage>,
  min: u16,
  max: u16,
}

impl LocalUsage {
  fn from_item(data: &[u8]) -> (Option<UsagePage>, u16) {
    let usage = u32_from_bytes(data);
    let page = if data.len() == 4 { Some(UsagePage::from((usage >> 16) as u16)) } else { None };
    (page, (usage & 0xFFFF) as u16)
  }

  fn count(&self) -> u32 {
    self.max as u32 - self.min as u32 + 1
  }
}

// Tracks Global State as parsing proceeds.
// A snapshot of this structure is included with each ReportData that is produced by parsing.
#[derive(Debug, Clone, Default)]
struct GlobalItemStateTable {
  usage_page: Option<UsagePage>,
  logical_minimum: Option<i32>,
  logical_maximum: Option<i32>,
  physical_minimum: Option<i32>,
  physical_maximum: Option<i32>,
  unit_exponent: Option<u32>,
  unit: Option<u32>,
  report_size: Option<u32>,
  report_id: Option<ReportId>,
  report_count: Option<u32>,
}

// Tracks Local State as parsing proceeds.
// This structure is reset to defaults after each main item.
#[derive(Debug, Clone, Default)]
struct LocalItemStateTable {
  usages: Vec<LocalUsage>,
  usage_minimum: Option<(Option<UsagePage>, u16)>,
  usage_maximum: Option<(Option<UsagePage>, u16)>,
  designator_index: Option<u16>,
  designator_minimum: Option<u16>,
  designator_maximum: Option<u16>,
  string_index: Option<u16>,
  string_minimum: Option<u16>,
  string_maximum: Option<u16>,
}

// Represents a single Input/Output/Feature main item.
struct ReportData {
  attributes: ReportAttributes,
  bit_field: u16,
  global_state: GlobalItemStateTable,
  local_state: LocalItemStateTable,
  link_collection: u16,
}

// Reports and collection tree of one top level collection, as collected during parsing.
#[derive(Default)]
struct TopLevelCollection {
  nodes: Vec<LinkCollectionNode>,
  input_reports: BTreeMap<ReportId, Vec<ReportData>>,
  output_reports: BTreeMap<ReportId, Vec<ReportData>>,
  features: BTreeMap<ReportId, Vec<ReportData>>,
}

impl TopLevelCollection {
  fn reports_mut(&mut self, report_type: ReportType) -> &mut BTreeMap<ReportId, Vec<ReportData>> {
    match report_type {
      ReportType::Input => &mut self.input_reports,
      ReportType::Output => &mut self.output_reports,
      ReportType::Feature => &mut self.features,
    }
  }
}

/// Parses report descriptors into preparsed data.
pub struct ReportDescriptorPreparser {
  global_state: GlobalItemStateTable,
  global_stack: Vec<GlobalItemStateTable>,
  local_state: LocalItemStateTable,
  // indices into the node list of the current top level collection.
  active_collections: Vec<u16>,
  collections: Vec<TopLevelCollection>,
}

impl ReportDescriptorPreparser {
  // Instantiates a new report descriptor preparser.
  fn new() -> Self {
    ReportDescriptorPreparser {
      global_state: Default::default(),
      global_stack: Vec::new(),
      local_state: Default::default(),
      active_collections: Vec::new(),
      collections: Vec::new(),
    }
  }

  // handles the Collection main item.
  fn begin_collection(&mut self, item: &ReportItem) {
    let (page, id) = match self.local_state.usages.first() {
      Some(usage) => (usage.page, usage.min),
      None => (None, 0),
    };
    let mut node = LinkCollectionNode {
      link_usage: Usage::from(id),
      link_usage_page: page.or(self.global_state.usage_page).unwrap_or_default(),
      collection_type: u32_from_bytes(item.data) as u8,
      ..Default::default()
    };

    let Some(&parent) = self.active_collections.last() else {
      // new top level collection.
      self.collections.push(TopLevelCollection { nodes: Vec::from([node]), ..Default::default() });
      self.active_collections.push(0);
      return;
    };

    let Some(collection) = self.collections.last_mut() else { return };
    let index = collection.nodes.len() as u16;
    let parent_node = &mut collection.nodes[parent as usize];
    node.parent = parent;
    node.next_sibling = parent_node.first_child;
    parent_node.first_child = index;
    parent_node.number_of_children += 1;
    collection.nodes.push(node);
    self.active_collections.push(index);
  }

  // handles parsing for "main" items (Input/Output/Feature/Collection)
  fn parse_main(&mut self, tag: MainTag, item: &ReportItem) -> Result<(), PreparseError> {
    let report_type = match tag {
      MainTag::Input => ReportType::Input,
      MainTag::Output => ReportType::Output,
      MainTag::Feature => ReportType::Feature,
      MainTag::Collection => {
        self.begin_collection(item);
        self.local_state = Default::default();
        return Ok(());
      }
      MainTag::EndCollection => {
        self.active_collections.pop().ok_or(PreparseError::UnbalancedCollection)?;
        self.local_state = Default::default();
        return Ok(());
      }
      MainTag::Unknown(tag) => return Err(PreparseError::InvalidMainItem(tag)),
    };

    let link_collection = *self.active_collections.last().ok_or(PreparseError::MainItemOutsideCollection)?;
    let report_id = self.global_state.report_id.unwrap_or_default();
    let data = ReportData {
      attributes: ReportAttributes::from(item.data),
      bit_field: u32_from_bytes(item.data) as u16,
      global_state: self.global_state.clone(),
      local_state: core::mem::take(&mut self.local_state),
      link_collection,
    };
    if let Some(collection) = self.collections.last_mut() {
      collection.reports_mut(report_type).entry(report_id).or_default().push(data);
    }
    Ok(())
  }

  // handles parsing for "global" items
  fn parse_global(&mut self, tag: GlobalTag, item: &ReportItem) -> Result<(), PreparseError> {
    let state = &mut self.global_state;
    match tag {
      GlobalTag::UsagePage => state.usage_page = Some(UsagePage::from(item.data)),
      GlobalTag::LogicalMinimum => state.logical_minimum = Some(i32_from_bytes(item.data)),
      GlobalTag::LogicalMaximum => state.logical_maximum = Some(i32_from_bytes(item.data)),
      GlobalTag::PhysicalMinimum => state.physical_minimum = Some(i32_from_bytes(item.data)),
      GlobalTag::PhysicalMaximum => state.physical_maximum = Some(i32_from_bytes(item.data)),
      GlobalTag::UnitExponent => state.unit_exponent = Some(u32_from_bytes(item.data)),
      GlobalTag::Unit => state.unit = Some(u32_from_bytes(item.data)),
      GlobalTag::ReportSize => state.report_size = Some(u32_from_bytes(item.data)),
      GlobalTag::ReportId => {
        let id = u32_from_bytes(item.data);
        if id == 0 || id > 0xFF {
          return Err(PreparseError::InvalidReportId);
        }
        state.report_id = Some(ReportId::from(id as u8));
      }
      GlobalTag::ReportCount => state.report_count = Some(u32_from_bytes(item.data)),
      GlobalTag::Push => self.global_stack.push(self.global_state.clone()),
      GlobalTag::Pop => self.global_state = self.global_stack.pop().ok_or(PreparseError::InvalidPop)?,
      GlobalTag::Unknown(tag) => return Err(PreparseError::InvalidGlobalItem(tag)),
    };
    Ok(())
  }

  // handles parsing for "local" items
  fn parse_local(&mut self, tag: LocalTag, item: &ReportItem) -> Result<(), PreparseError> {
    let state = &mut self.local_state;
    let value = u32_from_bytes(item.data) as u16;
    match tag {
      LocalTag::Usage => {
        let (page, usage) = LocalUsage::from_item(item.data);
        state.usages.push(LocalUsage { page, min: usage, max: usage });
      }
      LocalTag::UsageMinimum => {
        let min = LocalUsage::from_item(item.data);
        match state.usage_maximum.take() {
          Some(max) => state.usages.push(LocalUsage { page: min.0.or(max.0), min: min.1, max: max.1 }),
          None => state.usage_minimum = Some(min),
        }
      }
      LocalTag::UsageMaximum => {
        let max = LocalUsage::from_item(item.data);
        match state.usage_minimum.take() {
          Some(min) => state.usages.push(LocalUsage { page: min.0.or(max.0), min: min.1, max: max.1 }),
          None => state.usage_maximum = Some(max),
        }
      }
      LocalTag::DesignatorIndex => state.designator_index = Some(value),
      LocalTag::DesignatorMinimum => state.designator_minimum = Some(value),
      LocalTag::DesignatorMaximum => state.designator_maximum = Some(value),
      LocalTag::StringIndex => state.string_index = Some(value),
      LocalTag::StringMinimum => state.string_minimum = Some(value),
      LocalTag::StringMaximum => state.string_maximum = Some(value),
      LocalTag::Delimiter => return Err(PreparseError::DelimiterNotSupported),
      LocalTag::Unknown(tag) => return Err(PreparseError::InvalidLocalItem(tag)),
    }
    Ok(())
  }

  // Processes the given item in the preparser and updates preparser state.
  fn parse_item(&mut self, item: ReportItem) -> Result<(), PreparseError> {
    trace!("descriptor item {:?} {:02x?}", item.tag, item.data);
    match item.tag {
      ItemTag::Main(tag) => self.parse_main(tag, &item),
      ItemTag::Global(tag) => self.parse_global(tag, &item),
      ItemTag::Local(tag) => self.parse_local(tag, &item),
      ItemTag::Long(_) => Ok(()),
      ItemTag::Reserved(_) => Err(PreparseError::ReservedItemNotSupported),
    }
  }

  /// Parses the given report descriptor and produces one [`PreparsedData`] per top level collection, in descriptor
  /// order.
  pub fn parse(report_descriptor: &[u8]) -> Result<Vec<PreparsedData>, PreparseError> {
    let mut item_tokenizer = DescriptorItemTokenizer::new(report_descriptor);
    let mut parser = Self::new();
    for item in item_tokenizer.by_ref() {
      parser.parse_item(item)?;
    }
    if item_tokenizer.is_truncated() {
      return Err(PreparseError::TruncatedItem(item_tokenizer.position()));
    }
    if !parser.active_collections.is_empty() {
      return Err(PreparseError::UnbalancedCollection);
    }
    parser.collections.into_iter().map(build_preparsed_data).collect()
  }
}

// Builder state for the elements of one report type.
struct ElementBuilder<'a> {
  nodes: &'a [LinkCollectionNode],
  report_id: ReportId,
  data_index: u16,
  elements: Vec<Element>,
}

impl ElementBuilder<'_> {
  fn next_data_indices(&mut self, count: u32) -> Result<(u16, u16), PreparseError> {
    let first = self.data_index;
    let last = u16::try_from(first as u32 + count - 1).map_err(|_| PreparseError::ReportTooLong)?;
    self.data_index = last.wrapping_add(1);
    Ok((first, last))
  }

  fn link(&self, data: &ReportData) -> (Usage, UsagePage) {
    let node = &self.nodes[data.link_collection as usize];
    (node.link_usage, node.link_usage_page)
  }

  fn caps_usage(&mut self, data: &ReportData, min: u16, max: u16) -> Result<CapsUsage, PreparseError> {
    let local = &data.local_state;
    let (data_index_min, data_index_max) = self.next_data_indices(max as u32 - min as u32 + 1)?;
    if min == max {
      return Ok(CapsUsage::NotRange {
        usage: Usage::from(min),
        string_index: local.string_index.or(local.string_minimum).unwrap_or(0),
        designator_index: local.designator_index.or(local.designator_minimum).unwrap_or(0),
        data_index: data_index_min,
      });
    }
    Ok(CapsUsage::Range {
      usage_min: Usage::from(min),
      usage_max: Usage::from(max),
      string_min: local.string_minimum.or(local.string_index).unwrap_or(0),
      string_max: local.string_maximum.or(local.string_index).unwrap_or(0),
      designator_min: local.designator_minimum.or(local.designator_index).unwrap_or(0),
      designator_max: local.designator_maximum.or(local.designator_index).unwrap_or(0),
      data_index_min,
      data_index_max,
    })
  }

  fn button_caps(
    &mut self,
    data: &ReportData,
    page: UsagePage,
    min: u16,
    max: u16,
    report_count: u32,
  ) -> Result<ButtonCaps, PreparseError> {
    let (link_usage, link_usage_page) = self.link(data);
    Ok(ButtonCaps {
      usage_page: page,
      report_id: self.report_id,
      is_alias: false,
      bit_field: data.bit_field,
      link_collection: data.link_collection,
      link_usage,
      link_usage_page,
      is_absolute: !data.attributes.relative,
      report_count: report_count as u16,
      usage: self.caps_usage(data, min, max)?,
    })
  }

  // one bit per usage; contiguous usages on the same page become a single range element.
  fn add_bitmap(&mut self, data: &ReportData, start_bit: u32, report_count: u32) -> Result<(), PreparseError> {
    let mut bits = Vec::new();
    for usage in &data.local_state.usages {
      let page = usage.page.or(data.global_state.usage_page).unwrap_or_default();
      bits.extend((usage.min..=usage.max).map(|id| (page, id)));
    }
    bits.truncate(report_count as usize);

    let mut offset = 0;
    while offset < bits.len() {
      let (page, min) = bits[offset];
      let mut len = 1;
      let contiguous = |len: usize| min as usize + len <= 0xFFFF && bits[offset + len] == (page, min + len as u16);
      while offset + len < bits.len() && contiguous(len) {
        len += 1;
      }
      let max = min + (len as u16 - 1);
      let caps = self.button_caps(data, page, min, max, len as u32)?;
      debug!("button {page:?} {min:#x}..={max:#x} at bit {}", start_bit + offset as u32);
      self.elements.push(Element::Button(ButtonElement {
        value_start_bit: start_bit + offset as u32,
        bit_count: len as u32,
        layout: ButtonLayout::Bitmap,
        caps,
      }));
      offset += len;
    }
    Ok(())
  }

  // selector slots; each usage range shares the slots and decodes its own part of the logical range.
  fn add_array(
    &mut self,
    data: &ReportData,
    start_bit: u32,
    report_size: u32,
    report_count: u32,
  ) -> Result<(), PreparseError> {
    if report_size > MAX_VALUE_BITS {
      return Err(PreparseError::FieldTooWide(report_size));
    }
    let logical_minimum = data.global_state.logical_minimum.ok_or(PreparseError::InvalidReportNoLogicalMin)?;
    let mut index_offset: i64 = 0;
    for usage in &data.local_state.usages {
      let page = usage.page.or(data.global_state.usage_page).unwrap_or_default();
      let caps = self.button_caps(data, page, usage.min, usage.max, report_count)?;
      debug!("array {page:?} {:#x}..={:#x} at bit {start_bit}", usage.min, usage.max);
      let logical_minimum = (logical_minimum as i64 + index_offset) as i32;
      self.elements.push(Element::Button(ButtonElement {
        value_start_bit: start_bit,
        bit_count: report_size * report_count,
        layout: ButtonLayout::Array { slot_bits: report_size, logical_minimum },
        caps,
      }));
      index_offset += usage.count() as i64;
    }
    Ok(())
  }

  // one value element per report count; surplus counts reuse the last usage.
  fn add_values(
    &mut self,
    data: &ReportData,
    start_bit: u32,
    report_size: u32,
    report_count: u32,
  ) -> Result<(), PreparseError> {
    if report_size > MAX_VALUE_BITS {
      return Err(PreparseError::FieldTooWide(report_size));
    }
    let logical_min = data.global_state.logical_minimum.ok_or(PreparseError::InvalidReportNoLogicalMin)?;
    let logical_max = data.global_state.logical_maximum.ok_or(PreparseError::InvalidReportNoLogicalMax)?;
    let mut usages = data.local_state.usages.iter().flat_map(|usage| {
      let page = usage.page.or(data.global_state.usage_page).unwrap_or_default();
      (usage.min..=usage.max).map(move |id| (page, id))
    });
    let (link_usage, link_usage_page) = self.link(data);
    let mut current = usages.next().unwrap_or_default();
    for index in 0..report_count {
      let (page, usage) = current;
      let caps = ValueCaps {
        usage_page: page,
        report_id: self.report_id,
        is_alias: false,
        bit_field: data.bit_field,
        link_collection: data.link_collection,
        link_usage,
        link_usage_page,
        is_absolute: !data.attributes.relative,
        has_null: data.attributes.null_state,
        bit_size: report_size as u16,
        report_count: 1,
        unit_exponent: data.global_state.unit_exponent.unwrap_or(0),
        units: data.global_state.unit.unwrap_or(0),
        logical_min,
        logical_max,
        physical_min: data.global_state.physical_minimum.unwrap_or(0),
        physical_max: data.global_state.physical_maximum.unwrap_or(0),
        usage: self.caps_usage(data, usage, usage)?,
      };
      let value_start_bit = start_bit + index * report_size;
      debug!("value {page:?} {usage:#x} at bit {value_start_bit}, {report_size} bits");
      self.elements.push(Element::Value(ValueElement { value_start_bit, bit_count: report_size, caps }));
      if let Some(next) = usages.next() {
        current = next;
      }
    }
    Ok(())
  }
}

// Assign bit positions and build the report records of one report type.
fn process_reports(
  nodes: &[LinkCollectionNode],
  report_records: BTreeMap<ReportId, Vec<ReportData>>,
) -> Result<Vec<ReportRecord>, PreparseError> {
  let mut records = Vec::new();
  let mut data_index = 0;

  for (report_id, report_data) in report_records {
    let mut builder = ElementBuilder { nodes, report_id, data_index, elements: Vec::new() };
    // reports with an id start with the id byte.
    let mut bit_position: u32 = if report_id.is_present() { 8 } else { 0 };

    for data in &report_data {
      let report_size = data.global_state.report_size.ok_or(PreparseError::InvalidReportNoSize)?;
      let report_count = data.global_state.report_count.ok_or(PreparseError::InvalidReportNoCount)?;
      let field_bits = report_size.checked_mul(report_count).ok_or(PreparseError::ReportTooLong)?;
      let start_bit = bit_position;
      bit_position = bit_position.checked_add(field_bits).ok_or(PreparseError::ReportTooLong)?;

      if data.local_state.usage_minimum.is_some() || data.local_state.usage_maximum.is_some() {
        return Err(PreparseError::InvalidUsageRange);
      }
      if data.local_state.usages.is_empty() || field_bits == 0 {
        //no usages defined - padding.
        continue;
      }

      if !data.attributes.variable {
        builder.add_array(data, start_bit, report_size, report_count)?;
      } else if report_size == 1 {
        builder.add_bitmap(data, start_bit, report_count)?;
      } else {
        builder.add_values(data, start_bit, report_size, report_count)?;
      }
    }

    data_index = builder.data_index;
    records.push(ReportRecord {
      report_id,
      byte_length: bit_position.div_ceil(8) as usize,
      elements: builder.elements,
    });
  }

  Ok(records)
}

fn build_preparsed_data(collection: TopLevelCollection) -> Result<PreparsedData, PreparseError> {
  let TopLevelCollection { nodes, input_reports, output_reports, features } = collection;
  let caps = Caps { usage: nodes[0].link_usage, usage_page: nodes[0].link_usage_page, ..Default::default() };
  let input_reports = process_reports(&nodes, input_reports)?;
  let output_reports = process_reports(&nodes, output_reports)?;
  let features = process_reports(&nodes, features)?;
  debug!("top level collection {:?}:{:?} with {} nodes", caps.usage_page, caps.usage, nodes.len());
  Ok(PreparsedData::new(caps, nodes, input_reports, output_reports, features)?)
}

/// Parses the raw report descriptor in the given byte slice, producing one [`PreparsedData`] per top level collection.
pub fn preparse_report_descriptor(report_descriptor: &[u8]) -> Result<Vec<PreparsedData>, PreparseError> {
  ReportDescriptorPreparser::parse(report_descriptor)
}

impl PreparsedData {
  /// Builds the preparsed data of the first top level collection described by `report_descriptor`.
  pub fn from_descriptor(report_descriptor: &[u8]) -> Result<Self, PreparseError> {
    preparse_report_descriptor(report_descriptor)?.into_iter().next().ok_or(PreparseError::NoTopLevelCollection)
  }
}
