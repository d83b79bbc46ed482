//! Report Accessors
//!
//! This module implements the `HidP_*` style queries over [`PreparsedData`]: capability listing, usage value
//! extraction, pressed button lists, and report initialization/modification.
//!
//! Report buffers are always supplied by the caller and are never retained. When a report type uses report ids, the
//! record describing a report is selected by the report's first byte.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use log::trace;

use crate::{
  preparsed_data::{ButtonElement, ButtonLayout, Element, PreparsedData, ReportRecord, ValueElement},
  report_bits::{read_bits, read_field_bits, write_bits},
  report_data_types::{ButtonCaps, Caps, LinkCollectionNode, ReportId, ReportType, Usage, UsagePage, ValueCaps},
  status::{HidpError, HidpResult},
};

// link collection 0 selects every collection.
fn collection_matches(link_collection: u16, element_collection: u16) -> bool {
  link_collection == 0 || link_collection == element_collection
}

// Decodes the content of an array slot into a usage. Slots holding a value outside the usage range, or resolving to
// the reserved usage 0, are empty.
fn array_usage(button: &ButtonElement, logical_minimum: i32, slot_value: u32) -> Option<Usage> {
  let index = slot_value as i64 - logical_minimum as i64;
  if index < 0 || index >= button.caps.usage.usage_count() as i64 {
    return None;
  }
  let usage = u16::from(button.caps.usage.usage_min()) as i64 + index;
  match usage {
    0 => None,
    usage => Some(Usage::from(usage as u16)),
  }
}

// The array elements sharing the selector slots of `button`, itself included. A main item with several usage ranges
// yields one element per range over the same bits.
fn slot_siblings<'a>(
  record: &'a ReportRecord,
  button: &'a ButtonElement,
) -> impl Iterator<Item = (&'a ButtonElement, i32)> + 'a {
  record.elements.iter().filter_map(move |element| match element {
    Element::Button(other)
      if other.value_start_bit == button.value_start_bit && other.bit_count == button.bit_count =>
    {
      match other.layout {
        ButtonLayout::Array { logical_minimum, .. } => Some((other, logical_minimum)),
        ButtonLayout::Bitmap => None,
      }
    }
    _ => None,
  })
}

// true when any element sharing the slot decodes `slot_value` to a usage.
fn slot_in_use(record: &ReportRecord, button: &ButtonElement, slot_value: u32) -> bool {
  slot_siblings(record, button)
    .any(|(sibling, logical_minimum)| array_usage(sibling, logical_minimum, slot_value).is_some())
}

// Value written to an array slot to mark it empty: 0 when possible, otherwise a value just outside the logical range
// of one of the elements sharing the slot that none of them decodes.
fn empty_slot_value(record: &ReportRecord, button: &ButtonElement, slot_bits: u32) -> u32 {
  let slot_max = (1i64 << slot_bits) - 1;
  let around = slot_siblings(record, button).flat_map(|(sibling, logical_minimum)| {
    [logical_minimum as i64 - 1, logical_minimum as i64 + sibling.caps.usage.usage_count() as i64]
  });
  core::iter::once(0)
    .chain(around)
    .filter(|candidate| (0..=slot_max).contains(candidate))
    .map(|candidate| candidate as u32)
    .find(|&candidate| !slot_in_use(record, button, candidate))
    .unwrap_or(0)
}

fn copy_caps<'a, T: Copy + 'a>(target: &mut [T], source: impl Iterator<Item = &'a T>) -> usize {
  let mut count = 0;
  for (slot, caps) in target.iter_mut().zip(source) {
    *slot = *caps;
    count += 1;
  }
  count
}

// Calls `pressed` with every usage reported as set by a button element, in report order.
fn for_each_pressed(
  button: &ButtonElement,
  report: &[u8],
  mut pressed: impl FnMut(Usage) -> HidpResult<()>,
) -> HidpResult<()> {
  match button.layout {
    ButtonLayout::Bitmap => {
      let usage_min = u16::from(button.caps.usage.usage_min());
      for bit in 0..button.bit_count {
        if read_bits(report, button.value_start_bit + bit, 1)? != 0 {
          pressed(Usage::from(usage_min.wrapping_add(bit as u16)))?;
        }
      }
    }
    ButtonLayout::Array { slot_bits, logical_minimum } => {
      for slot in 0..button.bit_count / slot_bits {
        let slot_value = read_field_bits(report, button.value_start_bit + slot * slot_bits, slot_bits)?;
        if let Some(usage) = array_usage(button, logical_minimum, slot_value) {
          pressed(usage)?;
        }
      }
    }
  }
  Ok(())
}

impl PreparsedData {
  // Selects the record describing `report`: the first one without an id, or whose id equals the first report byte.
  fn find_report(&self, report_type: ReportType, report: &[u8]) -> HidpResult<&ReportRecord> {
    let records = self.reports(report_type);
    if records.is_empty() {
      return Err(HidpError::UsageNotFound);
    }
    let id = report.first().copied();
    records.iter().find(|record| record.matches(id)).ok_or_else(|| {
      trace!("no {report_type:?} report with id {id:?}");
      HidpError::ReportDoesNotExist
    })
  }

  // Locates the non-range value element for the given usage within the record selected by `report`.
  fn find_value(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usage: Usage,
    report: &[u8],
  ) -> HidpResult<&ValueElement> {
    let record = self.find_report(report_type, report)?;
    record
      .elements
      .iter()
      .find_map(|element| match element {
        Element::Value(value)
          if value.caps.usage_page == usage_page
            && !value.caps.usage.is_range()
            && value.caps.usage.usage_min() == usage
            && collection_matches(link_collection, value.caps.link_collection) =>
        {
          Some(value)
        }
        _ => None,
      })
      .ok_or_else(|| {
        trace!("no value {usage_page:?}:{usage:?} in {report_type:?} report {:?}", record.report_id);
        HidpError::UsageNotFound
      })
  }

  // Locates an element anywhere in the reports of the given type, for the setters. The report buffer must have the
  // declared length, and must already carry the id of the report holding the element.
  fn find_element_for_write<'a, T>(
    &'a self,
    report_type: ReportType,
    report: &[u8],
    mut select: impl FnMut(&'a Element) -> Option<&'a T>,
  ) -> HidpResult<Option<(&'a ReportRecord, &'a T)>> {
    if report.len() != self.caps().report_byte_length(report_type) as usize {
      return Err(HidpError::InvalidReportLength);
    }
    for record in self.reports(report_type) {
      if let Some(found) = record.elements.iter().find_map(&mut select) {
        if !record.matches(report.first().copied()) {
          return Err(HidpError::IncompatibleReportId);
        }
        return Ok(Some((record, found)));
      }
    }
    Ok(None)
  }

  /// Returns the top level capabilities (`HidP_GetCaps`).
  pub fn get_caps(&self) -> Caps {
    *self.caps()
  }

  /// Iterates the button capabilities of every report of the given type, in report order.
  pub fn button_caps(&self, report_type: ReportType) -> impl Iterator<Item = &ButtonCaps> {
    self.reports(report_type).iter().flat_map(|record| record.elements.iter()).filter_map(|element| match element {
      Element::Button(button) => Some(&button.caps),
      Element::Value(_) => None,
    })
  }

  /// Iterates the value capabilities of every report of the given type, in report order.
  pub fn value_caps(&self, report_type: ReportType) -> impl Iterator<Item = &ValueCaps> {
    self.reports(report_type).iter().flat_map(|record| record.elements.iter()).filter_map(|element| match element {
      Element::Value(value) => Some(&value.caps),
      Element::Button(_) => None,
    })
  }

  /// Copies the button capabilities of the given report type into `button_caps` (`HidP_GetButtonCaps`).
  ///
  /// Returns the number of entries written. A buffer smaller than the number of capabilities is not an error: the
  /// copy is silently truncated to the buffer length.
  pub fn get_button_caps(&self, report_type: ReportType, button_caps: &mut [ButtonCaps]) -> usize {
    copy_caps(button_caps, self.button_caps(report_type))
  }

  /// Copies the value capabilities of the given report type into `value_caps` (`HidP_GetValueCaps`), silently
  /// truncated to the buffer length. Returns the number of entries written.
  pub fn get_value_caps(&self, report_type: ReportType, value_caps: &mut [ValueCaps]) -> usize {
    copy_caps(value_caps, self.value_caps(report_type))
  }

  /// Copies the button capabilities matching the given filter (`HidP_GetSpecificButtonCaps`). A zero usage page, link
  /// collection or usage matches anything; a range capability matches every usage it covers.
  ///
  /// Returns [`HidpError::UsageNotFound`] if nothing matches; otherwise the copy is silently truncated to the buffer.
  pub fn get_specific_button_caps(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usage: Usage,
    button_caps: &mut [ButtonCaps],
  ) -> HidpResult<usize> {
    let mut matching = self.button_caps(report_type).filter(|caps| {
      (usage_page.is_wildcard() || caps.usage_page == usage_page)
        && collection_matches(link_collection, caps.link_collection)
        && (u16::from(usage) == 0 || caps.usage.contains(usage))
    });
    let first = matching.next().ok_or(HidpError::UsageNotFound)?;
    Ok(copy_caps(button_caps, core::iter::once(first).chain(matching)))
  }

  /// Copies the value capabilities matching the given filter (`HidP_GetSpecificValueCaps`). Filtering and truncation
  /// follow [`PreparsedData::get_specific_button_caps`].
  pub fn get_specific_value_caps(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usage: Usage,
    value_caps: &mut [ValueCaps],
  ) -> HidpResult<usize> {
    let mut matching = self.value_caps(report_type).filter(|caps| {
      (usage_page.is_wildcard() || caps.usage_page == usage_page)
        && collection_matches(link_collection, caps.link_collection)
        && (u16::from(usage) == 0 || caps.usage.contains(usage))
    });
    let first = matching.next().ok_or(HidpError::UsageNotFound)?;
    Ok(copy_caps(value_caps, core::iter::once(first).chain(matching)))
  }

  /// Copies the collection tree into `nodes` (`HidP_GetLinkCollectionNodes`).
  ///
  /// Unlike the caps queries, a short buffer is an error: [`HidpError::BufferTooSmall`] is returned and nothing is
  /// copied.
  pub fn get_link_collection_nodes(&self, nodes: &mut [LinkCollectionNode]) -> HidpResult<usize> {
    let source = self.link_collections();
    let target = nodes.get_mut(..source.len()).ok_or(HidpError::BufferTooSmall)?;
    target.copy_from_slice(source);
    Ok(source.len())
  }

  /// Reads the raw value of a usage from a report (`HidP_GetUsageValue`).
  ///
  /// Only non-range value capabilities are searched. A zero `link_collection` matches every collection.
  pub fn get_usage_value(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usage: Usage,
    report: &[u8],
  ) -> HidpResult<u32> {
    let value = self.find_value(report_type, usage_page, link_collection, usage, report)?;
    read_bits(report, value.value_start_bit, value.bit_count)
  }

  /// Reads the signed value of a usage from a report (`HidP_GetScaledUsageValue`).
  ///
  /// Fields declared 16 bits wide are sign-extended from 16 bits. Every other width is returned as the raw value
  /// reinterpreted as `i32`, without sign extension.
  pub fn get_scaled_usage_value(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usage: Usage,
    report: &[u8],
  ) -> HidpResult<i32> {
    let value = self.find_value(report_type, usage_page, link_collection, usage, report)?;
    let raw = read_bits(report, value.value_start_bit, value.bit_count)?;
    match value.caps.bit_size {
      16 => Ok(raw as u16 as i16 as i32),
      _ => Ok(raw as i32),
    }
  }

  /// Writes the raw value of a usage into a report (`HidP_SetUsageValue`).
  ///
  /// The report must have the declared length for its type and already carry the id of the report that holds the
  /// usage (see [`PreparsedData::initialize_report_for_id`]).
  pub fn set_usage_value(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usage: Usage,
    usage_value: u32,
    report: &mut [u8],
  ) -> HidpResult<()> {
    let (_, value) = self
      .find_element_for_write(report_type, report, |element| match element {
        Element::Value(value)
          if value.caps.usage_page == usage_page
            && !value.caps.usage.is_range()
            && value.caps.usage.usage_min() == usage
            && collection_matches(link_collection, value.caps.link_collection) =>
        {
          Some(value)
        }
        _ => None,
      })?
      .ok_or(HidpError::UsageNotFound)?;
    if value.bit_count < 32 && usage_value >> value.bit_count != 0 {
      return Err(HidpError::ValueOutOfRange);
    }
    write_bits(report, value.value_start_bit, value.bit_count, usage_value)
  }

  /// Lists the usages on `usage_page` that are set in `report` (`HidP_GetUsages`).
  ///
  /// The capacity is `usage_list.len()`; on success the number of usages written is returned. If more usages are set
  /// than fit, [`HidpError::BufferTooSmall`] is returned as soon as the overflow is seen. [`HidpError::UsageNotFound`]
  /// means the report has no button field on that page at all; a report with button fields but nothing pressed
  /// returns `Ok(0)`.
  pub fn get_usages(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usage_list: &mut [Usage],
    report: &[u8],
  ) -> HidpResult<usize> {
    let record = self.find_report(report_type, report)?;
    let mut found = false;
    let mut count = 0;
    for element in &record.elements {
      let Element::Button(button) = element else { continue };
      if button.caps.usage_page != usage_page || !collection_matches(link_collection, button.caps.link_collection) {
        continue;
      }
      found = true;
      for_each_pressed(button, report, |usage| {
        let slot = usage_list.get_mut(count).ok_or(HidpError::BufferTooSmall)?;
        *slot = usage;
        count += 1;
        Ok(())
      })?;
    }
    if !found {
      trace!("no {usage_page:?} buttons in {report_type:?} report {:?}", record.report_id);
      return Err(HidpError::UsageNotFound);
    }
    Ok(count)
  }

  // Applies `update` to the button element holding each usage in turn.
  fn update_usages(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usages: &[Usage],
    report: &mut [u8],
    mut update: impl FnMut(&ReportRecord, &ButtonElement, Usage, &mut [u8]) -> HidpResult<()>,
  ) -> HidpResult<()> {
    for (index, &usage) in usages.iter().enumerate() {
      let (record, button) = self
        .find_element_for_write(report_type, report, |element| match element {
          Element::Button(button)
            if button.caps.usage_page == usage_page
              && button.caps.usage.contains(usage)
              && collection_matches(link_collection, button.caps.link_collection) =>
          {
            Some(button)
          }
          _ => None,
        })?
        .ok_or(HidpError::UsageNotFoundAt { usage, index })?;
      update(record, button, usage, &mut *report).map_err(|err| match err {
        HidpError::UsageNotFound => HidpError::UsageNotFoundAt { usage, index },
        other => other,
      })?;
    }
    Ok(())
  }

  /// Marks each usage in `usages` as set in `report` (`HidP_SetUsages`).
  ///
  /// Usages are processed in order and processing stops at the first failure; usages before it stay set.
  /// [`HidpError::UsageNotFoundAt`] identifies the usage that could not be located. For array fields,
  /// [`HidpError::BufferTooSmall`] means every slot is already in use.
  pub fn set_usages(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usages: &[Usage],
    report: &mut [u8],
  ) -> HidpResult<()> {
    self.update_usages(report_type, usage_page, link_collection, usages, report, |record, button, usage, report| {
      let offset = u16::from(usage) - u16::from(button.caps.usage.usage_min());
      match button.layout {
        ButtonLayout::Bitmap => write_bits(report, button.value_start_bit + offset as u32, 1, 1),
        ButtonLayout::Array { slot_bits, logical_minimum } => {
          // a slot is free only when no element sharing it decodes its content.
          let mut free_slot = None;
          for slot in 0..button.bit_count / slot_bits {
            let start = button.value_start_bit + slot * slot_bits;
            let slot_value = read_field_bits(report, start, slot_bits)?;
            if array_usage(button, logical_minimum, slot_value) == Some(usage) {
              return Ok(());
            }
            if free_slot.is_none() && !slot_in_use(record, button, slot_value) {
              free_slot = Some(start);
            }
          }
          let start = free_slot.ok_or(HidpError::BufferTooSmall)?;
          let slot_value = (logical_minimum as i64 + offset as i64) as u32;
          write_bits(report, start, slot_bits, slot_value)
        }
      }
    })
  }

  /// Marks each usage in `usages` as not set in `report` (`HidP_UnsetUsages`).
  ///
  /// For array fields, a usage that is not currently present in any slot is reported as
  /// [`HidpError::UsageNotFoundAt`].
  pub fn unset_usages(
    &self,
    report_type: ReportType,
    usage_page: UsagePage,
    link_collection: u16,
    usages: &[Usage],
    report: &mut [u8],
  ) -> HidpResult<()> {
    self.update_usages(report_type, usage_page, link_collection, usages, report, |record, button, usage, report| {
      let offset = u16::from(usage) - u16::from(button.caps.usage.usage_min());
      match button.layout {
        ButtonLayout::Bitmap => write_bits(report, button.value_start_bit + offset as u32, 1, 0),
        ButtonLayout::Array { slot_bits, logical_minimum } => {
          for slot in 0..button.bit_count / slot_bits {
            let start = button.value_start_bit + slot * slot_bits;
            if array_usage(button, logical_minimum, read_field_bits(report, start, slot_bits)?) == Some(usage) {
              return write_bits(report, start, slot_bits, empty_slot_value(record, button, slot_bits));
            }
          }
          Err(HidpError::UsageNotFound)
        }
      }
    })
  }

  /// Zeroes `report` and writes `report_id` into its first byte (`HidP_InitializeReportForID`).
  ///
  /// `report` must be exactly the declared report length of the type. The id byte is only written when the report
  /// type uses report ids. Null and default values of individual fields are not populated; every field reads as 0.
  pub fn initialize_report_for_id(
    &self,
    report_type: ReportType,
    report_id: ReportId,
    report: &mut [u8],
  ) -> HidpResult<()> {
    let records = self.reports(report_type);
    let size = self.caps().report_byte_length(report_type) as usize;
    if records.is_empty() || size == 0 {
      return Err(HidpError::ReportDoesNotExist);
    }
    if report.len() != size {
      return Err(HidpError::InvalidReportLength);
    }
    report.fill(0);
    if !records.iter().any(|record| record.report_id == report_id) {
      trace!("no {report_type:?} report with id {report_id:?}");
      return Err(HidpError::ReportDoesNotExist);
    }
    if report_id.is_present() {
      report[0] = u8::from(report_id);
    }
    Ok(())
  }

  /// Returns the largest number of usages on `usage_page` that [`PreparsedData::get_usages`] can return for the given
  /// report type (`HidP_MaxUsageListLength`). Usage page 0 counts every page.
  pub fn max_usage_list_length(&self, report_type: ReportType, usage_page: UsagePage) -> usize {
    self
      .reports(report_type)
      .iter()
      .flat_map(|record| record.elements.iter())
      .filter_map(|element| match element {
        Element::Button(button) if usage_page.is_wildcard() || button.caps.usage_page == usage_page => {
          Some(button.max_usages() as usize)
        }
        _ => None,
      })
      .sum()
  }

  /// Returns the number of data indices of the given report type (`HidP_MaxDataListLength`).
  pub fn max_data_list_length(&self, report_type: ReportType) -> usize {
    self.caps().number_data_indices(report_type) as usize
  }
}

#[cfg(test)]
mod tests {
  use alloc::{vec, vec::Vec};

  use crate::{
    preparsed_data::{
      tests::{button, record, value},
      ButtonElement, ButtonLayout, Element, PreparsedData, ReportRecord,
    },
    report_data_types::{
      ButtonCaps, Caps, CapsUsage, LinkCollectionNode, ReportId, ReportType, Usage, UsagePage, ValueCaps,
    },
    status::HidpError,
  };

  const BUTTON: UsagePage = UsagePage::new(0x09);
  const DESKTOP: UsagePage = UsagePage::new(0x01);

  fn preparsed(input: Vec<ReportRecord>) -> PreparsedData {
    PreparsedData::new(Caps::default(), Vec::new(), input, Vec::new(), Vec::new()).unwrap()
  }

  // One id-less input report: 4 buttons at bits 0..4, then 8, 16 and 32 bit values of X, Y and Z.
  fn single_report() -> PreparsedData {
    preparsed(vec![record(
      0,
      8,
      vec![
        button(0x09, 1, 4, 0, 0),
        value(0x01, 0x30, 0, 8, 8),
        value(0x01, 0x31, 0, 16, 16),
        value(0x01, 0x32, 0, 32, 32),
      ],
    )])
  }

  // Two input reports: id 1 with 3 bytes, id 2 with 5 bytes.
  fn two_reports() -> PreparsedData {
    preparsed(vec![
      record(1, 3, vec![button(0x09, 1, 8, 1, 8), value(0x01, 0x30, 1, 16, 8)]),
      record(2, 5, vec![value(0x01, 0x30, 2, 8, 16), value(0x01, 0x31, 2, 24, 16)]),
    ])
  }

  #[test]
  fn get_usage_value_should_read_fields() {
    let data = single_report();
    let report = [0x05, 0x7f, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
    let get = |usage: u16| data.get_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(usage), &report);
    assert_eq!(get(0x30), Ok(0x7f));
    assert_eq!(get(0x31), Ok(0x1234));
    assert_eq!(get(0x32), Ok(0x12345678));
    assert_eq!(get(0x33), Err(HidpError::UsageNotFound));
    assert_eq!(
      data.get_usage_value(ReportType::Input, BUTTON, 0, Usage::from(0x30), &report),
      Err(HidpError::UsageNotFound)
    );
    assert_eq!(
      data.get_usage_value(ReportType::Output, DESKTOP, 0, Usage::from(0x30), &report),
      Err(HidpError::UsageNotFound)
    );
  }

  #[test]
  fn get_usage_value_should_select_report_by_id() {
    let data = two_reports();
    let get = |report: &[u8]| data.get_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x30), report);
    assert_eq!(get(&[1, 0xff, 0x42]), Ok(0x42));
    assert_eq!(get(&[2, 0x34, 0x12, 0, 0]), Ok(0x1234));
    assert_eq!(get(&[3, 0, 0, 0, 0]), Err(HidpError::ReportDoesNotExist));
    assert_eq!(get(&[]), Err(HidpError::ReportDoesNotExist));
    assert_eq!(
      data.get_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x31), &[1, 0, 0]),
      Err(HidpError::UsageNotFound)
    );
  }

  #[test]
  fn get_usage_value_should_reject_short_reports() {
    let data = single_report();
    // Z occupies bits 32..64; one byte short leaves it 8 bits over, a 4 byte report leaves it entirely outside.
    let get = |report: &[u8]| data.get_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x32), report);
    assert_eq!(get(&[0; 7]), Err(HidpError::InvalidReportLength));
    assert_eq!(get(&[0; 4]), Err(HidpError::InvalidReportLength));
    assert_eq!(get(&[0; 8]), Ok(0));

    // a 9 bit field at bit 7 needs 2 bytes: exactly one bit over with a 1 byte report.
    let data = preparsed(vec![record(0, 2, vec![value(0x01, 0x30, 0, 7, 9)])]);
    let get = |report: &[u8]| data.get_scaled_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x30), report);
    assert_eq!(get(&[0xff]), Err(HidpError::InvalidReportLength));
    assert!(get(&[0xff, 0xff]).is_ok());
  }

  #[test]
  fn get_scaled_usage_value_should_sign_extend_16_bit_fields_only() {
    let data = single_report();
    let get = |usage: u16, report: &[u8]| {
      data.get_scaled_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(usage), report)
    };

    let report = [0x00, 0x80, 0x00, 0x80, 0x00, 0x00, 0x00, 0x80];
    assert_eq!(get(0x31, &report), Ok(0x8000u16 as i16 as i32));
    assert_eq!(get(0x31, &report), Ok(-32768));
    assert_eq!(get(0x30, &report), Ok(0x80));
    assert_eq!(get(0x32, &report), Ok(0x80000000u32 as i32));

    let report = [0x00, 0xff, 0xfe, 0xff, 0xff, 0xff, 0xff, 0x7f];
    assert_eq!(get(0x30, &report), Ok(255));
    assert_eq!(get(0x31, &report), Ok(-2));
    assert_eq!(get(0x32, &report), Ok(i32::MAX));
  }

  #[test]
  fn get_usages_should_list_pressed_buttons() {
    let data = single_report();
    let report = [0b0000_0101, 0, 0, 0, 0, 0, 0, 0];
    let mut usages = [Usage::default(); 4];
    assert_eq!(data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &report), Ok(2));
    assert_eq!(usages[..2], [Usage::from(1), Usage::from(3)]);

    let mut usages = [Usage::default(); 1];
    assert_eq!(data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &report), Err(HidpError::BufferTooSmall));
    assert_eq!(usages[0], Usage::from(1));

    let mut usages = [Usage::default(); 4];
    assert_eq!(data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &[0; 8]), Ok(0));
    assert_eq!(data.get_usages(ReportType::Input, DESKTOP, 0, &mut usages, &report), Err(HidpError::UsageNotFound));
    assert_eq!(data.get_usages(ReportType::Feature, BUTTON, 0, &mut usages, &report), Err(HidpError::UsageNotFound));
  }

  #[test]
  fn get_usages_should_select_report_by_id() {
    let data = two_reports();
    let mut usages = [Usage::default(); 8];
    assert_eq!(data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &[1, 0x81, 0]), Ok(2));
    assert_eq!(usages[..2], [Usage::from(1), Usage::from(8)]);
    assert_eq!(
      data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &[2, 0xff, 0xff, 0, 0]),
      Err(HidpError::UsageNotFound)
    );
    assert_eq!(
      data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &[9, 0, 0]),
      Err(HidpError::ReportDoesNotExist)
    );
  }

  fn keyboard_array() -> PreparsedData {
    // 3 slots of 8 bits holding key codes 0x00..=0x65.
    let element = Element::Button(ButtonElement {
      value_start_bit: 8,
      bit_count: 24,
      layout: ButtonLayout::Array { slot_bits: 8, logical_minimum: 0 },
      caps: ButtonCaps {
        usage_page: UsagePage::from(0x07),
        report_count: 3,
        usage: CapsUsage::Range {
          usage_min: Usage::from(0x00),
          usage_max: Usage::from(0x65),
          string_min: 0,
          string_max: 0,
          designator_min: 0,
          designator_max: 0,
          data_index_min: 0,
          data_index_max: 0x65,
        },
        ..Default::default()
      },
    });
    let output = vec![record(0, 4, vec![element.clone()])];
    PreparsedData::new(Caps::default(), Vec::new(), vec![record(0, 4, vec![element])], output, Vec::new()).unwrap()
  }

  #[test]
  fn get_usages_should_decode_array_slots() {
    let data = keyboard_array();
    let keys = UsagePage::from(0x07);
    let mut usages = [Usage::default(); 3];
    assert_eq!(data.get_usages(ReportType::Input, keys, 0, &mut usages, &[0, 0x04, 0x00, 0x1e]), Ok(2));
    assert_eq!(usages[..2], [Usage::from(0x04), Usage::from(0x1e)]);
    // out of range slot contents are ignored.
    assert_eq!(data.get_usages(ReportType::Input, keys, 0, &mut usages, &[0, 0xf0, 0x00, 0x00]), Ok(0));
    assert_eq!(data.max_usage_list_length(ReportType::Input, keys), 3);
  }

  #[test]
  fn set_usages_should_fill_array_slots() {
    let data = keyboard_array();
    let keys = UsagePage::from(0x07);
    let mut report = [0u8; 4];
    let pressed = [Usage::from(0x04), Usage::from(0x05), Usage::from(0x04)];
    assert_eq!(data.set_usages(ReportType::Output, keys, 0, &pressed, &mut report), Ok(()));
    assert_eq!(report, [0, 0x04, 0x05, 0x00]);

    let more = [Usage::from(0x06), Usage::from(0x07)];
    assert_eq!(data.set_usages(ReportType::Output, keys, 0, &more, &mut report), Err(HidpError::BufferTooSmall));
    assert_eq!(report, [0, 0x04, 0x05, 0x06]);

    assert_eq!(data.unset_usages(ReportType::Output, keys, 0, &[Usage::from(0x05)], &mut report), Ok(()));
    assert_eq!(report, [0, 0x04, 0x00, 0x06]);
    assert_eq!(
      data.unset_usages(ReportType::Output, keys, 0, &[Usage::from(0x05)], &mut report),
      Err(HidpError::UsageNotFoundAt { usage: Usage::from(0x05), index: 0 })
    );
  }

  #[test]
  fn set_usages_should_share_array_slots_between_usage_ranges() {
    let descriptor = [
      0x05, 0x01, // USAGE_PAGE (Generic Desktop)
      0x09, 0x05, // USAGE (Game Pad)
      0xa1, 0x01, // COLLECTION (Application)
      0x05, 0x09, //   USAGE_PAGE (Button)
      0x19, 0x01, //   USAGE_MINIMUM (1)
      0x29, 0x02, //   USAGE_MAXIMUM (2)
      0x19, 0x05, //   USAGE_MINIMUM (5)
      0x29, 0x06, //   USAGE_MAXIMUM (6)
      0x15, 0x01, //   LOGICAL_MINIMUM (1)
      0x25, 0x04, //   LOGICAL_MAXIMUM (4)
      0x75, 0x08, //   REPORT_SIZE (8)
      0x95, 0x02, //   REPORT_COUNT (2)
      0x81, 0x00, //   INPUT (Data,Ary,Abs)
      0xc0, // END_COLLECTION
    ];
    let data = PreparsedData::from_descriptor(&descriptor).unwrap();
    let mut report = [0u8; 2];

    // selector 3 is button 5: the slot is taken even though the first range does not decode it.
    assert_eq!(data.set_usages(ReportType::Input, BUTTON, 0, &[Usage::from(5)], &mut report), Ok(()));
    assert_eq!(report, [0x03, 0x00]);
    assert_eq!(data.set_usages(ReportType::Input, BUTTON, 0, &[Usage::from(1)], &mut report), Ok(()));
    assert_eq!(report, [0x03, 0x01]);
    assert_eq!(
      data.set_usages(ReportType::Input, BUTTON, 0, &[Usage::from(6)], &mut report),
      Err(HidpError::BufferTooSmall)
    );
    assert_eq!(report, [0x03, 0x01]);

    let mut usages = [Usage::default(); 2];
    assert_eq!(data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &report), Ok(2));
    assert_eq!(usages, [Usage::from(1), Usage::from(5)]);

    assert_eq!(data.unset_usages(ReportType::Input, BUTTON, 0, &[Usage::from(5)], &mut report), Ok(()));
    assert_eq!(report, [0x00, 0x01]);
    assert_eq!(data.set_usages(ReportType::Input, BUTTON, 0, &[Usage::from(6)], &mut report), Ok(()));
    assert_eq!(report, [0x04, 0x01]);
  }

  #[test]
  fn set_usage_value_should_keep_neighbouring_fields() {
    let descriptor = [
      0x05, 0x01, // USAGE_PAGE (Generic Desktop)
      0x09, 0x04, // USAGE (Joystick)
      0xa1, 0x01, // COLLECTION (Application)
      0x09, 0x30, //   USAGE (X)
      0x09, 0x31, //   USAGE (Y)
      0x15, 0x00, //   LOGICAL_MINIMUM (0)
      0x25, 0x0f, //   LOGICAL_MAXIMUM (15)
      0x75, 0x04, //   REPORT_SIZE (4)
      0x95, 0x02, //   REPORT_COUNT (2)
      0x81, 0x02, //   INPUT (Data,Var,Abs)
      0xc0, // END_COLLECTION
    ];
    let data = PreparsedData::from_descriptor(&descriptor).unwrap();
    let (x, y) = (Usage::from(0x30), Usage::from(0x31));
    let mut report = [0u8; 1];
    assert_eq!(data.set_usage_value(ReportType::Input, DESKTOP, 0, x, 3, &mut report), Ok(()));
    assert_eq!(data.set_usage_value(ReportType::Input, DESKTOP, 0, y, 9, &mut report), Ok(()));
    assert_eq!(
      data.set_usage_value(ReportType::Input, DESKTOP, 0, y, 0x10, &mut report),
      Err(HidpError::ValueOutOfRange)
    );
    assert_eq!(report, [0x93]);

    assert_eq!(data.set_usage_value(ReportType::Input, DESKTOP, 0, x, 0xc, &mut report), Ok(()));
    assert_eq!(report, [0x9c]);
    assert_eq!(data.get_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x30), &report), Ok(0xc));
  }

  #[test]
  fn get_caps_should_truncate_silently() {
    let data = preparsed(vec![record(
      0,
      4,
      vec![button(0x09, 1, 4, 0, 0), value(0x01, 0x30, 0, 8, 8), button(0x09, 5, 5, 0, 4), value(0x01, 0x31, 0, 16, 8)],
    )]);

    let mut caps = [ButtonCaps::default(); 1];
    assert_eq!(data.get_button_caps(ReportType::Input, &mut caps), 1);
    assert_eq!(caps[0].usage.usage_min(), Usage::from(1));

    let mut caps = [ButtonCaps::default(); 4];
    assert_eq!(data.get_button_caps(ReportType::Input, &mut caps), 2);
    assert_eq!(caps[1].usage.usage_min(), Usage::from(5));

    let mut caps = [ValueCaps::default(); 1];
    assert_eq!(data.get_value_caps(ReportType::Input, &mut caps), 1);
    assert_eq!(caps[0].usage.usage_min(), Usage::from(0x30));

    let mut caps = [ValueCaps::default(); 2];
    assert_eq!(data.get_value_caps(ReportType::Input, &mut caps), 2);
    assert_eq!(caps[1].usage.usage_min(), Usage::from(0x31));

    assert_eq!(data.get_value_caps(ReportType::Feature, &mut caps), 0);
    assert_eq!(data.get_button_caps(ReportType::Input, &mut []), 0);
  }

  #[test]
  fn get_specific_caps_should_filter() {
    let data = preparsed(vec![record(
      0,
      4,
      vec![button(0x09, 1, 4, 0, 0), value(0x01, 0x30, 0, 8, 8), button(0x09, 5, 5, 0, 4), value(0x01, 0x31, 0, 16, 8)],
    )]);

    let mut caps = [ButtonCaps::default(); 4];
    assert_eq!(data.get_specific_button_caps(ReportType::Input, BUTTON, 0, Usage::from(3), &mut caps), Ok(1));
    assert_eq!(caps[0].usage.usage_max(), Usage::from(4));
    let any = UsagePage::from(0);
    assert_eq!(data.get_specific_button_caps(ReportType::Input, any, 0, Usage::from(0), &mut caps), Ok(2));
    assert_eq!(
      data.get_specific_button_caps(ReportType::Input, BUTTON, 0, Usage::from(6), &mut caps),
      Err(HidpError::UsageNotFound)
    );

    let mut caps = [ValueCaps::default(); 1];
    assert_eq!(data.get_specific_value_caps(ReportType::Input, DESKTOP, 0, Usage::from(0), &mut caps), Ok(1));
    assert_eq!(data.get_specific_value_caps(ReportType::Input, DESKTOP, 0, Usage::from(0x31), &mut caps), Ok(1));
    assert_eq!(caps[0].usage.usage_min(), Usage::from(0x31));
    assert_eq!(
      data.get_specific_value_caps(ReportType::Input, DESKTOP, 2, Usage::from(0x31), &mut caps),
      Err(HidpError::UsageNotFound)
    );
  }

  #[test]
  fn initialize_report_for_id_should_prepare_reports() {
    let data = two_reports();

    let mut report = [0xaau8; 5];
    assert_eq!(data.initialize_report_for_id(ReportType::Input, ReportId::from(2), &mut report), Ok(()));
    assert_eq!(report, [2, 0, 0, 0, 0]);

    let mut report = [0xaau8; 5];
    assert_eq!(data.initialize_report_for_id(ReportType::Input, ReportId::from(1), &mut report), Ok(()));
    assert_eq!(report, [1, 0, 0, 0, 0]);

    let mut short = [0xaau8; 3];
    assert_eq!(
      data.initialize_report_for_id(ReportType::Input, ReportId::from(2), &mut short),
      Err(HidpError::InvalidReportLength)
    );
    assert_eq!(short, [0xaa; 3]);
    let mut long = [0u8; 6];
    assert_eq!(
      data.initialize_report_for_id(ReportType::Input, ReportId::from(2), &mut long),
      Err(HidpError::InvalidReportLength)
    );
    assert_eq!(
      data.initialize_report_for_id(ReportType::Input, ReportId::from(3), &mut report),
      Err(HidpError::ReportDoesNotExist)
    );
    assert_eq!(
      data.initialize_report_for_id(ReportType::Output, ReportId::from(1), &mut report),
      Err(HidpError::ReportDoesNotExist)
    );

    // without report ids, byte 0 is data and stays zero.
    let data = single_report();
    let mut report = [0xaau8; 8];
    assert_eq!(data.initialize_report_for_id(ReportType::Input, ReportId::from(0), &mut report), Ok(()));
    assert_eq!(report, [0; 8]);
  }

  #[test]
  fn set_usage_value_should_round_trip_through_get() {
    let data = two_reports();
    let mut report = [0u8; 5];
    data.initialize_report_for_id(ReportType::Input, ReportId::from(2), &mut report).unwrap();
    assert_eq!(data.set_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x31), 0xbeef, &mut report), Ok(()));
    assert_eq!(report, [2, 0, 0, 0xef, 0xbe]);
    assert_eq!(data.get_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x31), &report), Ok(0xbeef));

    assert_eq!(
      data.set_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x31), 0x10000, &mut report),
      Err(HidpError::ValueOutOfRange)
    );
    assert_eq!(
      data.set_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x40), 1, &mut report),
      Err(HidpError::UsageNotFound)
    );
    assert_eq!(
      data.set_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x31), 1, &mut [2, 0, 0]),
      Err(HidpError::InvalidReportLength)
    );

    // X exists in both reports; the first report holding it is id 1.
    let mut report = [0u8; 5];
    data.initialize_report_for_id(ReportType::Input, ReportId::from(1), &mut report).unwrap();
    assert_eq!(data.set_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x30), 0x42, &mut report), Ok(()));
    assert_eq!(report, [1, 0, 0x42, 0, 0]);
    assert_eq!(
      data.set_usage_value(ReportType::Input, DESKTOP, 0, Usage::from(0x31), 1, &mut report),
      Err(HidpError::IncompatibleReportId)
    );
  }

  #[test]
  fn set_usages_should_round_trip_through_get_usages() {
    let data = two_reports();
    let mut report = [0u8; 5];
    data.initialize_report_for_id(ReportType::Input, ReportId::from(1), &mut report).unwrap();
    let pressed = [Usage::from(2), Usage::from(7)];
    assert_eq!(data.set_usages(ReportType::Input, BUTTON, 0, &pressed, &mut report), Ok(()));
    assert_eq!(report[1], 0b0100_0010);

    let mut usages = [Usage::default(); 8];
    assert_eq!(data.get_usages(ReportType::Input, BUTTON, 0, &mut usages, &report), Ok(2));
    assert_eq!(usages[..2], pressed);

    assert_eq!(data.unset_usages(ReportType::Input, BUTTON, 0, &[Usage::from(2)], &mut report), Ok(()));
    assert_eq!(report[1], 0b0100_0000);

    let missing = [Usage::from(3), Usage::from(9)];
    assert_eq!(
      data.set_usages(ReportType::Input, BUTTON, 0, &missing, &mut report),
      Err(HidpError::UsageNotFoundAt { usage: Usage::from(9), index: 1 })
    );
    assert_eq!(report[1], 0b0100_0100);
  }

  #[test]
  fn max_usage_list_length_should_count_button_usages() {
    let data = preparsed(vec![
      record(1, 3, vec![button(0x09, 1, 8, 1, 8), button(0x07, 0xe0, 0xe7, 1, 16)]),
      record(2, 2, vec![button(0x09, 9, 9, 2, 8), value(0x09, 0x30, 2, 9, 7)]),
    ]);
    assert_eq!(data.max_usage_list_length(ReportType::Input, BUTTON), 9);
    assert_eq!(data.max_usage_list_length(ReportType::Input, UsagePage::from(0x07)), 8);
    assert_eq!(data.max_usage_list_length(ReportType::Input, UsagePage::from(0)), 17);
    assert_eq!(data.max_usage_list_length(ReportType::Input, DESKTOP), 0);
    assert_eq!(data.max_usage_list_length(ReportType::Output, BUTTON), 0);
    assert_eq!(data.max_data_list_length(ReportType::Input), 18);
  }

  #[test]
  fn get_link_collection_nodes_should_require_capacity() {
    let nodes = vec![
      LinkCollectionNode {
        link_usage: Usage::from(0x05),
        link_usage_page: DESKTOP,
        number_of_children: 1,
        first_child: 1,
        collection_type: 1,
        ..Default::default()
      },
      LinkCollectionNode { link_usage: Usage::from(0x01), link_usage_page: DESKTOP, ..Default::default() },
    ];
    let data = PreparsedData::new(Caps::default(), nodes.clone(), Vec::new(), Vec::new(), Vec::new()).unwrap();
    assert_eq!(data.get_caps().number_link_collection_nodes, 2);

    let mut out = [LinkCollectionNode::default(); 1];
    assert_eq!(data.get_link_collection_nodes(&mut out), Err(HidpError::BufferTooSmall));
    assert_eq!(out[0], LinkCollectionNode::default());

    let mut out = [LinkCollectionNode::default(); 3];
    assert_eq!(data.get_link_collection_nodes(&mut out), Ok(2));
    assert_eq!(out[..2], nodes[..]);
  }
}
