//! HID Report Descriptor Item Tokenization Support
//!
//! This module splits a report descriptor given as a byte slice into items as described in HID spec 1.11 sections
//! 6.2.2.1 through 6.2.2.3, and classifies each item tag so that the preparser can match on it directly.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Main item tags. See HID spec 1.11 section 6.2.2.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainTag {
  Input,
  Output,
  Feature,
  Collection,
  EndCollection,
  Unknown(u8),
}

/// Global item tags. See HID spec 1.11 section 6.2.2.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalTag {
  UsagePage,
  LogicalMinimum,
  LogicalMaximum,
  PhysicalMinimum,
  PhysicalMaximum,
  UnitExponent,
  Unit,
  ReportSize,
  ReportId,
  ReportCount,
  Push,
  Pop,
  Unknown(u8),
}

/// Local item tags. See HID spec 1.11 section 6.2.2.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTag {
  Usage,
  UsageMinimum,
  UsageMaximum,
  DesignatorIndex,
  DesignatorMinimum,
  DesignatorMaximum,
  StringIndex,
  StringMinimum,
  StringMaximum,
  Delimiter,
  Unknown(u8),
}

/// A classified descriptor item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTag {
  Main(MainTag),
  Global(GlobalTag),
  Local(LocalTag),
  Reserved(u8),
  Long(u8),
}

/// Tokenized HID report descriptor item.
#[derive(Debug, PartialEq, Eq)]
pub struct ReportItem<'a> {
  pub tag: ItemTag,
  pub data: &'a [u8],
}

fn classify(item_type: u8, tag: u8) -> ItemTag {
  match item_type {
    0 => ItemTag::Main(match tag {
      0b1000 => MainTag::Input,
      0b1001 => MainTag::Output,
      0b1011 => MainTag::Feature,
      0b1010 => MainTag::Collection,
      0b1100 => MainTag::EndCollection,
      other => MainTag::Unknown(other),
    }),
    1 => ItemTag::Global(match tag {
      0b0000 => GlobalTag::UsagePage,
      0b0001 => GlobalTag::LogicalMinimum,
      0b0010 => GlobalTag::LogicalMaximum,
      0b0011 => GlobalTag::PhysicalMinimum,
      0b0100 => GlobalTag::PhysicalMaximum,
      0b0101 => GlobalTag::UnitExponent,
      0b0110 => GlobalTag::Unit,
      0b0111 => GlobalTag::ReportSize,
      0b1000 => GlobalTag::ReportId,
      0b1001 => GlobalTag::ReportCount,
      0b1010 => GlobalTag::Push,
      0b1011 => GlobalTag::Pop,
      other => GlobalTag::Unknown(other),
    }),
    2 => ItemTag::Local(match tag {
      0b0000 => LocalTag::Usage,
      0b0001 => LocalTag::UsageMinimum,
      0b0010 => LocalTag::UsageMaximum,
      0b0011 => LocalTag::DesignatorIndex,
      0b0100 => LocalTag::DesignatorMinimum,
      0b0101 => LocalTag::DesignatorMaximum,
      0b0111 => LocalTag::StringIndex,
      0b1000 => LocalTag::StringMinimum,
      0b1001 => LocalTag::StringMaximum,
      0b1010 => LocalTag::Delimiter,
      other => LocalTag::Unknown(other),
    }),
    _ => ItemTag::Reserved(tag),
  }
}

/// Item tokenizer - produces an iterator over a byte slice that returns ReportItems.
///
/// Iteration stops at the end of the descriptor; [`DescriptorItemTokenizer::is_truncated`] reports whether it stopped
/// on an item whose data ran past the end.
pub struct DescriptorItemTokenizer<'a> {
  descriptor: &'a [u8],
  position: usize,
  truncated: bool,
}

impl<'a> DescriptorItemTokenizer<'a> {
  /// Instantiates a new HID Report Descriptor Item Tokenizer.
  pub fn new(descriptor: &'a [u8]) -> Self {
    DescriptorItemTokenizer { descriptor, position: 0, truncated: false }
  }

  /// Byte offset of the next item.
  pub fn position(&self) -> usize {
    self.position
  }

  pub fn is_truncated(&self) -> bool {
    self.truncated
  }

  fn take(&mut self, len: usize) -> Option<&'a [u8]> {
    let data = self.descriptor.get(self.position..self.position + len);
    match data {
      Some(_) => self.position += len,
      None => self.truncated = true,
    }
    data
  }
}

impl<'a> Iterator for DescriptorItemTokenizer<'a> {
  type Item = ReportItem<'a>;
  fn next(&mut self) -> Option<Self::Item> {
    let item_header = *self.descriptor.get(self.position)?;
    self.position += 1;

    let item_type = (item_header & 0xC) >> 2;
    let tag = (item_header & 0xF0) >> 4;
    //short item size of 4 bytes is encoded as "3"
    let size = match item_header & 0x3 {
      3 => 4,
      size => size as usize,
    };

    if item_header == 0xFE {
      // long item: size and tag follow the prefix.
      let header = self.take(2)?;
      let (size, long_tag) = (header[0] as usize, header[1]);
      let data = self.take(size)?;
      return Some(ReportItem { tag: ItemTag::Long(long_tag), data });
    }

    let data = self.take(size)?;
    Some(ReportItem { tag: classify(item_type, tag), data })
  }
}

#[cfg(test)]
mod tests {
  use super::{DescriptorItemTokenizer, GlobalTag, ItemTag, LocalTag, MainTag, ReportItem};
  use alloc::vec::Vec;

  static TEST_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // USAGE_PAGE (Generic Desktop)
    0x09, 0x05, // USAGE (Game Pad)
    0xa1, 0x01, // COLLECTION (Application)
    0x85, 0x03, //   REPORT_ID (3)
    0x05, 0x09, //   USAGE_PAGE (Button)
    0x19, 0x01, //   USAGE_MINIMUM (Button 1)
    0x29, 0x04, //   USAGE_MAXIMUM (Button 4)
    0x15, 0x00, //   LOGICAL_MINIMUM (0)
    0x25, 0x01, //   LOGICAL_MAXIMUM (1)
    0x75, 0x01, //   REPORT_SIZE (1)
    0x95, 0x04, //   REPORT_COUNT (4)
    0x81, 0x02, //   INPUT (Data,Var,Abs)
    0xa4, //   PUSH
    0x16, 0x01, 0x80, //   LOGICAL_MINIMUM (-32767)
    0x27, 0xff, 0xff, 0x00, 0x00, //   LOGICAL_MAXIMUM (65535)
    0xb4, //   POP
    0xfe, 0x02, 0x10, 0xaa, 0xbb, //   long item, tag 0x10
    0xc0, // END_COLLECTION
  ];

  #[rustfmt::skip]
  static EXPECTED_ITEMS: &[ReportItem] = &[
    ReportItem {tag: ItemTag::Global(GlobalTag::UsagePage),      data: &[0x01]},
    ReportItem {tag: ItemTag::Local(LocalTag::Usage),            data: &[0x05]},
    ReportItem {tag: ItemTag::Main(MainTag::Collection),         data: &[0x01]},
    ReportItem {tag: ItemTag::Global(GlobalTag::ReportId),       data: &[0x03]},
    ReportItem {tag: ItemTag::Global(GlobalTag::UsagePage),      data: &[0x09]},
    ReportItem {tag: ItemTag::Local(LocalTag::UsageMinimum),     data: &[0x01]},
    ReportItem {tag: ItemTag::Local(LocalTag::UsageMaximum),     data: &[0x04]},
    ReportItem {tag: ItemTag::Global(GlobalTag::LogicalMinimum), data: &[0x00]},
    ReportItem {tag: ItemTag::Global(GlobalTag::LogicalMaximum), data: &[0x01]},
    ReportItem {tag: ItemTag::Global(GlobalTag::ReportSize),     data: &[0x01]},
    ReportItem {tag: ItemTag::Global(GlobalTag::ReportCount),    data: &[0x04]},
    ReportItem {tag: ItemTag::Main(MainTag::Input),              data: &[0x02]},
    ReportItem {tag: ItemTag::Global(GlobalTag::Push),           data: &[]},
    ReportItem {tag: ItemTag::Global(GlobalTag::LogicalMinimum), data: &[0x01, 0x80]},
    ReportItem {tag: ItemTag::Global(GlobalTag::LogicalMaximum), data: &[0xff, 0xff, 0x00, 0x00]},
    ReportItem {tag: ItemTag::Global(GlobalTag::Pop),            data: &[]},
    ReportItem {tag: ItemTag::Long(0x10),                        data: &[0xaa, 0xbb]},
    ReportItem {tag: ItemTag::Main(MainTag::EndCollection),      data: &[]},
  ];

  #[test]
  fn item_tokenizer_should_tokenize_items() {
    let mut tokenizer = DescriptorItemTokenizer::new(TEST_REPORT_DESCRIPTOR);

    let items: Vec<_> = tokenizer.by_ref().collect();

    assert_eq!(items.len(), EXPECTED_ITEMS.len(), "tokenizer did not produce the correct number of items");

    for (index, (item, expected_item)) in items.iter().zip(EXPECTED_ITEMS.iter()).enumerate() {
      assert_eq!(item, expected_item, "invalid tokenization of item at index {index:?}");
    }
    assert!(!tokenizer.is_truncated());
    assert_eq!(tokenizer.position(), TEST_REPORT_DESCRIPTOR.len());
  }

  #[test]
  fn item_tokenizer_should_flag_truncated_items() {
    let mut tokenizer = DescriptorItemTokenizer::new(&[0x05, 0x01, 0x26, 0xff]);
    assert_eq!(tokenizer.next(), Some(ReportItem { tag: ItemTag::Global(GlobalTag::UsagePage), data: &[0x01] }));
    assert_eq!(tokenizer.next(), None);
    assert!(tokenizer.is_truncated());
  }

  #[test]
  fn item_tokenizer_should_classify_reserved_items() {
    let items: Vec<_> = DescriptorItemTokenizer::new(&[0x0c, 0xe0, 0x01]).collect();
    assert_eq!(items[0].tag, ItemTag::Reserved(0x00));
    assert_eq!(items[1].tag, ItemTag::Main(MainTag::Unknown(0x0e)));
  }
}
