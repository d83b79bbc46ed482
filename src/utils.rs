//! Item Data Conversion Functions
//!
//! Conversions of variable length (0, 1, 2 or 4 byte) little-endian descriptor item data into integer types.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub fn u32_from_bytes(bytes: &[u8]) -> u32 {
  let mut u32_bytes: [u8; 4] = [0; 4];
  let len = bytes.len().min(4);
  u32_bytes[..len].copy_from_slice(&bytes[..len]);
  u32::from_le_bytes(u32_bytes)
}

// Logical and physical extents are signed (HID 1.11 section 6.2.2.7), so short items are sign-extended.
pub fn i32_from_bytes(bytes: &[u8]) -> i32 {
  let mut i32_bytes: [u8; 4] = [0; 4];
  let len = bytes.len().min(4);
  if bytes[..len].last().is_some_and(|msb| msb & 0x80 != 0) {
    i32_bytes.fill(0xff);
  }
  i32_bytes[..len].copy_from_slice(&bytes[..len]);
  i32::from_le_bytes(i32_bytes)
}
