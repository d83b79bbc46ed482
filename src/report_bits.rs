//! Report Bit-Field Access
//!
//! Reads and writes packed bit-fields within raw report buffers. Bit 0 is the least significant bit of byte 0.
//!
//! [`read_bits`] is the reader the `HidP_GetUsageValue` family has always exposed: multi-bit reads start at the byte
//! holding the last bit of the field and walk towards the first, so the first byte consumed ends up most significant
//! in the result. When fewer than 8 bits remain the byte is masked with `!(0xFF << (8 - remaining))`. For fields that
//! start on a byte boundary and span whole bytes this is the plain little-endian value; other fields observe bits
//! outside `[start_bit, start_bit + bit_count)`.
//!
//! [`write_bits`] and [`read_field_bits`] access exactly the bits of the field, least significant bit first, and
//! never touch their neighbours.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::status::{HidpError, HidpResult};

// fails if the field [start_bit, start_bit + bit_count) does not fit in the report.
fn check_length(report: &[u8], start_bit: u32, bit_count: u32) -> HidpResult<()> {
  let end_bit = start_bit as u64 + bit_count as u64;
  if end_bit.div_ceil(8) > report.len() as u64 {
    Err(HidpError::InvalidReportLength)
  } else {
    Ok(())
  }
}

// mask of the bits observed in the trailing partial byte.
fn partial_mask(remaining_bits: u32) -> u8 {
  !(0xFFu32 << (8 - remaining_bits)) as u8
}

/// Reads `bit_count` bits starting at `start_bit`.
///
/// For a single bit the masked bit is returned (any nonzero value means "set"). Returns
/// [`HidpError::InvalidReportLength`] if the field extends past the end of `report`.
pub fn read_bits(report: &[u8], start_bit: u32, bit_count: u32) -> HidpResult<u32> {
  check_length(report, start_bit, bit_count)?;

  match bit_count {
    0 => Ok(0),
    1 => {
      let byte_index = (start_bit / 8) as usize;
      let mask = 1u8 << (start_bit % 8);
      Ok((report[byte_index] & mask) as u32)
    }
    _ => {
      let mut byte_index = ((start_bit + bit_count - 1) / 8) as usize;
      let mut data: u64 = 0;
      let mut remaining_bits = bit_count;
      while remaining_bits > 0 {
        data <<= 8;
        if remaining_bits >= 8 {
          data |= report[byte_index] as u64;
          remaining_bits -= 8;
          if remaining_bits == 0 {
            break;
          }
          byte_index -= 1;
        } else {
          data |= (report[byte_index] & partial_mask(remaining_bits)) as u64;
          remaining_bits = 0;
        }
      }
      Ok(data as u32)
    }
  }
}

/// Writes the low `bit_count` bits of `value` into the field `[start_bit, start_bit + bit_count)`, least significant
/// bit first. Every bit outside the field is left untouched.
///
/// For a single bit, any nonzero `value` sets the bit and zero clears it. Bits of `value` that the field cannot hold
/// are discarded; callers that care check the range before writing.
pub fn write_bits(report: &mut [u8], start_bit: u32, bit_count: u32, value: u32) -> HidpResult<()> {
  check_length(report, start_bit, bit_count)?;

  let value = if bit_count == 1 && value != 0 { 1 } else { value };
  let mut written = 0;
  while written < bit_count {
    let bit = start_bit + written;
    let shift = bit % 8;
    let chunk = (8 - shift).min(bit_count - written);
    let mask = (((1u32 << chunk) - 1) << shift) as u8;
    let bits = (((value as u64).checked_shr(written).unwrap_or(0) as u32) << shift) as u8;
    let byte = &mut report[(bit / 8) as usize];
    *byte = (*byte & !mask) | (bits & mask);
    written += chunk;
  }
  Ok(())
}

/// Reads the field `[start_bit, start_bit + bit_count)` least significant bit first. This is the exact inverse of
/// [`write_bits`], used for array selector slots.
pub fn read_field_bits(report: &[u8], start_bit: u32, bit_count: u32) -> HidpResult<u32> {
  check_length(report, start_bit, bit_count)?;

  let mut value: u64 = 0;
  let mut read = 0;
  while read < bit_count {
    let bit = start_bit + read;
    let shift = bit % 8;
    let chunk = (8 - shift).min(bit_count - read);
    let bits = (report[(bit / 8) as usize] >> shift) as u64 & ((1u64 << chunk) - 1);
    value |= bits.checked_shl(read).unwrap_or(0);
    read += chunk;
  }
  Ok(value as u32)
}
