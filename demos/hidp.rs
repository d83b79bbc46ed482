//! HID Report Accessor Utility
//!
//! Simple command line utility that preparses a report descriptor and prints the resulting capabilities as JSON.
//! Given a raw report, it also decodes the pressed buttons and values the report carries.
//!
//! Demonstrates the usage of the [`hidp`] crate.
//!
//! # Usage
//!
//! `cargo run --example hidp -- --path ./boot_keyboard.bin --report-type input --report 0200040000000000`
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{collections::BTreeSet, error::Error, fs};

use clap::{Parser, ValueEnum};
use hidp::{ButtonCaps, CapsUsage, HidpError, PreparsedData, Usage, UsagePage, ValueCaps};
use log::{debug, error, info, LevelFilter, Log, Metadata, Record};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportType {
  Input,
  Output,
  Feature,
}

impl From<ReportType> for hidp::ReportType {
  fn from(report_type: ReportType) -> Self {
    match report_type {
      ReportType::Input => hidp::ReportType::Input,
      ReportType::Output => hidp::ReportType::Output,
      ReportType::Feature => hidp::ReportType::Feature,
    }
  }
}

/// Arguments
#[derive(Parser, Debug)]
struct Arguments {
  /// The path containing descriptor binary file.
  #[arg(short, long)]
  path: std::path::PathBuf,

  /// Type of report to list
  #[arg(short, long)]
  report_type: Option<ReportType>,

  /// Index of the top level collection to describe
  #[arg(short, long, default_value_t = 0)]
  collection: usize,

  /// Raw report to decode, as hex bytes. Requires --report-type.
  #[arg(long, requires = "report_type")]
  report: Option<String>,

  /// Log preparser activity to stderr
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

struct SimpleLogger;

impl Log for SimpleLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= log::max_level()
  }

  fn log(&self, record: &Record) {
    if self.enabled(record.metadata()) {
      eprintln!("[{:>5}] {}: {}", record.level(), record.target(), record.args());
    }
  }

  fn flush(&self) {}
}

static LOGGER: SimpleLogger = SimpleLogger;

fn init_logger(verbose: u8) -> Result<(), log::SetLoggerError> {
  let level = match verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    2 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  log::set_logger(&LOGGER)?;
  log::set_max_level(level);
  Ok(())
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UsageJson {
  #[serde(skip_serializing_if = "Option::is_none")]
  usage: Option<u16>,
  #[serde(skip_serializing_if = "Option::is_none")]
  usage_min: Option<u16>,
  #[serde(skip_serializing_if = "Option::is_none")]
  usage_max: Option<u16>,
  data_index: u16,
}

impl From<&CapsUsage> for UsageJson {
  fn from(usage: &CapsUsage) -> Self {
    match *usage {
      CapsUsage::NotRange { usage, data_index, .. } => {
        UsageJson { usage: Some(usage.into()), usage_min: None, usage_max: None, data_index }
      }
      CapsUsage::Range { usage_min, usage_max, data_index_min, .. } => UsageJson {
        usage: None,
        usage_min: Some(usage_min.into()),
        usage_max: Some(usage_max.into()),
        data_index: data_index_min,
      },
    }
  }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ButtonCapsJson {
  usage_page: u16,
  report_id: u8,
  link_collection: u16,
  report_count: u16,
  is_absolute: bool,
  #[serde(flatten)]
  usage: UsageJson,
}

impl From<&ButtonCaps> for ButtonCapsJson {
  fn from(caps: &ButtonCaps) -> Self {
    ButtonCapsJson {
      usage_page: caps.usage_page.into(),
      report_id: caps.report_id.into(),
      link_collection: caps.link_collection,
      report_count: caps.report_count,
      is_absolute: caps.is_absolute,
      usage: UsageJson::from(&caps.usage),
    }
  }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ValueCapsJson {
  usage_page: u16,
  report_id: u8,
  link_collection: u16,
  bit_size: u16,
  report_count: u16,
  has_null: bool,
  is_absolute: bool,
  logical_min: i32,
  logical_max: i32,
  physical_min: i32,
  physical_max: i32,
  units: u32,
  unit_exponent: u32,
  #[serde(flatten)]
  usage: UsageJson,
}

impl From<&ValueCaps> for ValueCapsJson {
  fn from(caps: &ValueCaps) -> Self {
    ValueCapsJson {
      usage_page: caps.usage_page.into(),
      report_id: caps.report_id.into(),
      link_collection: caps.link_collection,
      bit_size: caps.bit_size,
      report_count: caps.report_count,
      has_null: caps.has_null,
      is_absolute: caps.is_absolute,
      logical_min: caps.logical_min,
      logical_max: caps.logical_max,
      physical_min: caps.physical_min,
      physical_max: caps.physical_max,
      units: caps.units,
      unit_exponent: caps.unit_exponent,
      usage: UsageJson::from(&caps.usage),
    }
  }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReportCapsJson {
  report_type: String,
  byte_length: u16,
  max_data_list_length: usize,
  button_caps: Vec<ButtonCapsJson>,
  value_caps: Vec<ValueCapsJson>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CollectionJson {
  usage_page: u16,
  usage: u16,
  link_collection_nodes: u16,
  reports: Vec<ReportCapsJson>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DecodedValueJson {
  usage_page: u16,
  usage: u16,
  link_collection: u16,
  value: u32,
  scaled: i32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DecodedReportJson {
  buttons: Vec<DecodedButtonsJson>,
  values: Vec<DecodedValueJson>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DecodedButtonsJson {
  usage_page: u16,
  usages: Vec<u16>,
}

fn parse_hex(text: &str) -> Result<Vec<u8>, Box<dyn Error>> {
  let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
  if digits.len() % 2 != 0 {
    return Err("report must contain an even number of hex digits".into());
  }
  digits
    .chunks(2)
    .map(|pair| {
      let byte: String = pair.iter().collect();
      u8::from_str_radix(&byte, 16).map_err(|err| err.into())
    })
    .collect()
}

fn describe_report_type(data: &PreparsedData, report_type: ReportType) -> ReportCapsJson {
  let hidp_type = hidp::ReportType::from(report_type);
  ReportCapsJson {
    report_type: format!("{report_type:?}"),
    byte_length: data.get_caps().report_byte_length(hidp_type),
    max_data_list_length: data.max_data_list_length(hidp_type),
    button_caps: data.button_caps(hidp_type).map(ButtonCapsJson::from).collect(),
    value_caps: data.value_caps(hidp_type).map(ValueCapsJson::from).collect(),
  }
}

fn decode_report(
  data: &PreparsedData,
  report_type: ReportType,
  report: &[u8],
) -> Result<DecodedReportJson, HidpError> {
  let hidp_type = hidp::ReportType::from(report_type);

  let pages: BTreeSet<UsagePage> = data.button_caps(hidp_type).map(|caps| caps.usage_page).collect();
  let mut buttons = Vec::new();
  for page in pages {
    let mut usages = vec![Usage::default(); data.max_usage_list_length(hidp_type, page)];
    let count = match data.get_usages(hidp_type, page, 0, &mut usages, report) {
      Ok(count) => count,
      // the page only lives in reports with another id.
      Err(HidpError::UsageNotFound) | Err(HidpError::ReportDoesNotExist) => continue,
      Err(err) => return Err(err),
    };
    debug!("{count} usages pressed on page {page:?}");
    let usages = usages[..count].iter().map(|&usage| u16::from(usage)).collect();
    buttons.push(DecodedButtonsJson { usage_page: page.into(), usages });
  }

  let mut values = Vec::new();
  for caps in data.value_caps(hidp_type).filter(|caps| !caps.usage.is_range()) {
    let usage = caps.usage.usage_min();
    let lookup = |report: &[u8]| {
      let value = data.get_usage_value(hidp_type, caps.usage_page, caps.link_collection, usage, report)?;
      let scaled = data.get_scaled_usage_value(hidp_type, caps.usage_page, caps.link_collection, usage, report)?;
      Ok::<_, HidpError>((value, scaled))
    };
    match lookup(report) {
      Ok((value, scaled)) => values.push(DecodedValueJson {
        usage_page: caps.usage_page.into(),
        usage: usage.into(),
        link_collection: caps.link_collection,
        value,
        scaled,
      }),
      Err(HidpError::UsageNotFound) | Err(HidpError::ReportDoesNotExist) => continue,
      Err(err) => return Err(err),
    }
  }

  Ok(DecodedReportJson { buttons, values })
}

fn main() -> Result<(), Box<dyn Error>> {
  let args = Arguments::parse();
  init_logger(args.verbose).map_err(|err| err.to_string())?;

  let raw_descriptor = fs::read(&args.path)?;
  info!("read {} descriptor bytes from {}", raw_descriptor.len(), args.path.display());

  let collections = hidp::preparse_report_descriptor(&raw_descriptor)?;
  let data = collections
    .get(args.collection)
    .ok_or_else(|| format!("descriptor has {} top level collections", collections.len()))?;

  let report_types = match args.report_type {
    Some(report_type) => vec![report_type],
    None => vec![ReportType::Input, ReportType::Output, ReportType::Feature],
  };

  let caps = data.get_caps();
  let description = CollectionJson {
    usage_page: caps.usage_page.into(),
    usage: caps.usage.into(),
    link_collection_nodes: caps.number_link_collection_nodes,
    reports: report_types.iter().map(|&report_type| describe_report_type(data, report_type)).collect(),
  };
  println!("{}", serde_json::to_string_pretty(&description)?);

  if let (Some(report), Some(report_type)) = (&args.report, args.report_type) {
    let report = parse_hex(report)?;
    let decoded = decode_report(data, report_type, &report).map_err(|err| {
      error!("failed to decode report: {err} ({:#010x})", err.ntstatus());
      err
    })?;
    println!("{}", serde_json::to_string_pretty(&decoded)?);
  }

  Ok(())
}
